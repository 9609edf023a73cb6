//! Per-page descriptor mirrored in the `page_<name>` table's non-blob
//! columns and in the in-memory [`crate::group_index::GroupIndex`]
//! (Component B).

use uuid::Uuid;

/// Opaque unique identifier for a page. Stable for the life of the page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(Uuid);

impl PageId {
    /// Mints a fresh page id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Renders as the string stored in the `pageKey` / `prevPageKey` columns.
    pub fn as_string(&self) -> String {
        self.0.to_string()
    }

    /// Parses a page id from the string form stored in a table column.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for PageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The {pageId, group, prevPageId, count} tuple plus the `isNew` lifecycle
/// bit. `count` must equal the length of the [`crate::page::Page`] it
/// describes at every transaction boundary (global invariant 2).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageMetadata {
    /// Stable unique id for this page.
    pub page_id: PageId,
    /// Group this page belongs to.
    pub group: String,
    /// Previous page in the group's linked list, or `None` for the head.
    pub prev_page_id: Option<PageId>,
    /// Rowid count of the referenced page, at rest.
    pub count: usize,
    /// True from construction until the first successful commit persists
    /// the row (drives INSERT vs UPDATE in the commit writer).
    pub is_new: bool,
}

impl PageMetadata {
    /// Builds metadata for a brand-new page (always `is_new = true`).
    pub fn new_page(group: impl Into<String>, prev_page_id: Option<PageId>, count: usize) -> Self {
        Self {
            page_id: PageId::new(),
            group: group.into(),
            prev_page_id,
            count,
            is_new: true,
        }
    }
}
