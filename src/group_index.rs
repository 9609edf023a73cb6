//! In-memory group→pages and page→group maps (Component C).
//!
//! [`GroupIndex`] is populated once per connection, from the page table's
//! non-blob columns, by walking each group's linked list starting from the
//! page whose `prevPageId` is `None`. The walk is O(pages), done once on
//! open; after that, traversal is just iterating the in-memory `Vec`.

use rustc_hash::FxHashMap;

use crate::error::{OrderedViewError, Result};
use crate::metadata::{PageId, PageMetadata};

/// One row read back from the `page_<name>` table's non-blob columns,
/// as handed to [`GroupIndex::prepare_if_needed`].
#[derive(Clone, Debug)]
pub struct PageRow {
    /// The page's id.
    pub page_id: PageId,
    /// The page's group.
    pub group: String,
    /// The previous page in the group's list, or `None` for the head.
    pub prev_page_id: Option<PageId>,
    /// Persisted rowid count.
    pub count: usize,
}

/// group→ordered-list-of-pages and page→group maps, reconstructed on open
/// and mutated in place as the Inserter/Remover/Compactor run.
#[derive(Default, Clone)]
pub struct GroupIndex {
    groups_pages: FxHashMap<String, Vec<PageMetadata>>,
    page_to_group: FxHashMap<PageId, String>,
}

impl GroupIndex {
    /// Empty index (no groups).
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the index from the page table's rows. On any ordering
    /// error the index is reset to empty and the error is returned — the
    /// caller must treat the view as unavailable and drop-and-rebuild.
    pub fn prepare_if_needed(&mut self, rows: Vec<PageRow>) -> Result<()> {
        match Self::build(rows) {
            Ok((groups_pages, page_to_group)) => {
                self.groups_pages = groups_pages;
                self.page_to_group = page_to_group;
                Ok(())
            }
            Err(err) => {
                self.groups_pages.clear();
                self.page_to_group.clear();
                Err(err)
            }
        }
    }

    fn build(
        rows: Vec<PageRow>,
    ) -> Result<(FxHashMap<String, Vec<PageMetadata>>, FxHashMap<PageId, String>)> {
        let mut by_group: FxHashMap<String, Vec<PageRow>> = FxHashMap::default();
        for row in rows {
            by_group.entry(row.group.clone()).or_default().push(row);
        }

        let mut groups_pages = FxHashMap::default();
        let mut page_to_group = FxHashMap::default();

        for (group, group_rows) in by_group {
            let mut links: FxHashMap<Option<PageId>, &PageRow> = FxHashMap::default();
            let mut by_id: FxHashMap<PageId, &PageRow> = FxHashMap::default();
            for row in &group_rows {
                by_id.insert(row.page_id, row);
                if links.insert(row.prev_page_id, row).is_some() {
                    return Err(OrderedViewError::Corruption(format!(
                        "invalid key ordering in group {group:?}: duplicate prevPageId"
                    )));
                }
            }

            let mut ordered = Vec::with_capacity(group_rows.len());
            let mut cursor: Option<PageId> = None;
            loop {
                let Some(row) = links.get(&cursor) else {
                    break;
                };
                if ordered.len() >= group_rows.len() {
                    return Err(OrderedViewError::Corruption(format!(
                        "circular key ordering in group {group:?}"
                    )));
                }
                ordered.push(PageMetadata {
                    page_id: row.page_id,
                    group: row.group.clone(),
                    prev_page_id: row.prev_page_id,
                    count: row.count,
                    is_new: false,
                });
                page_to_group.insert(row.page_id, group.clone());
                cursor = Some(row.page_id);
            }

            if ordered.len() != group_rows.len() {
                // Either some prevPageId pointed at a page id absent from
                // this group (unreachable/orphan) or the walk stopped short.
                let reached: std::collections::HashSet<PageId> =
                    ordered.iter().map(|m| m.page_id).collect();
                let orphan = group_rows.iter().find(|row| {
                    row.prev_page_id
                        .is_some_and(|prev| !by_id.contains_key(&prev) && !reached.contains(&prev))
                });
                if orphan.is_some() {
                    return Err(OrderedViewError::Corruption(format!(
                        "invalid key ordering in group {group:?}: prevPageId references unknown page"
                    )));
                }
                return Err(OrderedViewError::Corruption(format!(
                    "missing page(s) in group {group:?}: expected {} pages, reached {}",
                    group_rows.len(),
                    ordered.len()
                )));
            }

            groups_pages.insert(group, ordered);
        }

        Ok((groups_pages, page_to_group))
    }

    /// The ordered page-metadata list for `group`, if the group is present.
    pub fn pages_for_group(&self, group: &str) -> Option<&[PageMetadata]> {
        self.groups_pages.get(group).map(Vec::as_slice)
    }

    /// Mutable access to a group's page list, for the Inserter/Remover/
    /// Compactor. Returns `None` if the group has no pages (global
    /// invariant 5).
    pub fn pages_for_group_mut(&mut self, group: &str) -> Option<&mut Vec<PageMetadata>> {
        self.groups_pages.get_mut(group)
    }

    /// Inserts a brand-new group with a single page list.
    pub fn insert_group(&mut self, group: String, pages: Vec<PageMetadata>) {
        for page in &pages {
            self.page_to_group.insert(page.page_id, group.clone());
        }
        self.groups_pages.insert(group, pages);
    }

    /// Removes `group` entirely (its page list became empty).
    pub fn remove_group(&mut self, group: &str) {
        if let Some(pages) = self.groups_pages.remove(group) {
            for page in pages {
                self.page_to_group.remove(&page.page_id);
            }
        }
    }

    /// The group a page belongs to, if tracked.
    pub fn group_of_page(&self, page_id: PageId) -> Option<&str> {
        self.page_to_group.get(&page_id).map(String::as_str)
    }

    /// Mutable access to a page's metadata, found via its tracked group.
    pub fn metadata_mut(&mut self, page_id: PageId) -> Option<&mut PageMetadata> {
        let group = self.page_to_group.get(&page_id)?.clone();
        self.groups_pages
            .get_mut(&group)?
            .iter_mut()
            .find(|m| m.page_id == page_id)
    }

    /// Immutable access to a page's metadata, found via its tracked group.
    pub fn metadata(&self, page_id: PageId) -> Option<&PageMetadata> {
        let group = self.page_to_group.get(&page_id)?;
        self.groups_pages
            .get(group)?
            .iter()
            .find(|m| m.page_id == page_id)
    }

    /// Registers `page_id` as belonging to `group` (used when the Compactor
    /// allocates a new page).
    pub fn track_page(&mut self, page_id: PageId, group: String) {
        self.page_to_group.insert(page_id, group);
    }

    /// Removes a page-id→group tracking entry (used when a page is
    /// dropped).
    pub fn untrack_page(&mut self, page_id: PageId) {
        self.page_to_group.remove(&page_id);
    }

    /// Total rowid count across a group's pages.
    pub fn count_in_group(&self, group: &str) -> usize {
        self.groups_pages
            .get(group)
            .map(|pages| pages.iter().map(|p| p.count).sum())
            .unwrap_or(0)
    }

    /// Total rowid count across every group.
    pub fn count_in_all_groups(&self) -> usize {
        self.groups_pages
            .values()
            .flat_map(|pages| pages.iter())
            .map(|p| p.count)
            .sum()
    }

    /// Number of tracked groups.
    pub fn number_of_groups(&self) -> usize {
        self.groups_pages.len()
    }

    /// All tracked group names, in unspecified order.
    pub fn all_groups(&self) -> Vec<String> {
        self.groups_pages.keys().cloned().collect()
    }

    /// True if `group` has at least one page.
    pub fn has_group(&self, group: &str) -> bool {
        self.groups_pages.contains_key(group)
    }

    /// Clears all state (used by `removeAllRowids`).
    pub fn clear(&mut self) {
        self.groups_pages.clear();
        self.page_to_group.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: PageId, group: &str, prev: Option<PageId>, count: usize) -> PageRow {
        PageRow { page_id: id, group: group.into(), prev_page_id: prev, count }
    }

    #[test]
    fn rebuilds_single_chain() {
        let a = PageId::new();
        let b = PageId::new();
        let c = PageId::new();
        let rows = vec![
            row(b, "g", Some(a), 10),
            row(a, "g", None, 10),
            row(c, "g", Some(b), 5),
        ];
        let mut idx = GroupIndex::new();
        idx.prepare_if_needed(rows).unwrap();
        let pages = idx.pages_for_group("g").unwrap();
        assert_eq!(pages.iter().map(|p| p.page_id).collect::<Vec<_>>(), vec![a, b, c]);
        assert_eq!(idx.count_in_group("g"), 25);
        assert_eq!(idx.group_of_page(c), Some("g"));
    }

    #[test]
    fn detects_cycle() {
        let a = PageId::new();
        let b = PageId::new();
        let rows = vec![row(a, "g", Some(b), 1), row(b, "g", Some(a), 1)];
        let mut idx = GroupIndex::new();
        let err = idx.prepare_if_needed(rows).unwrap_err();
        assert!(matches!(err, OrderedViewError::Corruption(_)));
        assert_eq!(idx.number_of_groups(), 0);
    }

    #[test]
    fn detects_missing_page() {
        let a = PageId::new();
        let b = PageId::new();
        let c = PageId::new();
        // c's prevPageId points at b, but b is never listed (missing page).
        let rows = vec![row(a, "g", None, 1), row(c, "g", Some(b), 1)];
        let mut idx = GroupIndex::new();
        let err = idx.prepare_if_needed(rows).unwrap_err();
        assert!(matches!(err, OrderedViewError::Corruption(_)));
    }

    #[test]
    fn detects_orphan_unreachable_page() {
        // No page has prevPageId = None, so nothing is reachable.
        let a = PageId::new();
        let b = PageId::new();
        let rows = vec![row(a, "g", Some(b), 1), row(b, "g", Some(a), 1)];
        let mut idx = GroupIndex::new();
        assert!(idx.prepare_if_needed(rows).is_err());
    }
}
