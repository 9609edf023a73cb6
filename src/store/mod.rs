//! Persistence of pages and page-metadata to the two backing tables, plus
//! the per-transaction dirty-set tracking and bounded clean caches
//! (Component D).
//!
//! Reads consult the dirty set, then the clean cache, then the table.
//! Writes update the dirty set and the clean cache eagerly, so a read later
//! in the same transaction observes the write. The dirty sets are drained
//! by [`crate::commit::CommitWriter`] and are otherwise opaque to callers.

pub mod cache;
pub mod schema;

use rusqlite::{params, Connection};
use rustc_hash::FxHashMap;

use crate::config::Config;
use crate::error::{OrderedViewError, Result};
use crate::group_index::PageRow;
use crate::metadata::{PageId, PageMetadata};
use crate::page::Page;

use cache::{MapCache, MapCacheEntry, PageCache};

/// A dirty page-table entry: either a page whose contents changed, or a
/// tombstone recording "delete this page at commit".
#[derive(Clone, Debug)]
pub enum DirtyPage {
    /// The page's contents (and therefore its blob) changed.
    Value(Page),
    /// The page must be deleted from the table at commit.
    Tombstone,
}

/// A dirty map-table entry: either a new rowid→pageId mapping, or a
/// tombstone recording "delete this rowid's row at commit".
#[derive(Clone, Copy, Debug)]
pub enum DirtyMap {
    /// The rowid now maps to this page.
    Value(PageId),
    /// The rowid's map-table row must be deleted at commit.
    Tombstone,
}

/// Everything a single writer transaction mutated, ready for
/// [`crate::commit::CommitWriter`] to drain.
#[derive(Default)]
pub struct DirtySets {
    /// Pages whose contents changed or that must be deleted.
    pub pages: FxHashMap<PageId, DirtyPage>,
    /// Pages whose `prevPageId` changed without their contents changing.
    pub links: FxHashMap<PageId, PageMetadata>,
    /// Rowid→pageId mappings that changed or must be deleted.
    pub maps: FxHashMap<i64, DirtyMap>,
}

impl DirtySets {
    fn is_empty(&self) -> bool {
        self.pages.is_empty() && self.links.is_empty() && self.maps.is_empty()
    }
}

/// Backs [`crate::group_index::GroupIndex`] with the `map_<name>` and
/// `page_<name>` tables, plus per-transaction dirty sets and bounded clean
/// caches.
pub struct PageStore {
    config: Config,
    page_cache: PageCache,
    map_cache: MapCache,
    dirty: DirtySets,
}

impl PageStore {
    /// Builds a store for `config`, creating the backing tables if absent.
    pub fn open(conn: &Connection, config: Config) -> Result<Self> {
        schema::ensure_tables(conn, &config)?;
        Ok(Self {
            page_cache: PageCache::new(config.page_cache_capacity),
            map_cache: MapCache::new(config.map_cache_capacity),
            dirty: DirtySets::default(),
            config,
        })
    }

    /// The view's configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Reads every page-table row, for [`crate::group_index::GroupIndex`]
    /// to rebuild its linked lists on open.
    pub fn load_page_rows(&self, conn: &Connection) -> Result<Vec<PageRow>> {
        let sql = format!(
            "SELECT pageKey, \"group\", prevPageKey, count FROM {}",
            self.config.page_table()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                let page_key: String = row.get(0)?;
                let group: String = row.get(1)?;
                let prev_key: Option<String> = row.get(2)?;
                let count: i64 = row.get(3)?;
                Ok((page_key, group, prev_key, count))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(page_key, group, prev_key, count)| {
                let page_id = PageId::parse(&page_key).ok_or_else(|| {
                    OrderedViewError::Corruption(format!("unparseable pageKey {page_key:?}"))
                })?;
                let prev_page_id = prev_key
                    .map(|s| {
                        PageId::parse(&s).ok_or_else(|| {
                            OrderedViewError::Corruption(format!(
                                "unparseable prevPageKey {s:?}"
                            ))
                        })
                    })
                    .transpose()?;
                Ok(PageRow { page_id, group, prev_page_id, count: count as usize })
            })
            .collect()
    }

    /// Loads `page_id`'s contents: dirty set, then clean cache, then table.
    pub fn page(&mut self, conn: &Connection, page_id: PageId) -> Result<Page> {
        if let Some(dirty) = self.dirty.pages.get(&page_id) {
            return match dirty {
                DirtyPage::Value(page) => Ok(page.clone()),
                DirtyPage::Tombstone => Err(OrderedViewError::InvariantViolation(format!(
                    "page {page_id} read after being tombstoned this transaction"
                ))),
            };
        }
        if let Some(page) = self.page_cache.get(&page_id) {
            return Ok(page.clone());
        }
        let sql = format!("SELECT data FROM {} WHERE pageKey = ?1", self.config.page_table());
        let bytes: Vec<u8> = conn.query_row(&sql, params![page_id.as_string()], |row| row.get(0))?;
        let page = Page::deserialize(&bytes)?;
        self.page_cache.put(page_id, page.clone());
        Ok(page)
    }

    /// Records `page`'s new contents for `page_id`, dirtying it and
    /// updating the clean cache eagerly.
    pub fn put_page(&mut self, page_id: PageId, page: Page) {
        self.page_cache.put(page_id, page.clone());
        self.dirty.pages.insert(page_id, DirtyPage::Value(page));
    }

    /// Marks `page_id` for deletion at commit.
    pub fn delete_page(&mut self, page_id: PageId) {
        self.page_cache.evict(&page_id);
        self.dirty.pages.insert(page_id, DirtyPage::Tombstone);
    }

    /// Records that `page_id`'s `prevPageId` changed without its contents
    /// changing (so the commit writer issues a link-only UPDATE).
    pub fn mark_link_dirty(&mut self, metadata: PageMetadata) {
        self.dirty.links.insert(metadata.page_id, metadata);
    }

    /// Drops a pending link-only dirty entry (used when the page itself
    /// becomes dirty too, folding the link update into the page write).
    pub fn clear_link_dirty(&mut self, page_id: &PageId) {
        self.dirty.links.remove(page_id);
    }

    /// Resolves `rowid`'s current page, dirty set then cache then table.
    pub fn page_id_for_rowid(&mut self, conn: &Connection, rowid: i64) -> Result<Option<PageId>> {
        if let Some(dirty) = self.dirty.maps.get(&rowid) {
            return Ok(match dirty {
                DirtyMap::Value(page_id) => Some(*page_id),
                DirtyMap::Tombstone => None,
            });
        }
        if let Some(entry) = self.map_cache.get(rowid) {
            return Ok(match entry {
                MapCacheEntry::Present(page_id) => Some(page_id),
                MapCacheEntry::Absent => None,
            });
        }
        let sql = format!("SELECT pageKey FROM {} WHERE rowid = ?1", self.config.map_table());
        let found: Option<String> = conn
            .query_row(&sql, params![rowid], |row| row.get(0))
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        match found {
            Some(page_key) => {
                let page_id = PageId::parse(&page_key).ok_or_else(|| {
                    OrderedViewError::Corruption(format!("unparseable pageKey {page_key:?}"))
                })?;
                self.map_cache.put(rowid, MapCacheEntry::Present(page_id));
                Ok(Some(page_id))
            }
            None => {
                self.map_cache.put(rowid, MapCacheEntry::Absent);
                Ok(None)
            }
        }
    }

    /// Records `rowid`'s new page, dirtying it and updating the clean
    /// cache eagerly.
    pub fn set_rowid_page(&mut self, rowid: i64, page_id: PageId) {
        self.map_cache.put(rowid, MapCacheEntry::Present(page_id));
        self.dirty.maps.insert(rowid, DirtyMap::Value(page_id));
    }

    /// Marks `rowid`'s map-table row for deletion at commit.
    pub fn delete_rowid_mapping(&mut self, rowid: i64) {
        self.map_cache.put(rowid, MapCacheEntry::Absent);
        self.dirty.maps.insert(rowid, DirtyMap::Tombstone);
    }

    /// Page ids currently dirty with live (non-tombstoned) contents, for
    /// the Compactor to inspect without draining the dirty set.
    pub fn dirty_value_page_ids(&self) -> Vec<PageId> {
        self.dirty
            .pages
            .iter()
            .filter_map(|(id, dirty)| matches!(dirty, DirtyPage::Value(_)).then_some(*id))
            .collect()
    }

    /// Drains the dirty sets for the commit writer, leaving them empty.
    pub fn take_dirty(&mut self) -> DirtySets {
        std::mem::take(&mut self.dirty)
    }

    /// True if there is nothing pending for the commit writer.
    pub fn is_clean(&self) -> bool {
        self.dirty.is_empty()
    }

    /// Discards all in-memory state: dirty sets and clean caches. Used by
    /// `removeAllRowids` and by transaction abort.
    pub fn reset(&mut self) {
        self.dirty = DirtySets::default();
        self.page_cache.clear();
        self.map_cache.clear();
    }

    /// Executes the bulk `DELETE FROM` statements `removeAllRowids` needs,
    /// then resets in-memory state.
    pub fn delete_all(&mut self, conn: &Connection) -> Result<()> {
        conn.execute(&format!("DELETE FROM {}", self.config.map_table()), [])?;
        conn.execute(&format!("DELETE FROM {}", self.config.page_table()), [])?;
        self.reset();
        Ok(())
    }
}
