//! Bounded clean caches backing [`super::PageStore`].
//!
//! Two `lru::LruCache` instances, one per table. They hold only values
//! already known-consistent with the backing tables; dirty-set entries
//! always take priority over them (see [`super::PageStore::page`] /
//! [`super::PageStore::page_id_for_rowid`]).

use std::num::NonZeroUsize;

use lru::LruCache;

use crate::metadata::PageId;
use crate::page::Page;

/// Bounded page-id→`Page` cache.
pub struct PageCache {
    inner: LruCache<PageId, Page>,
}

impl PageCache {
    /// Builds a cache holding at most `capacity` pages.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity.max(1) > 0");
        Self { inner: LruCache::new(capacity) }
    }

    /// Looks up `page_id`, promoting it to most-recently-used on hit.
    pub fn get(&mut self, page_id: &PageId) -> Option<&Page> {
        self.inner.get(page_id)
    }

    /// Inserts or overwrites the cached page.
    pub fn put(&mut self, page_id: PageId, page: Page) {
        self.inner.put(page_id, page);
    }

    /// Evicts `page_id` if cached.
    pub fn evict(&mut self, page_id: &PageId) {
        self.inner.pop(page_id);
    }

    /// Drops every cached entry.
    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

/// A cached rowid→pageId lookup. `Absent` is the clean-cache analogue of the
/// dirty-map tombstone: it positively records that the rowid has no page,
/// so a repeated miss doesn't re-hit the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapCacheEntry {
    /// The rowid maps to this page.
    Present(PageId),
    /// The rowid is known not to have a page.
    Absent,
}

/// Bounded rowid→pageId cache.
pub struct MapCache {
    inner: LruCache<i64, MapCacheEntry>,
}

impl MapCache {
    /// Builds a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity.max(1) > 0");
        Self { inner: LruCache::new(capacity) }
    }

    /// Looks up `rowid`, promoting it to most-recently-used on hit.
    pub fn get(&mut self, rowid: i64) -> Option<MapCacheEntry> {
        self.inner.get(&rowid).copied()
    }

    /// Inserts or overwrites the cached entry.
    pub fn put(&mut self, rowid: i64, entry: MapCacheEntry) {
        self.inner.put(rowid, entry);
    }

    /// Evicts `rowid` if cached.
    pub fn evict(&mut self, rowid: i64) {
        self.inner.pop(&rowid);
    }

    /// Drops every cached entry.
    pub fn clear(&mut self) {
        self.inner.clear();
    }
}
