//! Splits oversized pages (spill or split) and drops empty pages at
//! pre-commit, and provides the inline split invoked mid-insert once a page
//! crosses the hard trigger (Component H).

use rusqlite::Connection;

use crate::change::ChangeRecord;
use crate::config::Config;
use crate::error::Result;
use crate::group_index::GroupIndex;
use crate::metadata::{PageId, PageMetadata};
use crate::page::Page;
use crate::store::PageStore;

/// Splits oversized pages and drops empty ones.
pub struct Compactor;

impl Compactor {
    /// Pre-commit pass: every page currently dirty with non-tombstone
    /// contents is checked for oversize (target = `config.page_max`) and
    /// then, in a second pass, for emptiness. Returns change records for
    /// any group whose last page was dropped.
    pub fn run_pre_commit(
        conn: &Connection,
        store: &mut PageStore,
        group_index: &mut GroupIndex,
        config: &Config,
    ) -> Result<Vec<ChangeRecord>> {
        let candidates = store.dirty_value_page_ids();
        for page_id in candidates {
            Self::expand_oversized(conn, store, group_index, config, page_id, config.page_max)?;
        }

        let mut changes = Vec::new();
        let candidates = store.dirty_value_page_ids();
        for page_id in candidates {
            if let Some(record) = Self::collapse_if_empty(conn, store, group_index, page_id)? {
                changes.push(record);
            }
        }
        Ok(changes)
    }

    /// Inline split invoked by the Inserter immediately after an insert
    /// pushes a page past `config.hard_trigger`, targeting
    /// `config.inline_split_target` (16·MAX) rather than `config.page_max`.
    pub fn split_oversized_inline(
        conn: &Connection,
        store: &mut PageStore,
        group_index: &mut GroupIndex,
        config: &Config,
        page_id: PageId,
    ) -> Result<()> {
        Self::expand_oversized(conn, store, group_index, config, page_id, config.inline_split_target)
    }

    /// Repeatedly applies the three-rule split algorithm to `page_id` until
    /// its count is at or below `target`. Neighbor "spare capacity" is
    /// always measured against `config.page_max` — only the loop's exit
    /// threshold and the size of a freshly allocated page scale with
    /// `target`.
    fn expand_oversized(
        conn: &Connection,
        store: &mut PageStore,
        group_index: &mut GroupIndex,
        config: &Config,
        page_id: PageId,
        target: usize,
    ) -> Result<()> {
        loop {
            let mut page = store.page(conn, page_id)?;
            let excess = page.count().saturating_sub(target);
            if excess == 0 {
                return Ok(());
            }

            let group = group_index
                .group_of_page(page_id)
                .expect("dirty page must be tracked in a group")
                .to_string();
            let (prev_id, next_id) = Self::neighbors(group_index, &group, page_id);

            if let Some(prev_id) = prev_id {
                let prev_count = group_index.metadata(prev_id).map(|m| m.count).unwrap_or(0);
                let spare = config.page_max.saturating_sub(prev_count);
                if spare > 0 {
                    let move_n = excess.min(spare);
                    let mut prev_page = store.page(conn, prev_id)?;
                    let start = prev_page.count();
                    prev_page.append_range_from(&mut page, 0..move_n)?;
                    for &rowid in &prev_page.as_slice()[start..] {
                        store.set_rowid_page(rowid, prev_id);
                    }
                    if let Some(m) = group_index.metadata_mut(prev_id) {
                        m.count = prev_page.count();
                    }
                    if let Some(m) = group_index.metadata_mut(page_id) {
                        m.count = page.count();
                    }
                    store.put_page(prev_id, prev_page);
                    store.put_page(page_id, page);
                    continue;
                }
            }

            if let Some(next_id) = next_id {
                let next_count = group_index.metadata(next_id).map(|m| m.count).unwrap_or(0);
                let spare = config.page_max.saturating_sub(next_count);
                if spare > 0 {
                    let move_n = excess.min(spare);
                    let mut next_page = store.page(conn, next_id)?;
                    let start = page.count() - move_n;
                    next_page.prepend_range_from(&mut page, start..page.count())?;
                    for &rowid in &next_page.as_slice()[..move_n] {
                        store.set_rowid_page(rowid, next_id);
                    }
                    if let Some(m) = group_index.metadata_mut(next_id) {
                        m.count = next_page.count();
                    }
                    if let Some(m) = group_index.metadata_mut(page_id) {
                        m.count = page.count();
                    }
                    store.put_page(next_id, next_page);
                    store.put_page(page_id, page);
                    continue;
                }
            }

            // Rule 3: allocate a fresh page after this one.
            let move_n = excess.min(target);
            let start = page.count() - move_n;
            let mut new_page = Page::new();
            new_page.append_range_from(&mut page, start..page.count())?;
            let new_id = PageId::new();
            for &rowid in new_page.as_slice() {
                store.set_rowid_page(rowid, new_id);
            }

            if let Some(next_id) = next_id {
                if let Some(m) = group_index.metadata_mut(next_id) {
                    m.prev_page_id = Some(new_id);
                    store.mark_link_dirty(m.clone());
                }
            }

            let new_metadata =
                PageMetadata { page_id: new_id, group: group.clone(), prev_page_id: Some(page_id), count: new_page.count(), is_new: true };
            if let Some(pages) = group_index.pages_for_group_mut(&group) {
                let idx = pages.iter().position(|m| m.page_id == page_id).expect("page tracked in its own group");
                pages.insert(idx + 1, new_metadata);
            }
            group_index.track_page(new_id, group.clone());

            if let Some(m) = group_index.metadata_mut(page_id) {
                m.count = page.count();
            }
            store.put_page(new_id, new_page);
            store.put_page(page_id, page);
        }
    }

    /// Drops `page_id`'s metadata and tombstones it if it is empty,
    /// patching the next page's `prevPageId` and emitting `DeleteGroup`
    /// when the group's list becomes empty.
    fn collapse_if_empty(
        conn: &Connection,
        store: &mut PageStore,
        group_index: &mut GroupIndex,
        page_id: PageId,
    ) -> Result<Option<ChangeRecord>> {
        let page = store.page(conn, page_id)?;
        if !page.is_empty() {
            return Ok(None);
        }

        let group = group_index
            .group_of_page(page_id)
            .expect("dirty page must be tracked in a group")
            .to_string();

        let removed_prev = {
            let pages = group_index.pages_for_group_mut(&group).expect("group must have pages");
            let idx = pages.iter().position(|m| m.page_id == page_id).expect("page tracked in its own group");
            let removed = pages.remove(idx);
            let next = pages.get(idx).cloned();
            (removed.prev_page_id, next)
        };
        let (removed_prev_id, next_after) = removed_prev;
        if let Some(next_meta) = next_after {
            if let Some(m) = group_index.metadata_mut(next_meta.page_id) {
                m.prev_page_id = removed_prev_id;
                store.mark_link_dirty(m.clone());
            }
        }

        store.delete_page(page_id);
        store.clear_link_dirty(&page_id);
        group_index.untrack_page(page_id);

        let now_empty = group_index.pages_for_group(&group).map(|p| p.is_empty()).unwrap_or(true);
        if now_empty {
            group_index.remove_group(&group);
            return Ok(Some(ChangeRecord::DeleteGroup { group }));
        }
        Ok(None)
    }

    fn neighbors(group_index: &GroupIndex, group: &str, page_id: PageId) -> (Option<PageId>, Option<PageId>) {
        let pages = group_index.pages_for_group(group).expect("group must have pages");
        let idx = pages.iter().position(|m| m.page_id == page_id).expect("page tracked in its own group");
        let prev = if idx > 0 { Some(pages[idx - 1].page_id) } else { None };
        let next = pages.get(idx + 1).map(|m| m.page_id);
        (prev, next)
    }
}
