//! Single- and bulk-remove by rowid (Component G).
//!
//! Removal only shrinks a page's in-memory contents and dirties it; an
//! emptied page is not dropped here — that's deferred to
//! [`crate::compact::Compactor`]'s pre-commit pass 2, so a remove followed
//! by an insert into the same now-empty slot within one transaction never
//! pays for a page allocation it doesn't need.

use std::collections::HashMap;

use rusqlite::Connection;
use tracing::debug;

use crate::change::ChangeRecord;
use crate::error::{OrderedViewError, Result};
use crate::group_index::GroupIndex;
use crate::metadata::PageId;
use crate::store::PageStore;

/// Removes rowids from the view.
pub struct Remover;

impl Remover {
    /// Sums the counts of every page before `page_id` in `group`'s list.
    pub fn page_offset(group_index: &GroupIndex, group: &str, page_id: PageId) -> Result<usize> {
        let pages = group_index.pages_for_group(group).ok_or_else(|| {
            OrderedViewError::InvariantViolation(format!("group {group:?} has no pages"))
        })?;
        let mut offset = 0;
        for meta in pages {
            if meta.page_id == page_id {
                return Ok(offset);
            }
            offset += meta.count;
        }
        Err(OrderedViewError::InvariantViolation(format!(
            "page {page_id} not found in group {group:?}"
        )))
    }

    /// Removes `rowid` (known to live in `page_id`/`group`), emitting a
    /// `DeleteRow` at its current position.
    pub fn remove_rowid(
        conn: &Connection,
        store: &mut PageStore,
        group_index: &mut GroupIndex,
        group: &str,
        page_id: PageId,
        rowid: i64,
        key: &str,
    ) -> Result<ChangeRecord> {
        let page_offset = Self::page_offset(group_index, group, page_id)?;
        let mut page = store.page(conn, page_id)?;
        let local_index = page.index_of(rowid).ok_or_else(|| {
            OrderedViewError::InvariantViolation(format!(
                "page {page_id} missing expected rowid {rowid}"
            ))
        })?;
        page.remove_at(local_index)?;
        let new_count = page.count();
        store.put_page(page_id, page);
        if let Some(meta) = group_index.metadata_mut(page_id) {
            meta.count = new_count;
        }
        store.delete_rowid_mapping(rowid);

        Ok(ChangeRecord::DeleteRow { key: key.to_string(), group: group.to_string(), index: page_offset + local_index })
    }

    /// Removes `rowid` by first resolving its current page via the
    /// rowid→pageId map. No-op if the rowid has no page.
    pub fn remove_rowid_by_lookup(
        conn: &Connection,
        store: &mut PageStore,
        group_index: &mut GroupIndex,
        rowid: i64,
        key: &str,
    ) -> Result<Option<ChangeRecord>> {
        let Some(page_id) = store.page_id_for_rowid(conn, rowid)? else {
            return Ok(None);
        };
        let group = group_index
            .group_of_page(page_id)
            .ok_or_else(|| {
                OrderedViewError::InvariantViolation(format!(
                    "page {page_id} mapped from rowid {rowid} but untracked in GroupIndex"
                ))
            })?
            .to_string();
        Self::remove_rowid(conn, store, group_index, &group, page_id, rowid, key).map(Some)
    }

    /// Removes every rowid in `keys` known to live in `page_id`/`group`,
    /// walking the page from high to low index so each emitted index
    /// matches the array state at the moment of removal (spec.md S5).
    pub fn remove_rowids(
        conn: &Connection,
        store: &mut PageStore,
        group_index: &mut GroupIndex,
        group: &str,
        page_id: PageId,
        keys: &HashMap<i64, String>,
    ) -> Result<Vec<ChangeRecord>> {
        let page_offset = Self::page_offset(group_index, group, page_id)?;
        let mut page = store.page(conn, page_id)?;
        let mut changes = Vec::new();

        let mut index = page.count();
        while index > 0 {
            index -= 1;
            let rowid = page.rowid_at(index).expect("index < count()");
            if let Some(key) = keys.get(&rowid) {
                page.remove_at(index)?;
                store.delete_rowid_mapping(rowid);
                changes.push(ChangeRecord::DeleteRow {
                    key: key.clone(),
                    group: group.to_string(),
                    index: page_offset + index,
                });
            }
        }

        let new_count = page.count();
        store.put_page(page_id, page);
        if let Some(meta) = group_index.metadata_mut(page_id) {
            meta.count = new_count;
        }
        Ok(changes)
    }

    /// Drops every row in every group: deletes both backing tables,
    /// resets all in-memory state, and emits `ResetGroup` for every group
    /// that existed beforehand.
    pub fn remove_all_rowids(
        conn: &Connection,
        store: &mut PageStore,
        group_index: &mut GroupIndex,
    ) -> Result<Vec<ChangeRecord>> {
        let groups = group_index.all_groups();
        debug!(count = groups.len(), "removing all rowids, resetting every group");
        store.delete_all(conn)?;
        group_index.clear();
        Ok(groups.into_iter().map(|group| ChangeRecord::ResetGroup { group }).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::config::Config;
    use crate::metadata::PageMetadata;
    use crate::page::Page;

    use super::*;

    #[test]
    fn bulk_remove_walks_high_to_low_so_indices_match_removal_time() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let config = Config::new("bulk", 1);
        let mut store = PageStore::open(&conn, config).unwrap();
        let mut group_index = GroupIndex::new();

        let page = Page::from_rowids(vec![10, 20, 30, 40, 50]);
        let metadata = PageMetadata::new_page("g", None, page.count());
        let page_id = metadata.page_id;
        store.put_page(page_id, page);
        group_index.insert_group("g".into(), vec![metadata]);

        let mut keys = HashMap::new();
        keys.insert(20, "k20".to_string());
        keys.insert(40, "k40".to_string());

        let changes = Remover::remove_rowids(&conn, &mut store, &mut group_index, "g", page_id, &keys).unwrap();

        assert_eq!(
            changes,
            vec![
                ChangeRecord::DeleteRow { key: "k40".into(), group: "g".into(), index: 3 },
                ChangeRecord::DeleteRow { key: "k20".into(), group: "g".into(), index: 1 },
            ]
        );
        assert_eq!(group_index.count_in_group("g"), 3);
    }
}
