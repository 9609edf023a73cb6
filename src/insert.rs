//! Locates the insertion index for a rowid using the sort predicate and
//! emits change records (Component F).
//!
//! The three-step insertion-index algorithm — existing-position fast path,
//! endpoint-hint shortcut, binary search — is spec.md §4.F's core
//! contribution: each step is tried in order and only falls through to the
//! next when it can't place the row on its own.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashSet;

use rusqlite::Connection;

use crate::change::ChangeRecord;
use crate::compact::Compactor;
use crate::config::Config;
use crate::connection::EndpointHints;
use crate::error::{OrderedViewError, Result};
use crate::group_index::GroupIndex;
use crate::metadata::{PageId, PageMetadata};
use crate::predicate::{GroupResult, GroupingPredicate, SortingPredicate};
use crate::primary::PrimaryStore;
use crate::remove::Remover;

/// Locates insertion indices and writes rowids into pages.
pub struct Inserter;

/// Materializes the rowid at a group index and compares it against the row
/// being inserted, fetching only what `sorting`'s arity requires. Named per
/// the "explicit compare context instead of a closure capturing mutable
/// outer state" design note.
struct CompareContext<'a> {
    conn: &'a Connection,
    store: &'a mut crate::store::PageStore,
    group_index: &'a GroupIndex,
    primary: &'a dyn PrimaryStore,
    sorting: &'a SortingPredicate,
    group: &'a str,
    new_key: String,
    new_rowid: i64,
}

impl<'a> CompareContext<'a> {
    /// Ordering of the row being inserted relative to the row currently at
    /// `index` in the group (spec.md's `cmp(index)`).
    fn cmp_at(&mut self, index: usize) -> Result<Ordering> {
        let (rowid, key) = rowid_and_key_at(self.conn, self.store, self.group_index, self.primary, self.group, index)?;
        self.sorting.compare(self.primary, self.group, &self.new_key, self.new_rowid, &key, rowid)
    }
}

/// Walks `group`'s page list to find the page containing global `index`,
/// returning the rowid there and its resolved key.
fn rowid_and_key_at(
    conn: &Connection,
    store: &mut crate::store::PageStore,
    group_index: &GroupIndex,
    primary: &dyn PrimaryStore,
    group: &str,
    index: usize,
) -> Result<(i64, String)> {
    let pages = group_index.pages_for_group(group).ok_or_else(|| {
        OrderedViewError::InvariantViolation(format!("group {group:?} has no pages"))
    })?;
    let mut offset = 0;
    for meta in pages {
        if index < offset + meta.count {
            let page = store.page(conn, meta.page_id)?;
            let rowid = page.rowid_at(index - offset).ok_or_else(|| {
                OrderedViewError::InvariantViolation(format!(
                    "page {} missing rowid at local index {}",
                    meta.page_id,
                    index - offset
                ))
            })?;
            let key = primary.key_for_rowid(rowid)?;
            return Ok((rowid, key));
        }
        offset += meta.count;
    }
    Err(OrderedViewError::InvariantViolation(format!(
        "index {index} out of bounds for group {group:?} (total {offset})"
    )))
}

impl Inserter {
    /// Inserts or re-evaluates `rowid`'s position. `known_new` skips both
    /// existing-position lookups when the caller already knows the rowid has
    /// no current page (e.g. a primary-store insert, as opposed to an
    /// update that may have moved the row between groups or within one).
    #[allow(clippy::too_many_arguments)]
    pub fn insert(
        conn: &Connection,
        store: &mut crate::store::PageStore,
        group_index: &mut GroupIndex,
        config: &Config,
        primary: &dyn PrimaryStore,
        grouping: &GroupingPredicate,
        sorting: &SortingPredicate,
        hints: &mut EndpointHints,
        changes: &mut Vec<ChangeRecord>,
        mutated_groups: &RefCell<HashSet<String>>,
        rowid: i64,
        known_new: bool,
    ) -> Result<()> {
        let group_result = grouping.group_for(primary, rowid)?;
        let group = match group_result {
            GroupResult::None => {
                if !known_new {
                    if let Some(existing_page_id) = store.page_id_for_rowid(conn, rowid)? {
                        let existing_group = group_index
                            .group_of_page(existing_page_id)
                            .ok_or_else(|| {
                                OrderedViewError::InvariantViolation(format!(
                                    "page {existing_page_id} untracked in GroupIndex"
                                ))
                            })?
                            .to_string();
                        let key = primary.key_for_rowid(rowid)?;
                        let change = Remover::remove_rowid(conn, store, group_index, &existing_group, existing_page_id, rowid, &key)?;
                        mutated_groups.borrow_mut().insert(existing_group);
                        changes.push(change);
                    }
                }
                return Ok(());
            }
            GroupResult::Group(group) => group,
        };
        let key = primary.key_for_rowid(rowid)?;

        let mut try_existing_index: Option<usize> = None;
        let mut existing_page_id: Option<PageId> = None;

        if let Some(found_page_id) = if known_new { None } else { store.page_id_for_rowid(conn, rowid)? } {
            let found_group = group_index
                .group_of_page(found_page_id)
                .ok_or_else(|| {
                    OrderedViewError::InvariantViolation(format!(
                        "page {found_page_id} untracked in GroupIndex"
                    ))
                })?
                .to_string();

            if found_group == group {
                if sorting.depends_only_on_key() {
                    let offset = Remover::page_offset(group_index, &group, found_page_id)?;
                    let page = store.page(conn, found_page_id)?;
                    let local = page.index_of(rowid).ok_or_else(|| {
                        OrderedViewError::InvariantViolation(format!(
                            "page {found_page_id} missing expected rowid {rowid}"
                        ))
                    })?;
                    changes.push(ChangeRecord::UpdateRow {
                        key,
                        group: group.clone(),
                        index: offset + local,
                        flags: crate::change::ChangeFlags::NONE,
                    });
                    mutated_groups.borrow_mut().insert(group);
                    return Ok(());
                }
                let offset = Remover::page_offset(group_index, &group, found_page_id)?;
                let page = store.page(conn, found_page_id)?;
                let local = page.index_of(rowid).ok_or_else(|| {
                    OrderedViewError::InvariantViolation(format!(
                        "page {found_page_id} missing expected rowid {rowid}"
                    ))
                })?;
                try_existing_index = Some(offset + local);
                existing_page_id = Some(found_page_id);
            } else {
                let change = Remover::remove_rowid(conn, store, group_index, &found_group, found_page_id, rowid, &key)?;
                mutated_groups.borrow_mut().insert(found_group);
                changes.push(change);
            }
        }

        if !group_index.has_group(&group) {
            let mut page = crate::page::Page::new();
            page.append(rowid);
            let metadata = PageMetadata::new_page(group.clone(), None, 1);
            let page_id = metadata.page_id;
            store.put_page(page_id, page);
            store.set_rowid_page(rowid, page_id);
            group_index.insert_group(group.clone(), vec![metadata]);
            changes.push(ChangeRecord::InsertGroup { group: group.clone() });
            changes.push(ChangeRecord::InsertRow { key, group: group.clone(), index: 0 });
            mutated_groups.borrow_mut().insert(group);
            return Ok(());
        }

        let mut n = group_index.count_in_group(&group);

        if let Some(existing_index) = try_existing_index {
            let mut ctx = CompareContext { conn, store, group_index, primary, sorting, group: &group, new_key: key.clone(), new_rowid: rowid };
            let prev_ok = existing_index == 0 || ctx.cmp_at(existing_index - 1)? != Ordering::Less;
            let next_ok = existing_index + 1 >= n || ctx.cmp_at(existing_index + 1)? != Ordering::Greater;
            if prev_ok && next_ok {
                changes.push(ChangeRecord::UpdateRow {
                    key,
                    group: group.clone(),
                    index: existing_index,
                    flags: crate::change::ChangeFlags::NONE,
                });
                mutated_groups.borrow_mut().insert(group);
                return Ok(());
            }
            let remove_change = Remover::remove_rowid(
                conn,
                store,
                group_index,
                &group,
                existing_page_id.expect("existing_index implies existing_page_id"),
                rowid,
                &key,
            )?;
            changes.push(remove_change);
            n -= 1;
        }

        let index = if n == 0 {
            0
        } else if hints.last_insert_was_at_first_index && n > 1 {
            let mut ctx = CompareContext { conn, store, group_index, primary, sorting, group: &group, new_key: key.clone(), new_rowid: rowid };
            if ctx.cmp_at(0)? == Ordering::Less {
                0
            } else {
                Self::binary_search(conn, store, group_index, primary, sorting, &group, &key, rowid, n)?
            }
        } else if hints.last_insert_was_at_last_index && n > 1 {
            let mut ctx = CompareContext { conn, store, group_index, primary, sorting, group: &group, new_key: key.clone(), new_rowid: rowid };
            if ctx.cmp_at(n - 1)? != Ordering::Less {
                n
            } else {
                Self::binary_search(conn, store, group_index, primary, sorting, &group, &key, rowid, n)?
            }
        } else {
            Self::binary_search(conn, store, group_index, primary, sorting, &group, &key, rowid, n)?
        };

        hints.last_insert_was_at_first_index = index == 0;
        hints.last_insert_was_at_last_index = index == n;

        Self::insert_at(conn, store, group_index, config, &group, &key, index, rowid, changes)?;
        mutated_groups.borrow_mut().insert(group);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn binary_search(
        conn: &Connection,
        store: &mut crate::store::PageStore,
        group_index: &GroupIndex,
        primary: &dyn PrimaryStore,
        sorting: &SortingPredicate,
        group: &str,
        key: &str,
        rowid: i64,
        n: usize,
    ) -> Result<usize> {
        let mut lo = 0usize;
        let mut hi = n;
        let mut ctx = CompareContext { conn, store, group_index, primary, sorting, group, new_key: key.to_string(), new_rowid: rowid };
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if ctx.cmp_at(mid)? == Ordering::Less {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        Ok(lo)
    }

    /// Places `rowid` at global `index` within `group`, choosing the
    /// containing page per spec.md's boundary-bias rule, then splits the
    /// page inline if it crossed the hard trigger.
    #[allow(clippy::too_many_arguments)]
    fn insert_at(
        conn: &Connection,
        store: &mut crate::store::PageStore,
        group_index: &mut GroupIndex,
        config: &Config,
        group: &str,
        key: &str,
        index: usize,
        rowid: i64,
        changes: &mut Vec<ChangeRecord>,
    ) -> Result<()> {
        let (target_page_id, local_index) = {
            let pages = group_index.pages_for_group(group).ok_or_else(|| {
                OrderedViewError::InvariantViolation(format!("group {group:?} has no pages"))
            })?;
            let mut offset = 0;
            let mut chosen = None;
            for (i, meta) in pages.iter().enumerate() {
                let page_end = offset + meta.count;
                if index < page_end {
                    chosen = Some((meta.page_id, index - offset));
                    break;
                }
                if index == page_end {
                    // Boundary between this page and the next (or the very
                    // end of the list). Bias toward the next page unless
                    // this page has spare capacity and the next is full.
                    if let Some(next) = pages.get(i + 1) {
                        let this_has_spare = meta.count < config.page_max;
                        let next_is_full = next.count >= config.page_max;
                        if this_has_spare && next_is_full {
                            chosen = Some((meta.page_id, index - offset));
                        } else {
                            chosen = Some((next.page_id, 0));
                        }
                    } else {
                        chosen = Some((meta.page_id, index - offset));
                    }
                    break;
                }
                offset = page_end;
            }
            chosen.ok_or_else(|| {
                OrderedViewError::InvariantViolation(format!(
                    "insertion index {index} out of bounds for group {group:?}"
                ))
            })?
        };

        let mut page = store.page(conn, target_page_id)?;
        page.insert(local_index, rowid)?;
        let new_count = page.count();
        store.put_page(target_page_id, page);
        if let Some(meta) = group_index.metadata_mut(target_page_id) {
            meta.count = new_count;
        }
        // Always (re)write the rowid->page mapping, even when the rowid
        // lands back in the page it was already in: a same-group
        // reposition removes the row first (see Remover::remove_rowid,
        // which tombstones the rowid's map entry), so landing back in the
        // same page must still clear that tombstone rather than leave it
        // pending for the commit writer to act on.
        store.set_rowid_page(rowid, target_page_id);
        changes.push(ChangeRecord::InsertRow { key: key.to_string(), group: group.to_string(), index });

        if new_count > config.hard_trigger {
            Compactor::split_oversized_inline(conn, store, group_index, config, target_page_id)?;
        }
        Ok(())
    }
}
