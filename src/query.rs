//! Read-only access against the committed state: index lookups, range
//! enumeration, and find-range via triple binary search (Component J).

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::ops::Range;

use rusqlite::Connection;

use crate::error::{OrderedViewError, Result};
use crate::group_index::GroupIndex;
use crate::metadata::PageId;
use crate::page::Direction;
use crate::predicate::FindPredicate;
use crate::primary::PrimaryStore;
use crate::store::PageStore;

/// Read-only surface over one connection's committed state. Borrows the
/// store mutably only because reads populate the clean caches.
pub struct Query<'c> {
    conn: &'c Connection,
    store: &'c mut PageStore,
    group_index: &'c GroupIndex,
    primary: &'c dyn PrimaryStore,
}

/// Whether an enumeration callback asked to keep going or stop early.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Continue {
    /// Keep enumerating.
    Yes,
    /// Stop after this callback.
    No,
}

impl<'c> Query<'c> {
    pub(crate) fn new(
        conn: &'c Connection,
        store: &'c mut PageStore,
        group_index: &'c GroupIndex,
        primary: &'c dyn PrimaryStore,
    ) -> Self {
        Self { conn, store, group_index, primary }
    }

    /// Number of groups with at least one row.
    pub fn number_of_groups(&self) -> usize {
        self.group_index.number_of_groups()
    }

    /// Every group name, in unspecified order.
    pub fn all_groups(&self) -> Vec<String> {
        self.group_index.all_groups()
    }

    /// Number of rowids in `group` (0 if the group doesn't exist).
    pub fn number_of_keys_in_group(&self, group: &str) -> usize {
        self.group_index.count_in_group(group)
    }

    /// Number of rowids across every group.
    pub fn number_of_keys_in_all_groups(&self) -> usize {
        self.group_index.count_in_all_groups()
    }

    /// Resolves the key at global `index` within `group` by walking the
    /// page-metadata list to find the containing page, then the primary
    /// store to resolve the rowid's key.
    pub fn key_at_index(&mut self, index: usize, group: &str) -> Result<String> {
        let (rowid, _) = self.rowid_at(group, index)?;
        self.primary.key_for_rowid(rowid)
    }

    /// Resolves `key`'s group, if the key is currently in the view.
    pub fn group_for_key(&mut self, key: &str) -> Result<Option<String>> {
        let Some(rowid) = self.primary.rowid_for_key(key)? else {
            return Ok(None);
        };
        let Some(page_id) = self.store.page_id_for_rowid(self.conn, rowid)? else {
            return Ok(None);
        };
        Ok(self.group_index.group_of_page(page_id).map(str::to_string))
    }

    /// Resolves `key`'s (group, index) pair, if the key is currently in the
    /// view.
    pub fn get_group_and_index_for_key(&mut self, key: &str) -> Result<Option<(String, usize)>> {
        let Some(rowid) = self.primary.rowid_for_key(key)? else {
            return Ok(None);
        };
        let Some(page_id) = self.store.page_id_for_rowid(self.conn, rowid)? else {
            return Ok(None);
        };
        let Some(group) = self.group_index.group_of_page(page_id).map(str::to_string) else {
            return Ok(None);
        };
        let offset = crate::remove::Remover::page_offset(self.group_index, &group, page_id)?;
        let page = self.store.page(self.conn, page_id)?;
        let local = page.index_of(rowid).ok_or_else(|| {
            OrderedViewError::InvariantViolation(format!(
                "page {page_id} mapped from rowid {rowid} but missing it"
            ))
        })?;
        Ok(Some((group, offset + local)))
    }

    /// Resolves the keys at `range` within `group`, in order.
    pub fn keys_in_range(&mut self, range: Range<usize>, group: &str) -> Result<Vec<String>> {
        let mut keys = Vec::with_capacity(range.len());
        self.enumerate_rowids_in_group(group, range, Direction::Forward, &RefCell::new(HashSet::new()), |rowid, _index| {
            keys.push(rowid);
            Continue::Yes
        })?;
        keys.into_iter().map(|rowid| self.primary.key_for_rowid(rowid)).collect()
    }

    /// Three-stage binary search for the maximal contiguous `[a, b)` within
    /// `group` where `predicate` evaluates to `Ordering::Equal` (spec.md
    /// §4.J): first any equal index `M`, then the leftmost equal `S` in
    /// `[0, M]`, then the rightmost equal-plus-one `E` in `[M, N]`.
    pub fn find_range_in_group(&mut self, group: &str, predicate: &FindPredicate) -> Result<Range<usize>> {
        let n = self.group_index.count_in_group(group);
        if n == 0 {
            return Ok(0..0);
        }

        let mut cmp = |query: &mut Self, index: usize| -> Result<Ordering> {
            let (rowid, key) = query.rowid_at(group, index)?;
            predicate.compare(query.primary, &key, rowid)
        };

        let mut lo = 0usize;
        let mut hi = n;
        let mut found = None;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match cmp(self, mid)? {
                Ordering::Equal => {
                    found = Some(mid);
                    break;
                }
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
            }
        }
        let Some(m) = found else {
            return Ok(0..0);
        };

        let mut lo = 0usize;
        let mut hi = m;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if cmp(self, mid)? == Ordering::Less {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        let s = lo;

        let mut lo = m;
        let mut hi = n;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if cmp(self, mid)? == Ordering::Greater {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        let e = lo;

        Ok(s..e)
    }

    /// Visits `(rowid, global_index)` pairs within `range` of `group`, in
    /// `direction`, clipping against each page's `[pageOffset,
    /// pageOffset+count)` interval so no page is read outside what `range`
    /// actually needs. Detects a mutation to `group` made by the callback
    /// itself (the callback is expected to run inside the same transaction
    /// it's observing) by clearing `group` from `mutated_groups` up front
    /// and checking it's still absent after every non-stopping callback.
    pub fn enumerate_rowids_in_group<F>(
        &mut self,
        group: &str,
        range: Range<usize>,
        direction: Direction,
        mutated_groups: &RefCell<HashSet<String>>,
        mut cb: F,
    ) -> Result<()>
    where
        F: FnMut(i64, usize) -> Continue,
    {
        mutated_groups.borrow_mut().remove(group);

        let Some(pages) = self.group_index.pages_for_group(group) else {
            return Ok(());
        };
        let pages: Vec<_> = pages.to_vec();

        let plan: Vec<(PageId, Range<usize>, usize)> = {
            let mut plan = Vec::new();
            let mut offset = 0;
            for meta in &pages {
                let page_start = offset;
                let page_end = offset + meta.count;
                let clip_start = range.start.max(page_start);
                let clip_end = range.end.min(page_end);
                if clip_start < clip_end {
                    plan.push((meta.page_id, (clip_start - page_start)..(clip_end - page_start), page_start));
                }
                offset = page_end;
            }
            plan
        };

        let ordered_plan: Vec<_> = match direction {
            Direction::Forward => plan,
            Direction::Reverse => plan.into_iter().rev().collect(),
        };

        for (page_id, local_range, page_start) in ordered_plan {
            let page = self.store.page(self.conn, page_id)?;
            let mut stop = false;
            page.enumerate(local_range, direction, |rowid, local_index| {
                let outcome = cb(rowid, page_start + local_index);
                if outcome == Continue::No {
                    stop = true;
                    return false;
                }
                true
            });
            if mutated_groups.borrow().contains(group) && !stop {
                return Err(OrderedViewError::MutationDuringEnumeration(group.to_string()));
            }
            if stop {
                break;
            }
        }
        Ok(())
    }

    fn rowid_at(&mut self, group: &str, index: usize) -> Result<(i64, String)> {
        let pages = self.group_index.pages_for_group(group).ok_or_else(|| {
            OrderedViewError::InvariantViolation(format!("group {group:?} has no pages"))
        })?;
        let mut offset = 0;
        for meta in pages.to_vec() {
            if index < offset + meta.count {
                let page = self.store.page(self.conn, meta.page_id)?;
                let rowid = page.rowid_at(index - offset).ok_or_else(|| {
                    OrderedViewError::InvariantViolation(format!(
                        "page {} missing rowid at local index {}",
                        meta.page_id,
                        index - offset
                    ))
                })?;
                let key = self.primary.key_for_rowid(rowid)?;
                return Ok((rowid, key));
            }
            offset += meta.count;
        }
        Err(OrderedViewError::InvariantViolation(format!(
            "index {index} out of bounds for group {group:?} (total {offset})"
        )))
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::metadata::PageMetadata;
    use crate::page::Page;
    use crate::testkit::FixtureStore;

    use super::*;

    fn fixture() -> (rusqlite::Connection, PageStore, GroupIndex, FixtureStore) {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let config = Config::new("enum", 1);
        let mut store = PageStore::open(&conn, config).unwrap();
        let mut group_index = GroupIndex::new();
        let primary = FixtureStore::new();

        let page = Page::from_rowids(vec![1, 2, 3]);
        let metadata = PageMetadata::new_page("g", None, page.count());
        store.put_page(metadata.page_id, page);
        group_index.insert_group("g".into(), vec![metadata]);
        for (rowid, key) in [(1, "a"), (2, "b"), (3, "c")] {
            primary.put(rowid, key, (), ());
        }
        (conn, store, group_index, primary)
    }

    #[test]
    fn enumerate_visits_rowids_in_order() {
        let (conn, mut store, group_index, primary) = fixture();
        let mut query = Query::new(&conn, &mut store, &group_index, &primary);
        let mutated = RefCell::new(HashSet::new());
        let mut seen = Vec::new();
        query
            .enumerate_rowids_in_group("g", 0..3, Direction::Forward, &mutated, |rowid, index| {
                seen.push((rowid, index));
                Continue::Yes
            })
            .unwrap();
        assert_eq!(seen, vec![(1, 0), (2, 1), (3, 2)]);
    }

    #[test]
    fn mutation_during_enumeration_is_detected() {
        let (conn, mut store, group_index, primary) = fixture();
        let mut query = Query::new(&conn, &mut store, &group_index, &primary);
        let mutated = RefCell::new(HashSet::new());
        let err = query
            .enumerate_rowids_in_group("g", 0..3, Direction::Forward, &mutated, |_rowid, _index| {
                // Simulates the Inserter/Remover recording a concurrent
                // mutation to "g" partway through enumeration.
                mutated.borrow_mut().insert("g".to_string());
                Continue::Yes
            })
            .unwrap_err();
        assert!(matches!(err, OrderedViewError::MutationDuringEnumeration(group) if group == "g"));
    }

    #[test]
    fn stopping_the_callback_suppresses_mutation_detection() {
        let (conn, mut store, group_index, primary) = fixture();
        let mut query = Query::new(&conn, &mut store, &group_index, &primary);
        let mutated = RefCell::new(HashSet::new());
        query
            .enumerate_rowids_in_group("g", 0..3, Direction::Forward, &mutated, |_rowid, _index| {
                mutated.borrow_mut().insert("g".to_string());
                Continue::No
            })
            .unwrap();
    }
}
