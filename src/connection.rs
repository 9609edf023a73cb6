//! Per-connection endpoint-hint state (spec.md §4.F) and the write
//! transaction that threads it, the dirty sets, and the change-record
//! accumulator through one host transaction.

use std::cell::RefCell;
use std::collections::HashSet;

use rusqlite::Connection as SqliteConnection;

use crate::change::ChangeRecord;
use crate::commit::CommitWriter;
use crate::compact::Compactor;
use crate::group_index::GroupIndex;
use crate::insert::Inserter;
use crate::predicate::{GroupingPredicate, SortingPredicate};
use crate::primary::PrimaryStore;
use crate::query::Query;
use crate::remove::Remover;
use crate::store::PageStore;
use crate::{config::Config, error::Result};

/// `lastInsertWasAtFirstIndex` / `lastInsertWasAtLastIndex`: carried across
/// inserts into any group on the same connection, consulted by the
/// Inserter's endpoint-hint shortcut before falling back to binary search.
#[derive(Clone, Copy, Debug, Default)]
pub struct EndpointHints {
    /// The previous insert (into any group) landed at index 0.
    pub last_insert_was_at_first_index: bool,
    /// The previous insert (into any group) landed at the last index.
    pub last_insert_was_at_last_index: bool,
}

/// A registered ordered view: the backing SQLite connection, its
/// configuration, predicates, the primary-store seam, and the persistent
/// (cross-transaction) [`GroupIndex`] mirror and endpoint hints.
pub struct View {
    conn: SqliteConnection,
    config: Config,
    store: PageStore,
    group_index: GroupIndex,
    primary: Box<dyn PrimaryStore>,
    grouping: GroupingPredicate,
    sorting: SortingPredicate,
    hints: EndpointHints,
    needs_repopulate: bool,
}

impl View {
    /// Opens (or creates) the view's backing tables, reconciling the
    /// registry and rebuilding [`GroupIndex`] from the page table. A
    /// `classVersion` mismatch drops and recreates the tables empty; a
    /// `version` mismatch keeps the tables but sets
    /// [`View::needs_repopulate`] so the caller knows to re-run every
    /// `insert` against the primary store.
    pub fn open(
        conn: SqliteConnection,
        config: Config,
        primary: Box<dyn PrimaryStore>,
        grouping: GroupingPredicate,
        sorting: SortingPredicate,
    ) -> Result<Self> {
        let action = crate::registry::reconcile(&conn, &config)?;
        let needs_repopulate = !matches!(action, crate::registry::RegistryAction::UpToDate);
        let store = PageStore::open(&conn, config.clone())?;
        let mut group_index = GroupIndex::new();
        group_index.prepare_if_needed(store.load_page_rows(&conn)?)?;
        Ok(Self { conn, config, store, group_index, primary, grouping, sorting, hints: EndpointHints::default(), needs_repopulate })
    }

    /// The view's configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// True if the registry reconciliation on open found a `classVersion`
    /// or `version` mismatch: the caller should re-insert every rowid from
    /// the primary store to rebuild the view's contents. Cleared by
    /// [`View::mark_repopulated`].
    pub fn needs_repopulate(&self) -> bool {
        self.needs_repopulate
    }

    /// Clears [`View::needs_repopulate`] once the caller has finished
    /// repopulating.
    pub fn mark_repopulated(&mut self) {
        self.needs_repopulate = false;
    }

    /// Read-only query surface against the current committed state.
    pub fn query(&mut self) -> Query<'_> {
        Query::new(&self.conn, &mut self.store, &self.group_index, self.primary.as_ref())
    }

    /// Begins a write transaction. Only one may be open at a time per
    /// view — the single-writer model spec.md §5 describes.
    pub fn begin(&mut self) -> Result<WriteTxn<'_>> {
        WriteTxn::new(self)
    }
}

/// Buffers one host transaction's mutations: a working copy of
/// [`GroupIndex`], the accumulated change-record stream, and which groups
/// were touched (for mutation-during-enumeration detection).
pub struct WriteTxn<'v> {
    view: &'v mut View,
    group_index: GroupIndex,
    changes: Vec<ChangeRecord>,
    mutated_groups: RefCell<HashSet<String>>,
    finished: bool,
}

impl<'v> WriteTxn<'v> {
    fn new(view: &'v mut View) -> Result<Self> {
        view.conn.execute_batch("BEGIN")?;
        let group_index = view.group_index.clone();
        Ok(Self { view, group_index, changes: Vec::new(), mutated_groups: RefCell::new(HashSet::new()), finished: false })
    }

    /// Inserts `rowid` (the primary store is consulted for its key and,
    /// depending on predicate arity, its object/metadata). `known_new`
    /// skips the existing-position lookup when the caller already knows
    /// the rowid is brand new to the primary store.
    pub fn insert(&mut self, rowid: i64, known_new: bool) -> Result<()> {
        Inserter::insert(
            &self.view.conn,
            &mut self.view.store,
            &mut self.group_index,
            &self.view.config,
            self.view.primary.as_ref(),
            &self.view.grouping,
            &self.view.sorting,
            &mut self.view.hints,
            &mut self.changes,
            &self.mutated_groups,
            rowid,
            known_new,
        )
    }

    /// Removes `rowid` if it currently has a page. `key` is used only for
    /// the emitted `DeleteRow` record.
    pub fn remove(&mut self, rowid: i64, key: &str) -> Result<()> {
        if let Some(change) = Remover::remove_rowid_by_lookup(
            &self.view.conn,
            &mut self.view.store,
            &mut self.group_index,
            rowid,
            key,
        )? {
            if let ChangeRecord::DeleteRow { group, .. } = &change {
                self.mutated_groups.borrow_mut().insert(group.clone());
            }
            self.changes.push(change);
        }
        Ok(())
    }

    /// Bulk-removes every rowid in `keys` known to live in `page_id`/`group`.
    pub fn remove_rowids(
        &mut self,
        group: &str,
        page_id: crate::metadata::PageId,
        keys: &std::collections::HashMap<i64, String>,
    ) -> Result<()> {
        let removed = Remover::remove_rowids(
            &self.view.conn,
            &mut self.view.store,
            &mut self.group_index,
            group,
            page_id,
            keys,
        )?;
        if !removed.is_empty() {
            self.mutated_groups.borrow_mut().insert(group.to_string());
        }
        self.changes.extend(removed);
        Ok(())
    }

    /// Drops every row in every group.
    pub fn remove_all(&mut self) -> Result<()> {
        let removed = Remover::remove_all_rowids(&self.view.conn, &mut self.view.store, &mut self.group_index)?;
        self.changes.extend(removed);
        Ok(())
    }

    /// Runs the pre-commit compactor, flushes dirty state to the backing
    /// tables, commits the SQLite transaction, and adopts the working
    /// [`GroupIndex`] as the view's new persistent state.
    pub fn commit(mut self) -> Result<Vec<ChangeRecord>> {
        let mut extra = Compactor::run_pre_commit(
            &self.view.conn,
            &mut self.view.store,
            &mut self.group_index,
            &self.view.config,
        )?;
        CommitWriter::flush(&self.view.conn, &mut self.view.store, &mut self.group_index)?;
        self.view.conn.execute_batch("COMMIT")?;
        self.view.group_index = std::mem::take(&mut self.group_index);
        self.changes.append(&mut extra);
        self.finished = true;
        Ok(std::mem::take(&mut self.changes))
    }

    /// Rolls back the SQLite transaction and discards this transaction's
    /// `GroupIndex` working copy and dirty sets. The view's persistent
    /// state is left exactly as it was before `begin()`.
    pub fn abort(mut self) -> Result<()> {
        self.view.conn.execute_batch("ROLLBACK")?;
        self.view.store.reset();
        self.finished = true;
        Ok(())
    }
}

impl Drop for WriteTxn<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.view.conn.execute_batch("ROLLBACK");
            self.view.store.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::collection::vec;
    use proptest::prelude::*;

    use crate::predicate::GroupResult;
    use crate::testkit::FixtureStore;

    use super::*;

    fn view_with(rowids_and_keys: &[(i64, i32)]) -> (View, Config) {
        let primary = FixtureStore::new();
        for &(rowid, sort_key) in rowids_and_keys {
            // Offset into a non-negative range so lexical order on the
            // zero-padded decimal string matches numeric order (a raw sign
            // character would sort '+' before '-').
            let offset = (sort_key as i64) + 500_000;
            primary.put(rowid, format!("{:010}", offset), (), ());
        }
        let config = Config::new("proptest", 1);
        let grouping = GroupingPredicate::WithKey(Box::new(|_key| GroupResult::Group("g".into())));
        let sorting = SortingPredicate::WithKey(Box::new(|_g, a, b| a.cmp(b)));
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let view = View::open(conn, config.clone(), Box::new(primary), grouping, sorting).unwrap();
        (view, config)
    }

    proptest! {
        /// Invariant 3 (spec.md §8): consecutive rows within a group stay in
        /// non-decreasing sort order after every commit, however many
        /// distinct rowid/sort-key pairs land in it.
        #[test]
        fn sort_order_holds_after_commit(
            pairs in vec((1i64..10_000, -500_000i32..500_000), 1..200)
                .prop_map(|mut v| { v.sort_by_key(|&(rowid, _)| rowid); v.dedup_by_key(|&mut (rowid, _)| rowid); v })
        ) {
            prop_assume!(!pairs.is_empty());
            let (mut view, _config) = view_with(&pairs);
            let mut txn = view.begin().unwrap();
            for &(rowid, _) in &pairs {
                txn.insert(rowid, true).unwrap();
            }
            txn.commit().unwrap();

            let n = view.query().number_of_keys_in_group("g");
            prop_assert_eq!(n, pairs.len());
            let keys = view.query().keys_in_range(0..n, "g").unwrap();
            for window in keys.windows(2) {
                prop_assert!(window[0] <= window[1]);
            }
        }

        /// Invariant 4 (spec.md §8): after commit, no page is empty and no
        /// page exceeds `page_max`.
        #[test]
        fn page_sizes_are_bounded_after_commit(
            pairs in vec((1i64..10_000, -500_000i32..500_000), 1..400)
                .prop_map(|mut v| { v.sort_by_key(|&(rowid, _)| rowid); v.dedup_by_key(|&mut (rowid, _)| rowid); v })
        ) {
            prop_assume!(!pairs.is_empty());
            let (mut view, config) = view_with(&pairs);
            let mut txn = view.begin().unwrap();
            for &(rowid, _) in &pairs {
                txn.insert(rowid, true).unwrap();
            }
            txn.commit().unwrap();

            let pages = view.group_index.pages_for_group("g").unwrap();
            let mut total = 0;
            for page in pages {
                prop_assert!(page.count > 0);
                prop_assert!(page.count <= config.page_max);
                total += page.count;
            }
            prop_assert_eq!(total, pairs.len());
        }
    }

    #[test]
    fn version_mismatch_sets_needs_repopulate() {
        let path = tempfile::NamedTempFile::new().unwrap().into_temp_path();
        let primary = FixtureStore::new();
        let grouping = GroupingPredicate::WithKey(Box::new(|_key| GroupResult::Group("g".into())));
        let sorting = SortingPredicate::WithKey(Box::new(|_g, a, b| a.cmp(b)));

        {
            let conn = rusqlite::Connection::open(&path).unwrap();
            let view = View::open(conn, Config::new("versioned", 1), Box::new(primary.clone()), grouping, sorting).unwrap();
            assert!(!view.needs_repopulate());
        }

        let conn = rusqlite::Connection::open(&path).unwrap();
        let grouping = GroupingPredicate::WithKey(Box::new(|_key| GroupResult::Group("g".into())));
        let sorting = SortingPredicate::WithKey(Box::new(|_g, a, b| a.cmp(b)));
        let mut view = View::open(conn, Config::new("versioned", 2), Box::new(primary), grouping, sorting).unwrap();
        assert!(view.needs_repopulate());
        view.mark_repopulated();
        assert!(!view.needs_repopulate());
    }
}
