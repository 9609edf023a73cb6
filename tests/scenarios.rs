//! End-to-end scenarios against the public `View`/`WriteTxn` surface.

use orderedview::testkit::FixtureStore;
use orderedview::{ChangeFlags, ChangeRecord, Config, GroupResult, GroupingPredicate, SortingPredicate, View};

fn open_view(name: &str, primary: FixtureStore, grouping: GroupingPredicate, sorting: SortingPredicate) -> View {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    View::open(conn, Config::new(name, 1), Box::new(primary), grouping, sorting).unwrap()
}

fn always_group_g() -> GroupingPredicate {
    GroupingPredicate::WithKey(Box::new(|_key| GroupResult::Group("g".into())))
}

#[test]
fn s1_ties_resolve_to_append_order() {
    let primary = FixtureStore::new();
    primary.put(1, "a", (), ());
    primary.put(2, "b", (), ());
    primary.put(3, "c", (), ());

    let sorting = SortingPredicate::WithKey(Box::new(|_g, _a, _b| std::cmp::Ordering::Equal));
    let mut view = open_view("s1", primary, always_group_g(), sorting);

    let mut txn = view.begin().unwrap();
    txn.insert(1, true).unwrap();
    txn.insert(2, true).unwrap();
    txn.insert(3, true).unwrap();
    txn.commit().unwrap();

    let keys = view.query().keys_in_range(0..3, "g").unwrap();
    assert_eq!(keys, vec!["a", "b", "c"]);
}

#[test]
fn s2_endpoint_hint_places_new_max_at_the_end() {
    let primary = FixtureStore::new();
    for i in 1..=100i64 {
        primary.put(i, format!("{i:03}"), (), ());
    }
    let sorting = SortingPredicate::WithKey(Box::new(|_g, a, b| a.cmp(b)));
    let mut view = open_view("s2", primary.clone(), always_group_g(), sorting);

    let mut txn = view.begin().unwrap();
    for i in 1..=100i64 {
        txn.insert(i, true).unwrap();
    }
    txn.commit().unwrap();

    primary.put(101, "101", (), ());
    let mut txn = view.begin().unwrap();
    txn.insert(101, true).unwrap();
    let changes = txn.commit().unwrap();

    assert_eq!(
        changes,
        vec![ChangeRecord::InsertRow { key: "101".into(), group: "g".into(), index: 100 }]
    );
    assert_eq!(view.query().number_of_keys_in_group("g"), 101);
}

#[test]
fn s3_oversized_group_splits_before_commit() {
    let primary = FixtureStore::new();
    for i in 0..51i64 {
        primary.put(i, format!("{i:04}"), (), ());
    }
    let sorting = SortingPredicate::WithKey(Box::new(|_g, a, b| a.cmp(b)));
    let mut view = open_view("s3", primary, always_group_g(), sorting);

    let mut txn = view.begin().unwrap();
    for i in 0..51i64 {
        txn.insert(i, true).unwrap();
    }
    let changes = txn.commit().unwrap();

    let insert_group_count = changes.iter().filter(|c| matches!(c, ChangeRecord::InsertGroup { .. })).count();
    let insert_row_count = changes.iter().filter(|c| matches!(c, ChangeRecord::InsertRow { .. })).count();
    assert_eq!(insert_group_count, 1);
    assert_eq!(insert_row_count, 51);
    assert_eq!(view.query().number_of_keys_in_group("g"), 51);

    let keys = view.query().keys_in_range(0..51, "g").unwrap();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted, "rows must still be in ascending sort order after the split");
}

#[test]
fn s4_group_migration_emits_delete_and_insert() {
    let primary = FixtureStore::new();
    primary.put(1, "k1", "A".to_string(), ());

    let grouping = GroupingPredicate::WithObject(Box::new(|_key, object| {
        let group = object.downcast_ref::<String>().expect("object is a group-tag string");
        GroupResult::Group(group.clone())
    }));
    let sorting = SortingPredicate::WithKey(Box::new(|_g, a, b| a.cmp(b)));
    let mut view = open_view("s4", primary.clone(), grouping, sorting);

    let mut txn = view.begin().unwrap();
    txn.insert(1, true).unwrap();
    txn.commit().unwrap();
    assert_eq!(view.query().group_for_key("k1").unwrap(), Some("A".to_string()));

    primary.put(1, "k1", "B".to_string(), ());
    let mut txn = view.begin().unwrap();
    txn.insert(1, false).unwrap();
    let changes = txn.commit().unwrap();

    assert!(changes.contains(&ChangeRecord::DeleteRow { key: "k1".into(), group: "A".into(), index: 0 }));
    assert!(changes.contains(&ChangeRecord::InsertGroup { group: "B".into() }));
    assert!(changes.contains(&ChangeRecord::InsertRow { key: "k1".into(), group: "B".into(), index: 0 }));
    assert!(changes.contains(&ChangeRecord::DeleteGroup { group: "A".into() }));

    assert_eq!(view.query().group_for_key("k1").unwrap(), Some("B".to_string()));
    assert_eq!(view.query().number_of_groups(), 1);
}

#[test]
fn reinsert_same_group_with_unchanged_key_emits_update_not_move() {
    let primary = FixtureStore::new();
    primary.put(1, "k1", (), ());
    primary.put(2, "k2", (), ());
    let sorting = SortingPredicate::WithKey(Box::new(|_g, a, b| a.cmp(b)));
    let mut view = open_view("update", primary, always_group_g(), sorting);

    let mut txn = view.begin().unwrap();
    txn.insert(1, true).unwrap();
    txn.insert(2, true).unwrap();
    txn.commit().unwrap();

    let mut txn = view.begin().unwrap();
    txn.insert(1, false).unwrap();
    let changes = txn.commit().unwrap();

    assert_eq!(
        changes,
        vec![ChangeRecord::UpdateRow { key: "k1".into(), group: "g".into(), index: 0, flags: ChangeFlags::NONE }]
    );
}

#[test]
fn reposition_within_one_page_keeps_the_rowid_map_entry() {
    // A non-`WithKey` sort predicate takes the "existing-position fast
    // path" in Inserter::insert, which removes the row (tombstoning its
    // rowid->page map entry) and reinserts it when the row's neighbors no
    // longer bracket it. When the row lands back in the same page, the
    // rowid->page mapping must still be resolvable after commit.
    let primary = FixtureStore::new();
    primary.put(1, "k1", 10i64, ());
    primary.put(2, "k2", 20i64, ());
    primary.put(3, "k3", 30i64, ());

    let sorting = SortingPredicate::WithObject(Box::new(|_g, _key_a, _key_b, a, b| {
        let a = *a.downcast_ref::<i64>().expect("object is an i64 sort key");
        let b = *b.downcast_ref::<i64>().expect("object is an i64 sort key");
        a.cmp(&b)
    }));
    let mut view = open_view("reposition", primary.clone(), always_group_g(), sorting);

    let mut txn = view.begin().unwrap();
    txn.insert(1, true).unwrap();
    txn.insert(2, true).unwrap();
    txn.insert(3, true).unwrap();
    txn.commit().unwrap();
    assert_eq!(view.query().keys_in_range(0..3, "g").unwrap(), vec!["k1", "k2", "k3"]);

    // Move k1 (object 10) past k2 (object 20) without crossing k3 (object
    // 30); the row stays in group "g"'s single page but changes slots.
    primary.put(1, "k1", 25i64, ());
    let mut txn = view.begin().unwrap();
    txn.insert(1, false).unwrap();
    txn.commit().unwrap();

    assert_eq!(view.query().keys_in_range(0..3, "g").unwrap(), vec!["k2", "k1", "k3"]);
    assert_eq!(view.query().group_for_key("k1").unwrap(), Some("g".to_string()));
    assert_eq!(view.query().get_group_and_index_for_key("k1").unwrap(), Some(("g".to_string(), 1)));

    // Removing it afterward must find it through the rowid->page map
    // rather than silently no-op because the map entry was lost.
    let mut txn = view.begin().unwrap();
    txn.remove(1, "k1").unwrap();
    let changes = txn.commit().unwrap();
    assert!(changes.contains(&ChangeRecord::DeleteRow { key: "k1".into(), group: "g".into(), index: 1 }));
    assert_eq!(view.query().number_of_keys_in_group("g"), 2);
}

#[test]
fn remove_drops_the_row_and_then_the_group() {
    let primary = FixtureStore::new();
    primary.put(1, "only", (), ());
    let sorting = SortingPredicate::WithKey(Box::new(|_g, a, b| a.cmp(b)));
    let mut view = open_view("remove", primary, always_group_g(), sorting);

    let mut txn = view.begin().unwrap();
    txn.insert(1, true).unwrap();
    txn.commit().unwrap();

    let mut txn = view.begin().unwrap();
    txn.remove(1, "only").unwrap();
    let changes = txn.commit().unwrap();

    assert!(changes.contains(&ChangeRecord::DeleteRow { key: "only".into(), group: "g".into(), index: 0 }));
    assert!(changes.contains(&ChangeRecord::DeleteGroup { group: "g".into() }));
    assert_eq!(view.query().number_of_groups(), 0);
}

#[test]
fn reopen_rebuilds_group_index_from_the_page_table() {
    let conn_path = tempfile::NamedTempFile::new().unwrap().into_temp_path();
    let primary = FixtureStore::new();
    for i in 0..60i64 {
        primary.put(i, format!("{i:04}"), (), ());
    }

    {
        let conn = rusqlite::Connection::open(&conn_path).unwrap();
        let mut view = View::open(conn, Config::new("reopen", 1), Box::new(primary.clone()), always_group_g(), sorting_clone()).unwrap();
        let mut txn = view.begin().unwrap();
        for i in 0..60i64 {
            txn.insert(i, true).unwrap();
        }
        txn.commit().unwrap();
    }

    let conn = rusqlite::Connection::open(&conn_path).unwrap();
    let sorting = SortingPredicate::WithKey(Box::new(|_g, a, b| a.cmp(b)));
    let mut view = View::open(conn, Config::new("reopen", 1), Box::new(primary), always_group_g(), sorting).unwrap();
    assert_eq!(view.query().number_of_keys_in_group("g"), 60);
    let keys = view.query().keys_in_range(0..60, "g").unwrap();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

fn sorting_clone() -> SortingPredicate {
    SortingPredicate::WithKey(Box::new(|_g, a, b| a.cmp(b)))
}
