//! Grouping, sorting, and finding predicates (Component E).
//!
//! Each predicate is one of four arities, matching which pieces of the row
//! it needs from the primary store. Recording the arity lets the engine skip
//! deserializing an object or metadata blob it will never look at — the
//! dominant cost during a full repopulation.

use std::cmp::Ordering;

use crate::error::Result;
use crate::primary::{RowMetadata, RowObject};

/// Three-valued comparison result a find predicate returns against its
/// implicit target range: `Less` means "before the range", `Greater` means
/// "after the range", `Equal` means "inside the range".
pub type FindOrdering = Ordering;

/// A grouping predicate's result: either the row belongs to `group`, or it
/// is excluded from the view entirely.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GroupResult {
    /// Row belongs to this non-empty group.
    Group(String),
    /// Row is excluded from the view (spec's "absence-of-group" sentinel).
    None,
}

/// A grouping predicate, tagged by the input it needs.
pub enum GroupingPredicate {
    /// Needs only the row's key.
    WithKey(Box<dyn Fn(&str) -> GroupResult>),
    /// Needs the key and the deserialized object.
    WithObject(Box<dyn Fn(&str, &RowObject) -> GroupResult>),
    /// Needs the key and the deserialized metadata.
    WithMetadata(Box<dyn Fn(&str, &RowMetadata) -> GroupResult>),
    /// Needs key, object, and metadata.
    WithRow(Box<dyn Fn(&str, &RowObject, &RowMetadata) -> GroupResult>),
}

/// A sorting predicate, tagged by the input it needs. Must return
/// `Ordering::Equal` for ties; the engine's insertion algorithm resolves
/// ties by upper-bound placement (append among equals).
pub enum SortingPredicate {
    /// Needs only the two rows' keys.
    WithKey(Box<dyn Fn(&str, &str, &str) -> Ordering>),
    /// Needs keys and deserialized objects.
    WithObject(Box<dyn Fn(&str, &str, &str, &RowObject, &RowObject) -> Ordering>),
    /// Needs keys and deserialized metadata.
    WithMetadata(Box<dyn Fn(&str, &str, &str, &RowMetadata, &RowMetadata) -> Ordering>),
    /// Needs keys, objects, and metadata.
    WithRow(
        Box<
            dyn Fn(
                &str,
                &str,
                &str,
                &RowObject,
                &RowObject,
                &RowMetadata,
                &RowMetadata,
            ) -> Ordering,
        >,
    ),
}

/// A find predicate, tagged by the input it needs, used by
/// [`crate::query::Query::find_range_in_group`].
pub enum FindPredicate {
    /// Needs only the key.
    WithKey(Box<dyn Fn(&str) -> FindOrdering>),
    /// Needs the key and the deserialized object.
    WithObject(Box<dyn Fn(&str, &RowObject) -> FindOrdering>),
    /// Needs the key and the deserialized metadata.
    WithMetadata(Box<dyn Fn(&str, &RowMetadata) -> FindOrdering>),
    /// Needs key, object, and metadata.
    WithRow(Box<dyn Fn(&str, &RowObject, &RowMetadata) -> FindOrdering>),
}

impl GroupingPredicate {
    /// True if this predicate's arity requires the row's object.
    pub fn needs_object(&self) -> bool {
        matches!(self, GroupingPredicate::WithObject(_) | GroupingPredicate::WithRow(_))
    }

    /// True if this predicate's arity requires the row's metadata.
    pub fn needs_metadata(&self) -> bool {
        matches!(self, GroupingPredicate::WithMetadata(_) | GroupingPredicate::WithRow(_))
    }

    /// Evaluates the predicate, fetching from `store` only what the arity
    /// requires.
    pub fn group_for(
        &self,
        store: &dyn crate::primary::PrimaryStore,
        rowid: i64,
    ) -> Result<GroupResult> {
        let key = store.key_for_rowid(rowid)?;
        let result = match self {
            GroupingPredicate::WithKey(f) => f(&key),
            GroupingPredicate::WithObject(f) => {
                let object = store.object_for_rowid(rowid)?;
                f(&key, &object)
            }
            GroupingPredicate::WithMetadata(f) => {
                let metadata = store.metadata_for_rowid(rowid)?;
                f(&key, &metadata)
            }
            GroupingPredicate::WithRow(f) => {
                let object = store.object_for_rowid(rowid)?;
                let metadata = store.metadata_for_rowid(rowid)?;
                f(&key, &object, &metadata)
            }
        };
        Ok(result)
    }
}

impl SortingPredicate {
    /// True if this predicate's arity requires deserialized objects.
    pub fn needs_object(&self) -> bool {
        matches!(self, SortingPredicate::WithObject(_) | SortingPredicate::WithRow(_))
    }

    /// True if this predicate's arity requires deserialized metadata.
    pub fn needs_metadata(&self) -> bool {
        matches!(self, SortingPredicate::WithMetadata(_) | SortingPredicate::WithRow(_))
    }

    /// Compares the rows at `key_a`/`rowid_a` and `key_b`/`rowid_b` within
    /// `group`, fetching only what this predicate's arity requires.
    pub fn compare(
        &self,
        store: &dyn crate::primary::PrimaryStore,
        group: &str,
        key_a: &str,
        rowid_a: i64,
        key_b: &str,
        rowid_b: i64,
    ) -> Result<Ordering> {
        let ordering = match self {
            SortingPredicate::WithKey(f) => f(group, key_a, key_b),
            SortingPredicate::WithObject(f) => {
                let obj_a = store.object_for_rowid(rowid_a)?;
                let obj_b = store.object_for_rowid(rowid_b)?;
                f(group, key_a, key_b, &obj_a, &obj_b)
            }
            SortingPredicate::WithMetadata(f) => {
                let meta_a = store.metadata_for_rowid(rowid_a)?;
                let meta_b = store.metadata_for_rowid(rowid_b)?;
                f(group, key_a, key_b, &meta_a, &meta_b)
            }
            SortingPredicate::WithRow(f) => {
                let obj_a = store.object_for_rowid(rowid_a)?;
                let obj_b = store.object_for_rowid(rowid_b)?;
                let meta_a = store.metadata_for_rowid(rowid_a)?;
                let meta_b = store.metadata_for_rowid(rowid_b)?;
                f(group, key_a, key_b, &obj_a, &obj_b, &meta_a, &meta_b)
            }
        };
        Ok(ordering)
    }

    /// True when this sort predicate is declared with an arity that depends
    /// only on the key (`WithKey`) — used by the Inserter to short-circuit
    /// a same-group re-insert straight to an `update` change.
    pub fn depends_only_on_key(&self) -> bool {
        matches!(self, SortingPredicate::WithKey(_))
    }
}

impl FindPredicate {
    /// Evaluates the find predicate against the row at `rowid`/`key`.
    pub fn compare(
        &self,
        store: &dyn crate::primary::PrimaryStore,
        key: &str,
        rowid: i64,
    ) -> Result<FindOrdering> {
        let ordering = match self {
            FindPredicate::WithKey(f) => f(key),
            FindPredicate::WithObject(f) => {
                let object = store.object_for_rowid(rowid)?;
                f(key, &object)
            }
            FindPredicate::WithMetadata(f) => {
                let metadata = store.metadata_for_rowid(rowid)?;
                f(key, &metadata)
            }
            FindPredicate::WithRow(f) => {
                let object = store.object_for_rowid(rowid)?;
                let metadata = store.metadata_for_rowid(rowid)?;
                f(key, &object, &metadata)
            }
        };
        Ok(ordering)
    }
}
