//! An in-memory [`PrimaryStore`] for this crate's own tests, standing in for
//! the host's real key-value table.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{acquire_lock, OrderedViewError, Result};
use crate::primary::{PrimaryStore, RowMetadata, RowObject};

/// One row as the fixture primary store holds it.
#[derive(Clone)]
struct Row {
    key: String,
    object: RowObject,
    metadata: RowMetadata,
}

/// A `PrimaryStore` backed by an in-memory map, for tests. Rowids are
/// assigned by the caller; `put` overwrites an existing rowid's row. Cheaply
/// cloneable (an `Arc` around the map), so a test can keep a handle after
/// handing a boxed copy to `View::open` and mutate rows the view will see
/// on the next lookup.
#[derive(Clone, Default)]
pub struct FixtureStore {
    rows: Arc<Mutex<HashMap<i64, Row>>>,
}

impl FixtureStore {
    /// Empty fixture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces `rowid`'s row.
    pub fn put(&self, rowid: i64, key: impl Into<String>, object: impl std::any::Any + Send + Sync, metadata: impl std::any::Any + Send + Sync) {
        let mut rows = self.rows.lock().expect("fixture store lock poisoned");
        rows.insert(rowid, Row { key: key.into(), object: Arc::new(object), metadata: Arc::new(metadata) });
    }

    /// Removes `rowid` from the fixture (it no longer resolves to anything).
    pub fn remove(&self, rowid: i64) {
        self.rows.lock().expect("fixture store lock poisoned").remove(&rowid);
    }
}

impl PrimaryStore for FixtureStore {
    fn key_for_rowid(&self, rowid: i64) -> Result<String> {
        acquire_lock(&self.rows)?
            .get(&rowid)
            .map(|row| row.key.clone())
            .ok_or_else(|| OrderedViewError::InvariantViolation(format!("fixture has no row for rowid {rowid}")))
    }

    fn rowid_for_key(&self, key: &str) -> Result<Option<i64>> {
        Ok(acquire_lock(&self.rows)?
            .iter()
            .find(|(_, row)| row.key == key)
            .map(|(&rowid, _)| rowid))
    }

    fn object_for_rowid(&self, rowid: i64) -> Result<RowObject> {
        acquire_lock(&self.rows)?
            .get(&rowid)
            .map(|row| row.object.clone())
            .ok_or_else(|| OrderedViewError::InvariantViolation(format!("fixture has no row for rowid {rowid}")))
    }

    fn metadata_for_rowid(&self, rowid: i64) -> Result<RowMetadata> {
        acquire_lock(&self.rows)?
            .get(&rowid)
            .map(|row| row.metadata.clone())
            .ok_or_else(|| OrderedViewError::InvariantViolation(format!("fixture has no row for rowid {rowid}")))
    }
}
