use std::io;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, OrderedViewError>;

/// Errors surfaced by the ordered view engine.
///
/// Propagation policy: `Storage` and `InvariantViolation` abort the current
/// writer transaction. `Corruption` is only ever returned from
/// [`crate::group_index::GroupIndex::prepare_if_needed`] and leaves the view
/// unavailable until the caller drops and rebuilds the backing tables.
#[derive(Debug, Error)]
pub enum OrderedViewError {
    /// I/O error underneath the backing store.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The backing SQLite tables rejected a read or write.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    /// The page table failed to reconstruct a consistent linked list on open.
    #[error("corruption detected: {0}")]
    Corruption(String),
    /// A runtime invariant (page missing a rowid, metadata missing for a
    /// known page id) was violated mid-transaction.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    /// A user callback mutated `group` while enumerating it.
    #[error("mutation during enumeration of group {0:?}")]
    MutationDuringEnumeration(String),
    /// Caller misuse: null key/group or similar bad input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Locks `mutex`, converting poisoning into a [`OrderedViewError::Corruption`]
/// rather than panicking.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| {
        error!("ordered view lock poisoned - fatal error");
        OrderedViewError::Corruption("lock poisoned".into())
    })
}
