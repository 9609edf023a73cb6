//! Seam onto the primary row store.
//!
//! spec.md treats rowid↔key resolution and object/metadata deserialization
//! as an external collaborator out of scope for this crate. [`PrimaryStore`]
//! is the narrow trait the engine calls through so it compiles and tests
//! standalone; a host embeds a real implementation backed by its own
//! key-value table.

use std::sync::Arc;

use crate::error::Result;

/// Opaque deserialized user object, as the primary store hands it back.
/// The engine never inspects the contents — only predicates do.
pub type RowObject = Arc<dyn std::any::Any + Send + Sync>;

/// Opaque deserialized user metadata, as the primary store hands it back.
pub type RowMetadata = Arc<dyn std::any::Any + Send + Sync>;

/// External collaborator: resolves rowids to keys and deserialized payloads.
///
/// Implementations must be deterministic for a fixed rowid within one
/// transaction (the engine may call any method more than once per rowid).
pub trait PrimaryStore {
    /// Resolves `rowid` to its opaque string key. Must not return an error
    /// for a rowid the caller asserts exists.
    fn key_for_rowid(&self, rowid: i64) -> Result<String>;

    /// Resolves `key` back to a rowid, used by
    /// [`crate::query::Query::group_for_key`] and friends.
    fn rowid_for_key(&self, key: &str) -> Result<Option<i64>>;

    /// Deserializes the row's object, needed only when a predicate's arity
    /// is `WithObject` or `WithRow`.
    fn object_for_rowid(&self, rowid: i64) -> Result<RowObject>;

    /// Deserializes the row's metadata, needed only when a predicate's
    /// arity is `WithMetadata` or `WithRow`.
    fn metadata_for_rowid(&self, rowid: i64) -> Result<RowMetadata>;
}
