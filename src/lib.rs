//! # orderedview
//!
//! A paged, incrementally-maintained ordered materialized view over a
//! primary key-value store, modeled on extension-view patterns from
//! mobile key-value databases: rows are grouped and sorted by
//! caller-supplied predicates, the resulting per-group ordering is held in
//! fixed-capacity pages chained by a linked list, and every mutation within
//! a host transaction is buffered and flushed atomically at commit.
//!
//! ## Quick start
//!
//! ```rust
//! use orderedview::{Config, GroupingPredicate, GroupResult, PrimaryStore, Result, SortingPredicate, View};
//!
//! struct Contacts;
//! impl PrimaryStore for Contacts {
//!     fn key_for_rowid(&self, rowid: i64) -> Result<String> {
//!         Ok(if rowid == 1 { "alice".into() } else { "bob".into() })
//!     }
//!     fn rowid_for_key(&self, key: &str) -> Result<Option<i64>> {
//!         Ok(if key == "alice" { Some(1) } else { Some(2) })
//!     }
//!     fn object_for_rowid(&self, _rowid: i64) -> Result<orderedview::RowObject> {
//!         Ok(std::sync::Arc::new(()))
//!     }
//!     fn metadata_for_rowid(&self, _rowid: i64) -> Result<orderedview::RowMetadata> {
//!         Ok(std::sync::Arc::new(()))
//!     }
//! }
//!
//! let conn = rusqlite::Connection::open_in_memory()?;
//! let grouping = GroupingPredicate::WithKey(Box::new(|_key| GroupResult::Group("contacts".into())));
//! let sorting = SortingPredicate::WithKey(Box::new(|_group, a, b| a.cmp(b)));
//!
//! let mut view = View::open(conn, Config::new("contacts", 1), Box::new(Contacts), grouping, sorting)?;
//! let mut txn = view.begin()?;
//! txn.insert(1, true)?;
//! txn.insert(2, true)?;
//! let changes = txn.commit()?;
//! assert_eq!(changes.len(), 3); // insertGroup + 2×insertRow
//! # Ok::<(), orderedview::OrderedViewError>(())
//! ```
//!
//! ## Module layout
//!
//! - [`page`] — the fixed-capacity ordered rowid array persisted as one blob.
//! - [`metadata`] — page identity and the `{group, prevPageId, count}` tuple.
//! - [`group_index`] — the in-memory group→pages / page→group maps.
//! - [`store`] — persistence, dirty-set tracking, and bounded clean caches.
//! - [`predicate`] — the grouping/sorting/finding predicate arities.
//! - [`primary`] — the seam onto the host's external key-value row store.
//! - [`insert`] — the insertion-index algorithm.
//! - [`remove`] — single and bulk row removal.
//! - [`compact`] — pre-commit page splitting/collapsing and the inline split.
//! - [`commit`] — draining dirty state into the backing tables.
//! - [`query`] — read-only lookups, range enumeration, and find-range.
//! - [`connection`] — [`View`] and [`WriteTxn`], tying the above together.
//! - [`registry`] — `classVersion`/`version` reconciliation on open.
//! - [`change`] — the per-commit change-record stream.
//! - [`config`] — tunables and table naming.

#![forbid(unsafe_code)]

pub mod change;
pub mod commit;
pub mod compact;
pub mod config;
pub mod connection;
pub mod error;
pub mod group_index;
pub mod insert;
pub mod metadata;
pub mod page;
pub mod predicate;
pub mod primary;
pub mod query;
pub mod registry;
pub mod remove;
pub mod store;
pub mod testkit;

pub use crate::change::{ChangeFlags, ChangeRecord};
pub use crate::config::Config;
pub use crate::connection::{EndpointHints, View, WriteTxn};
pub use crate::error::{OrderedViewError, Result};
pub use crate::group_index::GroupIndex;
pub use crate::metadata::{PageId, PageMetadata};
pub use crate::page::{Direction, Page};
pub use crate::predicate::{FindOrdering, FindPredicate, GroupResult, GroupingPredicate, SortingPredicate};
pub use crate::primary::{PrimaryStore, RowMetadata, RowObject};
pub use crate::query::{Continue, Query};
