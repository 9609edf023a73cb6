//! Change-record stream emitted per commit (spec.md §6).
//!
//! Records describe positional deltas so an observer (a UI diffing layer, an
//! external mirror) can reconcile without re-enumerating the whole view.
//! Order matters: the stream is emitted in the order the engine appended it
//! (spec.md §5), never resorted or batched by kind.

/// Which parts of a row changed, for [`ChangeRecord::UpdateRow`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChangeFlags {
    /// The row's deserialized object changed.
    pub object: bool,
    /// The row's deserialized metadata changed.
    pub metadata: bool,
}

impl ChangeFlags {
    /// No fields changed (used when only position changed).
    pub const NONE: ChangeFlags = ChangeFlags { object: false, metadata: false };
}

/// One entry in the per-commit change-record stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeRecord {
    /// A group went from absent to present.
    InsertGroup {
        /// The group that came into existence.
        group: String,
    },
    /// A group went from present to absent (its last page was dropped).
    DeleteGroup {
        /// The group that was removed.
        group: String,
    },
    /// A group's pages were dropped and will be fully repopulated
    /// (`removeAllRowids`).
    ResetGroup {
        /// The group being reset.
        group: String,
    },
    /// A row was inserted at `index` within `group`.
    InsertRow {
        /// The row's key, as resolved from the primary store.
        key: String,
        /// The group the row was inserted into.
        group: String,
        /// Position within the group's ordered sequence, post-insert.
        index: usize,
    },
    /// A row was removed from `index` within `group`.
    DeleteRow {
        /// The row's key.
        key: String,
        /// The group the row was removed from.
        group: String,
        /// Position within the group's ordered sequence, pre-remove.
        index: usize,
    },
    /// A row already at `index` within `group` had its object and/or
    /// metadata change, or kept its position after a predicate re-evaluation.
    UpdateRow {
        /// The row's key.
        key: String,
        /// The group the row stays in.
        group: String,
        /// Position within the group's ordered sequence.
        index: usize,
        /// Which parts of the row changed.
        flags: ChangeFlags,
    },
}
