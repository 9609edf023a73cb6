//! Fixed-capacity ordered array of rowids (Component A).
//!
//! A [`Page`] is the unit the view persists as a single blob. It is
//! deliberately dumb: no knowledge of groups, sort order, or capacity limits
//! lives here — those are enforced by [`crate::insert::Inserter`] and
//! [`crate::compact::Compactor`]. The page only guarantees that the sequence
//! it holds stays in the order callers put it in.

use std::ops::Range;

use crate::error::{OrderedViewError, Result};

/// Direction to walk a page's rowids in [`Page::enumerate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Ascending local index.
    Forward,
    /// Descending local index.
    Reverse,
}

/// Ordered sequence of rowids backing one page of one group.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Page {
    rowids: Vec<i64>,
}

impl Page {
    /// Empty page.
    pub fn new() -> Self {
        Self { rowids: Vec::new() }
    }

    /// Builds a page from an already-ordered sequence (used when
    /// deserializing or when the caller has pre-sorted data).
    pub fn from_rowids(rowids: Vec<i64>) -> Self {
        Self { rowids }
    }

    /// Number of rowids currently held.
    pub fn count(&self) -> usize {
        self.rowids.len()
    }

    /// True when the page holds no rowids.
    pub fn is_empty(&self) -> bool {
        self.rowids.is_empty()
    }

    /// Rowid at `index`, if in bounds.
    pub fn rowid_at(&self, index: usize) -> Option<i64> {
        self.rowids.get(index).copied()
    }

    /// First position holding `rowid`, treating duplicates within a page as
    /// unreachable (the source disallows a rowid appearing twice in a page).
    pub fn index_of(&self, rowid: i64) -> Option<usize> {
        self.rowids.iter().position(|&r| r == rowid)
    }

    /// Inserts `rowid` at `index`, shifting the tail right.
    ///
    /// # Errors
    /// [`OrderedViewError::InvariantViolation`] if `index > count()`.
    pub fn insert(&mut self, index: usize, rowid: i64) -> Result<()> {
        if index > self.rowids.len() {
            return Err(OrderedViewError::InvariantViolation(format!(
                "page insert index {index} out of bounds (count {})",
                self.rowids.len()
            )));
        }
        self.rowids.insert(index, rowid);
        Ok(())
    }

    /// Appends `rowid` to the end of the page.
    pub fn append(&mut self, rowid: i64) {
        self.rowids.push(rowid);
    }

    /// Removes and returns the rowid at `index`, shifting the tail left.
    ///
    /// # Errors
    /// [`OrderedViewError::InvariantViolation`] if `index >= count()`.
    pub fn remove_at(&mut self, index: usize) -> Result<i64> {
        if index >= self.rowids.len() {
            return Err(OrderedViewError::InvariantViolation(format!(
                "page remove index {index} out of bounds (count {})",
                self.rowids.len()
            )));
        }
        Ok(self.rowids.remove(index))
    }

    /// Removes every index in `range`, in one shift.
    pub fn remove_range(&mut self, range: Range<usize>) -> Result<()> {
        if range.end > self.rowids.len() || range.start > range.end {
            return Err(OrderedViewError::InvariantViolation(format!(
                "page remove_range {range:?} out of bounds (count {})",
                self.rowids.len()
            )));
        }
        self.rowids.drain(range);
        Ok(())
    }

    /// Moves `range` of `other`'s rowids to the end of `self`, removing them
    /// from `other`. Used by the compactor to rebalance pages.
    pub fn append_range_from(&mut self, other: &mut Page, range: Range<usize>) -> Result<()> {
        if range.end > other.rowids.len() || range.start > range.end {
            return Err(OrderedViewError::InvariantViolation(format!(
                "append_range_from {range:?} out of bounds (count {})",
                other.rowids.len()
            )));
        }
        let moved: Vec<i64> = other.rowids.drain(range).collect();
        self.rowids.extend(moved);
        Ok(())
    }

    /// Moves `range` of `other`'s rowids to the start of `self`, removing
    /// them from `other`.
    pub fn prepend_range_from(&mut self, other: &mut Page, range: Range<usize>) -> Result<()> {
        if range.end > other.rowids.len() || range.start > range.end {
            return Err(OrderedViewError::InvariantViolation(format!(
                "prepend_range_from {range:?} out of bounds (count {})",
                other.rowids.len()
            )));
        }
        let moved: Vec<i64> = other.rowids.drain(range).collect();
        for (offset, rowid) in moved.into_iter().enumerate() {
            self.rowids.insert(offset, rowid);
        }
        Ok(())
    }

    /// Visits `(rowid, local_index)` pairs within `range` in `direction`,
    /// stopping early if `cb` returns `false`.
    pub fn enumerate<F>(&self, range: Range<usize>, direction: Direction, mut cb: F)
    where
        F: FnMut(i64, usize) -> bool,
    {
        let end = range.end.min(self.rowids.len());
        if range.start >= end {
            return;
        }
        match direction {
            Direction::Forward => {
                for idx in range.start..end {
                    if !cb(self.rowids[idx], idx) {
                        return;
                    }
                }
            }
            Direction::Reverse => {
                for idx in (range.start..end).rev() {
                    if !cb(self.rowids[idx], idx) {
                        return;
                    }
                }
            }
        }
    }

    /// Serializes to a stable blob: a class-version byte followed by
    /// big-endian `i64` rowids. Kept intentionally simple — the format is
    /// opaque to the rest of the system per spec.
    pub fn serialize(&self) -> Vec<u8> {
        const CLASS_VERSION: u8 = 1;
        let mut buf = Vec::with_capacity(1 + self.rowids.len() * 8);
        buf.push(CLASS_VERSION);
        for &rowid in &self.rowids {
            buf.extend_from_slice(&rowid.to_be_bytes());
        }
        buf
    }

    /// Deserializes a blob produced by [`Page::serialize`].
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let Some((&class_version, body)) = bytes.split_first() else {
            return Err(OrderedViewError::Corruption("empty page blob".into()));
        };
        if class_version != 1 {
            return Err(OrderedViewError::Corruption(format!(
                "unsupported page blob class version {class_version}"
            )));
        }
        if body.len() % 8 != 0 {
            return Err(OrderedViewError::Corruption(
                "page blob length not a multiple of 8 after header".into(),
            ));
        }
        let rowids = body
            .chunks_exact(8)
            .map(|chunk| i64::from_be_bytes(chunk.try_into().expect("chunks_exact(8)")))
            .collect();
        Ok(Self { rowids })
    }

    /// Full rowid sequence, in order. Intended for tests and the compactor.
    pub fn as_slice(&self) -> &[i64] {
        &self.rowids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_remove_shift_correctly() {
        let mut page = Page::new();
        page.insert(0, 10).unwrap();
        page.insert(1, 30).unwrap();
        page.insert(1, 20).unwrap();
        assert_eq!(page.as_slice(), &[10, 20, 30]);
        assert_eq!(page.remove_at(1).unwrap(), 20);
        assert_eq!(page.as_slice(), &[10, 30]);
    }

    #[test]
    fn index_of_finds_unique_rowid() {
        let page = Page::from_rowids(vec![5, 6, 7]);
        assert_eq!(page.index_of(6), Some(1));
        assert_eq!(page.index_of(99), None);
    }

    #[test]
    fn serialize_round_trips() {
        let page = Page::from_rowids(vec![1, -2, 3_000_000_000]);
        let bytes = page.serialize();
        let back = Page::deserialize(&bytes).unwrap();
        assert_eq!(page, back);
    }

    #[test]
    fn append_range_from_moves_suffix() {
        let mut src = Page::from_rowids(vec![1, 2, 3, 4, 5]);
        let mut dst = Page::from_rowids(vec![100]);
        dst.append_range_from(&mut src, 3..5).unwrap();
        assert_eq!(src.as_slice(), &[1, 2, 3]);
        assert_eq!(dst.as_slice(), &[100, 4, 5]);
    }

    #[test]
    fn prepend_range_from_moves_prefix_in_order() {
        let mut src = Page::from_rowids(vec![1, 2, 3, 4, 5]);
        let mut dst = Page::from_rowids(vec![100]);
        dst.prepend_range_from(&mut src, 0..2).unwrap();
        assert_eq!(src.as_slice(), &[3, 4, 5]);
        assert_eq!(dst.as_slice(), &[1, 2, 100]);
    }

    #[test]
    fn enumerate_respects_direction_and_range() {
        let page = Page::from_rowids(vec![10, 20, 30, 40]);
        let mut seen = Vec::new();
        page.enumerate(1..3, Direction::Forward, |rowid, idx| {
            seen.push((rowid, idx));
            true
        });
        assert_eq!(seen, vec![(20, 1), (30, 2)]);

        let mut seen_rev = Vec::new();
        page.enumerate(0..4, Direction::Reverse, |rowid, idx| {
            seen_rev.push((rowid, idx));
            idx != 2
        });
        assert_eq!(seen_rev, vec![(40, 3), (30, 2)]);
    }

    #[test]
    fn deserialize_rejects_bad_version() {
        let err = Page::deserialize(&[9, 0, 0, 0, 0, 0, 0, 0, 1]).unwrap_err();
        assert!(matches!(err, OrderedViewError::Corruption(_)));
    }
}
