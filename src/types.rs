//! Arena index newtypes.
//!
//! These newtypes prevent accidentally mixing an index into the cons arena
//! with a byte offset into the storage arena; both are plain `u32`s
//! underneath but mean different things.

use std::fmt;

/// Index of a cell in the cons arena.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConsIndex(u32);

impl ConsIndex {
    #[inline]
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ConsIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConsIndex(#{})", self.0)
    }
}

/// Byte offset of a block header in the storage arena. Always word-aligned.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorageIndex(u32);

impl StorageIndex {
    #[inline]
    #[must_use]
    pub const fn new(offset: u32) -> Self {
        Self(offset)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for StorageIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageIndex(#{})", self.0)
    }
}

#[cfg(test)]
mod types_test {
    use super::*;

    #[test]
    fn cons_index_roundtrip() {
        let idx = ConsIndex::new(7);
        assert_eq!(idx.as_u32(), 7);
        assert_eq!(idx.as_usize(), 7_usize);
        assert_eq!(format!("{idx:?}"), "ConsIndex(#7)");
    }

    #[test]
    fn storage_index_roundtrip() {
        let idx = StorageIndex::new(128);
        assert_eq!(idx.as_u32(), 128);
        assert_eq!(format!("{idx:?}"), "StorageIndex(#128)");
    }

    #[test]
    fn indices_are_not_interchangeable_types() {
        // This is a compile-time property: ConsIndex and StorageIndex are
        // distinct types even though both wrap a u32. The test below just
        // documents that equality is reflexive per-type.
        assert_eq!(ConsIndex::new(1), ConsIndex::new(1));
        assert_ne!(ConsIndex::new(1), ConsIndex::new(2));
        assert_eq!(StorageIndex::new(1), StorageIndex::new(1));
    }
}
