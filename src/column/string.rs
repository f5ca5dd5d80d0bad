// Copyright (c) 2024-present, coldb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The unified string column: starts out as a [`ShortStringColumn`] and
//! promotes itself, the first time a row needs 64 or more content bytes,
//! to the [`LongStringColumn`] layout (§4.3). Binary columns reuse the
//! long-string layout directly (`LongStringColumn` makes no assumption
//! about its bytes being text).

use crate::alloc::SlabAlloc;
use crate::column::long_string::LongStringColumn;
use crate::column::short_string::{ShortStringColumn, PROMOTE_AT_LEN};
use crate::error::Result;
use crate::refs::Ref;

#[derive(Copy, Clone, Debug)]
pub enum StringColumn {
    Short(ShortStringColumn),
    Long(LongStringColumn),
}

impl StringColumn {
    pub fn create_empty(alloc: &mut SlabAlloc) -> Result<Self> {
        Ok(Self::Short(ShortStringColumn::create_empty(alloc)?))
    }

    #[must_use]
    pub fn root(self) -> Ref {
        match self {
            Self::Short(c) => c.root,
            Self::Long(c) => c.root,
        }
    }

    /// The discriminant persisted alongside `root()` in a column's
    /// container (§4.3): a long-string B-tree's inner nodes are no longer
    /// shape-distinguishable from a split short-string column's, so the
    /// variant must be recorded explicitly rather than sniffed back out.
    #[must_use]
    pub const fn tag(self) -> i64 {
        match self {
            Self::Short(_) => 0,
            Self::Long(_) => 1,
        }
    }

    /// Reconstructs a `StringColumn` from a `(tag, root)` pair previously
    /// produced by [`Self::tag`]/[`Self::root`].
    ///
    /// # Panics
    ///
    /// Panics if `tag` is neither 0 nor 1.
    #[must_use]
    pub fn from_tagged_root(tag: i64, root: Ref) -> Self {
        match tag {
            0 => Self::Short(ShortStringColumn::from_root(root)),
            1 => Self::Long(LongStringColumn::from_root(root)),
            other => panic!("invalid string column tag {other}"),
        }
    }

    #[must_use]
    pub fn len(self, alloc: &SlabAlloc) -> u64 {
        match self {
            Self::Short(c) => c.len(alloc),
            Self::Long(c) => c.len(alloc),
        }
    }

    #[must_use]
    pub fn get(self, alloc: &SlabAlloc, index: u64) -> Vec<u8> {
        match self {
            Self::Short(c) => c.get(alloc, index),
            Self::Long(c) => c.get(alloc, index),
        }
    }

    pub fn insert(self, alloc: &mut SlabAlloc, index: u64, bytes: &[u8], version: u64) -> Result<Self> {
        match self {
            Self::Short(c) if bytes.len() < PROMOTE_AT_LEN => {
                Ok(Self::Short(c.insert(alloc, index, bytes.to_vec(), version)?))
            }
            Self::Short(c) => {
                let promoted = Self::promote(alloc, c, version)?;
                Ok(Self::Long(promoted.insert(alloc, index, bytes.to_vec(), version)?))
            }
            Self::Long(c) => Ok(Self::Long(c.insert(alloc, index, bytes.to_vec(), version)?)),
        }
    }

    pub fn push(self, alloc: &mut SlabAlloc, bytes: &[u8], version: u64) -> Result<Self> {
        let len = self.len(alloc);
        self.insert(alloc, len, bytes, version)
    }

    /// Replaces the value at `index` in place, promoting to the long-string
    /// layout first if the new value needs it.
    pub fn set(self, alloc: &mut SlabAlloc, index: u64, bytes: &[u8], version: u64) -> Result<Self> {
        let this = self.delete(alloc, index, version)?;
        this.insert(alloc, index, bytes, version)
    }

    pub fn delete(self, alloc: &mut SlabAlloc, index: u64, version: u64) -> Result<Self> {
        match self {
            Self::Short(c) => Ok(Self::Short(c.delete(alloc, index, version)?)),
            Self::Long(c) => Ok(Self::Long(c.delete(alloc, index, version)?)),
        }
    }

    #[must_use]
    pub fn find_first(self, alloc: &SlabAlloc, needle: &[u8]) -> Option<u64> {
        match self {
            Self::Short(c) => (0..c.len(alloc)).find(|&i| c.get(alloc, i) == needle),
            Self::Long(c) => c.find_first(alloc, needle),
        }
    }

    pub fn destroy(self, alloc: &mut SlabAlloc, version: u64) {
        match self {
            Self::Short(c) => c.destroy(alloc, version),
            Self::Long(c) => c.destroy(alloc, version),
        }
    }

    fn promote(alloc: &mut SlabAlloc, short: ShortStringColumn, version: u64) -> Result<LongStringColumn> {
        let mut long = LongStringColumn::create_empty(alloc)?;
        for i in 0..short.len(alloc) {
            let bytes = short.get(alloc, i);
            long = long.insert(alloc, i, bytes, version)?;
        }
        short.destroy(alloc, version);
        Ok(long)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn promotes_on_long_value() {
        let mut alloc = SlabAlloc::open_buffer(Vec::new());
        let mut col = StringColumn::create_empty(&mut alloc).expect("create");
        col = col.push(&mut alloc, b"short", 1).expect("push");
        assert!(matches!(col, StringColumn::Short(_)));

        let long_value = vec![b'x'; 100];
        col = col.push(&mut alloc, &long_value, 1).expect("push");
        assert!(matches!(col, StringColumn::Long(_)));

        assert_eq!(b"short".to_vec(), col.get(&alloc, 0));
        assert_eq!(long_value, col.get(&alloc, 1));
    }

    #[test]
    fn stays_short_below_threshold() {
        let mut alloc = SlabAlloc::open_buffer(Vec::new());
        let mut col = StringColumn::create_empty(&mut alloc).expect("create");
        for s in [&b"a"[..], b"bb", b"ccc"] {
            col = col.push(&mut alloc, s, 1).expect("push");
        }
        assert!(matches!(col, StringColumn::Short(_)));
        assert_eq!(Some(1), col.find_first(&alloc, b"bb"));
    }
}
