// Copyright (c) 2024-present, coldb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Leaf kinds backed by a single adaptive-width integer [`Array`] (§4.3):
//! plain values for int/bool/date columns, and tagged refs for every
//! has-refs column (subtable roots, enum indices, mixed types/values).

use crate::alloc::SlabAlloc;
use crate::array::Array;
use crate::column::btree::{BTree, Leaf};
use crate::error::Result;
use crate::refs::Ref;

/// A leaf of plain `i64` values (int/bool/date columns, enum indices).
#[derive(Copy, Clone, Debug)]
pub struct PlainIntLeaf(Array);

impl Leaf for PlainIntLeaf {
    type Item = i64;

    fn create_empty(alloc: &mut SlabAlloc) -> Result<Self> {
        Ok(Self(Array::create_empty(alloc, false)?))
    }
    fn from_ref(r: Ref) -> Self {
        Self(Array::new(r))
    }
    fn ref_of(self) -> Ref {
        self.0.ref_
    }
    fn len(self, alloc: &SlabAlloc) -> u64 {
        self.0.len(alloc)
    }
    fn item_at(self, alloc: &SlabAlloc, index: u64) -> i64 {
        self.0.get(alloc, index)
    }
    fn insert_at(self, alloc: &mut SlabAlloc, index: u64, item: i64, version: u64) -> Result<Self> {
        Ok(Self(self.0.insert(alloc, index, item, version)?))
    }
    fn delete_at(self, alloc: &mut SlabAlloc, index: u64, version: u64) -> Result<Self> {
        Ok(Self(self.0.delete(alloc, index, version)?))
    }
    fn set_at(self, alloc: &mut SlabAlloc, index: u64, item: i64, version: u64) -> Result<Self> {
        Ok(Self(self.0.set(alloc, index, item, version)?))
    }
}

/// A leaf of tagged slots (§3.1): element 0 and bit-0-set elements are not
/// subtrees, everything else is a real ref that destroy() must recurse
/// into. Used for subtable columns and the mixed column's refs-column.
#[derive(Copy, Clone, Debug)]
pub struct RefIntLeaf(Array);

impl Leaf for RefIntLeaf {
    type Item = i64;

    fn create_empty(alloc: &mut SlabAlloc) -> Result<Self> {
        Ok(Self(Array::create_empty(alloc, true)?))
    }
    fn from_ref(r: Ref) -> Self {
        Self(Array::new(r))
    }
    fn ref_of(self) -> Ref {
        self.0.ref_
    }
    fn len(self, alloc: &SlabAlloc) -> u64 {
        self.0.len(alloc)
    }
    fn item_at(self, alloc: &SlabAlloc, index: u64) -> i64 {
        self.0.get(alloc, index)
    }
    fn insert_at(self, alloc: &mut SlabAlloc, index: u64, item: i64, version: u64) -> Result<Self> {
        Ok(Self(self.0.insert(alloc, index, item, version)?))
    }
    fn delete_at(self, alloc: &mut SlabAlloc, index: u64, version: u64) -> Result<Self> {
        Ok(Self(self.0.delete(alloc, index, version)?))
    }
    fn set_at(self, alloc: &mut SlabAlloc, index: u64, item: i64, version: u64) -> Result<Self> {
        Ok(Self(self.0.set(alloc, index, item, version)?))
    }
}

/// A column of plain integers (int/bool/date element types).
pub type IntColumn = BTree<PlainIntLeaf>;
/// A column of tagged-ref slots (subtable roots, mixed refs/types, enum
/// indices when has-refs framing is convenient).
pub type RefColumn = BTree<RefIntLeaf>;

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn plain_int_column_roundtrip() {
        let mut alloc = SlabAlloc::open_buffer(Vec::new());
        let mut col = IntColumn::create_empty(&mut alloc).expect("create");
        for v in [10_i64, -5, 1_000_000] {
            col = col.push(&mut alloc, v, 1).expect("push");
        }
        assert_eq!(vec![10, -5, 1_000_000], (0..3).map(|i| col.get(&alloc, i)).collect::<Vec<_>>());
    }

    #[test]
    fn ref_column_destroy_recurses_into_subtrees() {
        let mut alloc = SlabAlloc::open_buffer(Vec::new());
        let child = Array::create_empty(&mut alloc, false).expect("create");
        let child = child.push(&mut alloc, 42, 1).expect("push");

        let mut col = RefColumn::create_empty(&mut alloc).expect("create");
        col = col.push(&mut alloc, child.ref_ as i64, 1).expect("push");
        col = col.push(&mut alloc, 0, 1).expect("push"); // empty slot
        col = col.push(&mut alloc, (7_i64 << 1) | 1, 1).expect("push"); // inlined scalar

        col.destroy(&mut alloc, 1);
    }
}
