// Copyright (c) 2024-present, coldb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Subtable columns: a [`RefColumn`] whose entries are the top-array refs
//! of per-row subtables, or 0 for a row whose subtable hasn't been
//! materialized yet (§3.1, §4.3).

use crate::alloc::SlabAlloc;
use crate::array::Array;
use crate::column::int::RefColumn;
use crate::error::Result;
use crate::refs::{Ref, NULL_REF};

#[derive(Copy, Clone, Debug)]
pub struct SubtableColumn(pub RefColumn);

impl SubtableColumn {
    pub fn create_empty(alloc: &mut SlabAlloc) -> Result<Self> {
        Ok(Self(RefColumn::create_empty(alloc)?))
    }

    #[must_use]
    pub fn len(self, alloc: &SlabAlloc) -> u64 {
        self.0.len(alloc)
    }

    #[must_use]
    pub fn get_ref(self, alloc: &SlabAlloc, index: u64) -> Ref {
        self.0.get(alloc, index) as u64
    }

    pub fn set_ref(self, alloc: &mut SlabAlloc, index: u64, r: Ref, version: u64) -> Result<Self> {
        Ok(Self(self.0.set(alloc, index, r as i64, version)?))
    }

    /// Inserts a new row with no subtable yet materialized.
    pub fn insert(self, alloc: &mut SlabAlloc, index: u64, version: u64) -> Result<Self> {
        Ok(Self(self.0.insert(alloc, index, NULL_REF as i64, version)?))
    }

    pub fn delete(self, alloc: &mut SlabAlloc, index: u64, version: u64) -> Result<Self> {
        let r = self.get_ref(alloc, index);
        if r != NULL_REF {
            Array::new(r).destroy(alloc, version);
        }
        Ok(Self(self.0.delete(alloc, index, version)?))
    }

    /// Destroys every materialized subtable and the column's own storage.
    pub fn destroy(self, alloc: &mut SlabAlloc, version: u64) {
        self.0.destroy(alloc, version);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn rows_start_without_a_subtable() {
        let mut alloc = SlabAlloc::open_buffer(Vec::new());
        let mut col = SubtableColumn::create_empty(&mut alloc).expect("create");
        col = col.insert(&mut alloc, 0, 1).expect("insert");
        assert_eq!(NULL_REF, col.get_ref(&alloc, 0));
    }

    #[test]
    fn materialized_subtable_survives_round_trip() {
        let mut alloc = SlabAlloc::open_buffer(Vec::new());
        let mut col = SubtableColumn::create_empty(&mut alloc).expect("create");
        col = col.insert(&mut alloc, 0, 1).expect("insert");

        let sub = Array::create_empty(&mut alloc, false).expect("create");
        col = col.set_ref(&mut alloc, 0, sub.ref_, 1).expect("set");
        assert_eq!(sub.ref_, col.get_ref(&alloc, 0));
    }
}
