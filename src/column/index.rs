// Copyright (c) 2024-present, coldb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Secondary indexes (§4.3 "Indexes"): a sorted column of distinct keys
//! paired with a has-refs column of row positions, one slot per key.
//! `Slot::Inline(row)` covers the common single-row-per-key case;
//! `Slot::Ref` points at a plain `IntColumn` of row numbers when a key
//! has duplicates.

use crate::alloc::SlabAlloc;
use crate::array::{partition_point, Array};
use crate::column::int::{IntColumn, RefColumn};
use crate::error::Result;
use crate::refs::Slot;

#[derive(Copy, Clone, Debug)]
pub struct Index {
    pub keys: IntColumn,
    pub rows: RefColumn,
}

impl Index {
    pub fn create_empty(alloc: &mut SlabAlloc) -> Result<Self> {
        Ok(Self {
            keys: IntColumn::create_empty(alloc)?,
            rows: RefColumn::create_empty(alloc)?,
        })
    }

    /// Builds an index over every row of a plain integer column, in
    /// ascending row order (so duplicate lists come out sorted too).
    pub fn build_from(alloc: &mut SlabAlloc, source: IntColumn, version: u64) -> Result<Self> {
        let mut index = Self::create_empty(alloc)?;
        for row in 0..source.len(alloc) {
            let key = source.get(alloc, row);
            index = index.insert(alloc, key, row, version)?;
        }
        Ok(index)
    }

    /// Returns the position in `keys` at which `key` is (or would be
    /// inserted to keep the column sorted).
    #[must_use]
    fn find_key_pos(self, alloc: &SlabAlloc, key: i64) -> u64 {
        let keys = self.keys;
        partition_point(keys.len(alloc), |i| keys.get(alloc, i) < key)
    }

    #[must_use]
    pub fn find_first(self, alloc: &SlabAlloc, key: i64) -> Option<u64> {
        let pos = self.find_key_pos(alloc, key);
        if pos >= self.keys.len(alloc) || self.keys.get(alloc, pos) != key {
            return None;
        }
        match Slot::from_raw(self.rows.get(alloc, pos)) {
            Slot::Inline(row) => Some(row as u64),
            Slot::Ref(r) => {
                let list = IntColumn::from_root(r);
                (list.len(alloc) > 0).then(|| list.get(alloc, 0) as u64)
            }
            Slot::Empty => None,
        }
    }

    #[must_use]
    pub fn find_all(self, alloc: &SlabAlloc, key: i64) -> Vec<u64> {
        let pos = self.find_key_pos(alloc, key);
        if pos >= self.keys.len(alloc) || self.keys.get(alloc, pos) != key {
            return Vec::new();
        }
        match Slot::from_raw(self.rows.get(alloc, pos)) {
            Slot::Inline(row) => vec![row as u64],
            Slot::Ref(r) => {
                let list = IntColumn::from_root(r);
                (0..list.len(alloc)).map(|i| list.get(alloc, i) as u64).collect()
            }
            Slot::Empty => Vec::new(),
        }
    }

    /// Records that `row` now holds `key`.
    pub fn insert(mut self, alloc: &mut SlabAlloc, key: i64, row: u64, version: u64) -> Result<Self> {
        let pos = self.find_key_pos(alloc, key);
        let is_new_key = pos >= self.keys.len(alloc) || self.keys.get(alloc, pos) != key;

        if is_new_key {
            self.keys = self.keys.insert(alloc, pos, key, version)?;
            self.rows = self.rows.insert(alloc, pos, Slot::Inline(row as i64).to_raw(), version)?;
            return Ok(self);
        }

        match Slot::from_raw(self.rows.get(alloc, pos)) {
            Slot::Inline(existing) => {
                let mut list = IntColumn::create_empty(alloc)?;
                list = list.push(alloc, existing, version)?;
                list = list.push(alloc, row as i64, version)?;
                self.rows = self.rows.set(alloc, pos, Slot::Ref(list.root).to_raw(), version)?;
            }
            Slot::Ref(r) => {
                let list = IntColumn::from_root(r);
                let list = list.push(alloc, row as i64, version)?;
                self.rows = self.rows.set(alloc, pos, Slot::Ref(list.root).to_raw(), version)?;
            }
            Slot::Empty => {
                self.rows = self.rows.set(alloc, pos, Slot::Inline(row as i64).to_raw(), version)?;
            }
        }
        Ok(self)
    }

    /// Removes one occurrence of `(key, row)` from the index.
    pub fn remove(mut self, alloc: &mut SlabAlloc, key: i64, row: u64, version: u64) -> Result<Self> {
        let pos = self.find_key_pos(alloc, key);
        if pos >= self.keys.len(alloc) || self.keys.get(alloc, pos) != key {
            return Ok(self);
        }

        match Slot::from_raw(self.rows.get(alloc, pos)) {
            Slot::Inline(existing) if existing as u64 == row => {
                self.keys = self.keys.delete(alloc, pos, version)?;
                self.rows = self.rows.delete(alloc, pos, version)?;
            }
            Slot::Ref(r) => {
                let list = IntColumn::from_root(r);
                if let Some(list_pos) = (0..list.len(alloc)).find(|&i| list.get(alloc, i) as u64 == row) {
                    let list = list.delete(alloc, list_pos, version)?;
                    if list.len(alloc) == 1 {
                        let sole = list.get(alloc, 0);
                        list.destroy(alloc, version);
                        self.rows = self.rows.set(alloc, pos, Slot::Inline(sole).to_raw(), version)?;
                    } else {
                        self.rows = self.rows.set(alloc, pos, Slot::Ref(list.root).to_raw(), version)?;
                    }
                }
            }
            _ => {}
        }
        Ok(self)
    }

    pub fn destroy(self, alloc: &mut SlabAlloc, version: u64) {
        self.keys.destroy(alloc, version);
        self.rows.destroy(alloc, version);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn single_row_per_key_round_trip() {
        let mut alloc = SlabAlloc::open_buffer(Vec::new());
        let mut idx = Index::create_empty(&mut alloc).expect("create");
        idx = idx.insert(&mut alloc, 30, 2, 1).expect("insert");
        idx = idx.insert(&mut alloc, 10, 0, 1).expect("insert");
        idx = idx.insert(&mut alloc, 20, 1, 1).expect("insert");

        assert_eq!(Some(0), idx.find_first(&alloc, 10));
        assert_eq!(Some(1), idx.find_first(&alloc, 20));
        assert_eq!(Some(2), idx.find_first(&alloc, 30));
        assert_eq!(None, idx.find_first(&alloc, 99));

        let keys: Vec<i64> = (0..idx.keys.len(&alloc)).map(|i| idx.keys.get(&alloc, i)).collect();
        assert_eq!(vec![10, 20, 30], keys);
    }

    #[test]
    fn duplicate_keys_accumulate_and_shrink_back() {
        let mut alloc = SlabAlloc::open_buffer(Vec::new());
        let mut idx = Index::create_empty(&mut alloc).expect("create");
        idx = idx.insert(&mut alloc, 5, 0, 1).expect("insert");
        idx = idx.insert(&mut alloc, 5, 1, 1).expect("insert");
        idx = idx.insert(&mut alloc, 5, 2, 1).expect("insert");

        assert_eq!(vec![0_u64, 1, 2], idx.find_all(&alloc, 5));

        idx = idx.remove(&mut alloc, 5, 1, 1).expect("remove");
        assert_eq!(vec![0_u64, 2], idx.find_all(&alloc, 5));

        idx = idx.remove(&mut alloc, 5, 0, 1).expect("remove");
        assert_eq!(vec![2_u64], idx.find_all(&alloc, 5));
        assert_eq!(Some(2), idx.find_first(&alloc, 5));
    }

    #[test]
    fn build_from_existing_column() {
        let mut alloc = SlabAlloc::open_buffer(Vec::new());
        let mut col = IntColumn::create_empty(&mut alloc).expect("create");
        for v in [7_i64, 3, 7, 1] {
            col = col.push(&mut alloc, v, 1).expect("push");
        }

        let idx = Index::build_from(&mut alloc, col, 1).expect("build");
        assert_eq!(vec![0_u64, 2], idx.find_all(&alloc, 7));
        assert_eq!(Some(3), idx.find_first(&alloc, 1));
    }
}
