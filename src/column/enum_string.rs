// Copyright (c) 2024-present, coldb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Enum string columns (§4.3 "Optimize"): a keys column of unique strings
//! paired with a values column of indices into it. `optimize()` in
//! `crate::table` decides when a plain string column is worth rewriting
//! this way; this module only implements the rewritten representation.

use crate::alloc::SlabAlloc;
use crate::column::int::IntColumn;
use crate::column::string::StringColumn;
use crate::error::Result;

#[derive(Copy, Clone, Debug)]
pub struct EnumStringColumn {
    pub keys: StringColumn,
    pub values: IntColumn,
}

impl EnumStringColumn {
    pub fn create_empty(alloc: &mut SlabAlloc) -> Result<Self> {
        Ok(Self {
            keys: StringColumn::create_empty(alloc)?,
            values: IntColumn::create_empty(alloc)?,
        })
    }

    /// Rewrites a plain string column into an enum column, deduplicating
    /// values into `keys` as they're encountered.
    pub fn build_from(alloc: &mut SlabAlloc, source: StringColumn, version: u64) -> Result<Self> {
        let mut enumed = Self::create_empty(alloc)?;
        for i in 0..source.len(alloc) {
            let bytes = source.get(alloc, i);
            enumed = enumed.insert(alloc, i, &bytes, version)?;
        }
        Ok(enumed)
    }

    #[must_use]
    pub fn len(self, alloc: &SlabAlloc) -> u64 {
        self.values.len(alloc)
    }

    #[must_use]
    pub fn get(self, alloc: &SlabAlloc, index: u64) -> Vec<u8> {
        let key_idx = self.values.get(alloc, index) as u64;
        self.keys.get(alloc, key_idx)
    }

    pub fn insert(mut self, alloc: &mut SlabAlloc, index: u64, bytes: &[u8], version: u64) -> Result<Self> {
        let key_idx = match self.keys.find_first(alloc, bytes) {
            Some(idx) => idx,
            None => {
                let idx = self.keys.len(alloc);
                self.keys = self.keys.push(alloc, bytes, version)?;
                idx
            }
        };
        self.values = self.values.insert(alloc, index, key_idx as i64, version)?;
        Ok(self)
    }

    pub fn push(self, alloc: &mut SlabAlloc, bytes: &[u8], version: u64) -> Result<Self> {
        let len = self.len(alloc);
        self.insert(alloc, len, bytes, version)
    }

    pub fn set(mut self, alloc: &mut SlabAlloc, index: u64, bytes: &[u8], version: u64) -> Result<Self> {
        let key_idx = match self.keys.find_first(alloc, bytes) {
            Some(idx) => idx,
            None => {
                let idx = self.keys.len(alloc);
                self.keys = self.keys.push(alloc, bytes, version)?;
                idx
            }
        };
        self.values = self.values.set(alloc, index, key_idx as i64, version)?;
        Ok(self)
    }

    pub fn delete(mut self, alloc: &mut SlabAlloc, index: u64, version: u64) -> Result<Self> {
        self.values = self.values.delete(alloc, index, version)?;
        Ok(self)
    }

    #[must_use]
    pub fn find_first(self, alloc: &SlabAlloc, needle: &[u8]) -> Option<u64> {
        let key_idx = self.keys.find_first(alloc, needle)?;
        (0..self.values.len(alloc)).find(|&i| self.values.get(alloc, i) as u64 == key_idx)
    }

    pub fn destroy(self, alloc: &mut SlabAlloc, version: u64) {
        self.keys.destroy(alloc, version);
        self.values.destroy(alloc, version);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn dedupes_repeated_values() {
        let mut alloc = SlabAlloc::open_buffer(Vec::new());
        let mut col = EnumStringColumn::create_empty(&mut alloc).expect("create");
        for s in [&b"red"[..], b"green", b"red", b"blue", b"green"] {
            let len = col.len(&alloc);
            col = col.push(&mut alloc, s, 1).expect("push");
            let _ = len;
        }

        assert_eq!(2, col.keys.len(&alloc));
        assert_eq!(b"red".to_vec(), col.get(&alloc, 0));
        assert_eq!(b"green".to_vec(), col.get(&alloc, 1));
        assert_eq!(b"red".to_vec(), col.get(&alloc, 2));
        assert_eq!(Some(3), col.find_first(&alloc, b"blue"));
    }

    #[test]
    fn build_from_plain_column() {
        let mut alloc = SlabAlloc::open_buffer(Vec::new());
        let mut plain = StringColumn::create_empty(&mut alloc).expect("create");
        for s in [&b"x"[..], b"y", b"x"] {
            plain = plain.push(&mut alloc, s, 1).expect("push");
        }

        let enumed = EnumStringColumn::build_from(&mut alloc, plain, 1).expect("build");
        assert_eq!(1, enumed.keys.len(&alloc));
        assert_eq!(b"x".to_vec(), enumed.get(&alloc, 0));
        assert_eq!(b"y".to_vec(), enumed.get(&alloc, 1));
    }
}
