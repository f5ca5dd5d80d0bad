// Copyright (c) 2024-present, coldb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Long-string (and binary) leaves (§4.3): each leaf is an inner `Array`
//! holding `[offsets, blob]`, where `offsets` stores cumulative end
//! positions and `blob` is the raw concatenated bytes for that leaf's rows.
//! Leaves plug into the generic column B-tree
//! ([`crate::column::btree::BTree`]) the same way short strings and plain
//! integers do, so a long-string or binary column past fan-out rows
//! promotes its root to an inner node with two leaf children exactly like
//! every other column.

use crate::alloc::SlabAlloc;
use crate::array::Array;
use crate::column::btree::{BTree, Leaf};
use crate::error::Result;
use crate::refs::Ref;

#[derive(Copy, Clone, Debug)]
pub struct LongStringLeaf(Array);

impl LongStringLeaf {
    fn offsets(self, alloc: &SlabAlloc) -> Array {
        self.0.offsets_child(alloc)
    }

    fn blob(self, alloc: &SlabAlloc) -> Array {
        self.0.refs_child(alloc)
    }

    fn rebuild(alloc: &mut SlabAlloc, ends: &[i64], bytes: &[u8], version: u64) -> Result<Self> {
        let mut new_offsets = Array::create_empty(alloc, false)?;
        for &e in ends {
            new_offsets = new_offsets.push(alloc, e, version)?;
        }
        let new_blob = Array::create_blob(alloc)?.append_blob(alloc, bytes, version)?;
        let new_node = Array::create_inner_node(alloc, new_offsets, new_blob, version)?;
        Ok(Self(new_node))
    }
}

impl Leaf for LongStringLeaf {
    type Item = Vec<u8>;

    fn create_empty(alloc: &mut SlabAlloc) -> Result<Self> {
        let offsets = Array::create_empty(alloc, false)?;
        let blob = Array::create_blob(alloc)?;
        // A freshly allocated leaf's children are scratch, never read-only,
        // so the version tag stamped here is inert until the first real
        // mutation carries a caller-supplied one forward.
        let root = Array::create_inner_node(alloc, offsets, blob, 0)?;
        Ok(Self(root))
    }

    fn from_ref(r: Ref) -> Self {
        Self(Array::new(r))
    }

    fn ref_of(self) -> Ref {
        self.0.ref_
    }

    fn len(self, alloc: &SlabAlloc) -> u64 {
        self.offsets(alloc).len(alloc)
    }

    fn item_at(self, alloc: &SlabAlloc, index: u64) -> Vec<u8> {
        let offsets = self.offsets(alloc);
        let end = offsets.get(alloc, index) as usize;
        let start = if index == 0 { 0 } else { offsets.get(alloc, index - 1) as usize };
        self.blob(alloc).blob_bytes(alloc)[start..end].to_vec()
    }

    fn insert_at(self, alloc: &mut SlabAlloc, index: u64, item: Vec<u8>, version: u64) -> Result<Self> {
        let offsets = self.offsets(alloc);
        let start = if index == 0 { 0 } else { offsets.get(alloc, index - 1) as usize };
        let mut all_bytes = self.blob(alloc).blob_bytes(alloc).to_vec();
        all_bytes.splice(start..start, item.iter().copied());

        let len = offsets.len(alloc);
        let mut ends: Vec<i64> = (0..len).map(|i| offsets.get(alloc, i)).collect();
        let shift = item.len() as i64;
        for e in ends.iter_mut().skip(index as usize) {
            *e += shift;
        }
        ends.insert(index as usize, start as i64 + shift);

        let new_leaf = Self::rebuild(alloc, &ends, &all_bytes, version)?;
        self.0.destroy(alloc, version);
        Ok(new_leaf)
    }

    fn delete_at(self, alloc: &mut SlabAlloc, index: u64, version: u64) -> Result<Self> {
        let offsets = self.offsets(alloc);
        let end = offsets.get(alloc, index) as usize;
        let start = if index == 0 { 0 } else { offsets.get(alloc, index - 1) as usize };
        let removed_len = (end - start) as i64;

        let mut all_bytes = self.blob(alloc).blob_bytes(alloc).to_vec();
        all_bytes.splice(start..end, std::iter::empty());

        let len = offsets.len(alloc);
        let mut ends: Vec<i64> = (0..len).map(|i| offsets.get(alloc, i)).collect();
        ends.remove(index as usize);
        for e in ends.iter_mut().skip(index as usize) {
            *e -= removed_len;
        }

        let new_leaf = Self::rebuild(alloc, &ends, &all_bytes, version)?;
        self.0.destroy(alloc, version);
        Ok(new_leaf)
    }

    fn set_at(self, alloc: &mut SlabAlloc, index: u64, item: Vec<u8>, version: u64) -> Result<Self> {
        let deleted = self.delete_at(alloc, index, version)?;
        deleted.insert_at(alloc, index, item, version)
    }
}

/// A column of variable-length byte strings, used directly for `Binary`
/// columns and for `String` columns once a value is promoted past
/// [`super::short_string::PROMOTE_AT_LEN`] (§4.3).
pub type LongStringColumn = BTree<LongStringLeaf>;

impl LongStringColumn {
    #[must_use]
    pub fn find_first(self, alloc: &SlabAlloc, needle: &[u8]) -> Option<u64> {
        (0..self.len(alloc)).find(|&i| self.get(alloc, i) == needle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::btree::FANOUT;
    use test_log::test;

    #[test]
    fn insert_get_delete_roundtrip() {
        let mut alloc = SlabAlloc::open_buffer(Vec::new());
        let mut col = LongStringColumn::create_empty(&mut alloc).expect("create");
        col = col.insert(&mut alloc, 0, b"hello".to_vec(), 1).expect("insert");
        col = col.insert(&mut alloc, 1, b"world".to_vec(), 1).expect("insert");
        col = col.insert(&mut alloc, 1, b"cruel".to_vec(), 1).expect("insert");

        assert_eq!(b"hello".to_vec(), col.get(&alloc, 0));
        assert_eq!(b"cruel".to_vec(), col.get(&alloc, 1));
        assert_eq!(b"world".to_vec(), col.get(&alloc, 2));

        col = col.delete(&mut alloc, 1, 1).expect("delete");
        assert_eq!(b"hello".to_vec(), col.get(&alloc, 0));
        assert_eq!(b"world".to_vec(), col.get(&alloc, 1));
        assert_eq!(2, col.len(&alloc));
    }

    #[test]
    fn find_first_locates_row() {
        let mut alloc = SlabAlloc::open_buffer(Vec::new());
        let mut col = LongStringColumn::create_empty(&mut alloc).expect("create");
        for s in [&b"aa"[..], b"bb", b"cc"] {
            col = col.push(&mut alloc, s.to_vec(), 1).expect("push");
        }
        assert_eq!(Some(1), col.find_first(&alloc, b"bb"));
        assert_eq!(None, col.find_first(&alloc, b"zz"));
    }

    #[test]
    fn column_past_fanout_becomes_an_inner_node_and_collapses_back_on_delete() {
        let mut alloc = SlabAlloc::open_buffer(Vec::new());
        let mut col = LongStringColumn::create_empty(&mut alloc).expect("create");

        let n = FANOUT + 10;
        for i in 0..n {
            col = col.push(&mut alloc, format!("row-{i}").into_bytes(), 1).expect("push");
        }
        assert!(Array::new(col.root).is_inner(&alloc));
        for i in 0..n {
            assert_eq!(format!("row-{i}").into_bytes(), col.get(&alloc, i));
        }

        for _ in 0..(n - 1) {
            col = col.delete(&mut alloc, 0, 1).expect("delete");
        }
        assert!(!Array::new(col.root).is_inner(&alloc));
        assert_eq!(1, col.len(&alloc));
        assert_eq!(format!("row-{}", n - 1).into_bytes(), col.get(&alloc, 0));
    }
}
