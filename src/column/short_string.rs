// Copyright (c) 2024-present, coldb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Short-string leaves: fixed-width padded bytes, width-type `Multiply`
//! (§4.3). The slot width grows through `{4,8,16,32,64}` bytes as strings
//! grow; strings that would need 64 or more content bytes are promoted to
//! the long-string layout by the caller ([`super::string::StringColumn`]).

use crate::alloc::SlabAlloc;
use crate::array::Array;
use crate::column::btree::{BTree, Leaf};
use crate::error::Result;
use crate::refs::Ref;

/// Content length, in bytes, above which a short-string column must
/// promote to the long-string layout (§4.3).
pub const PROMOTE_AT_LEN: usize = 64;

const WIDTHS: [u8; 5] = [4, 8, 16, 32, 64];

fn width_for(content_len: usize) -> u8 {
    debug_assert!(content_len < PROMOTE_AT_LEN);
    WIDTHS
        .iter()
        .copied()
        .find(|&w| content_len + 1 <= w as usize)
        .unwrap_or(64)
}

#[derive(Copy, Clone, Debug)]
pub struct ShortStringLeaf(Array);

impl ShortStringLeaf {
    #[must_use]
    pub fn array(self) -> Array {
        self.0
    }
}

impl Leaf for ShortStringLeaf {
    type Item = Vec<u8>;

    fn create_empty(alloc: &mut SlabAlloc) -> Result<Self> {
        Ok(Self(Array::create_fixed_bytes(alloc, 0)?))
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
    fn item_at(self, alloc: &SlabAlloc, index: u64) -> Vec<u8> {
        self.0.get_fixed_bytes(alloc, index)
    }
    fn insert_at(self, alloc: &mut SlabAlloc, index: u64, item: Vec<u8>, version: u64) -> Result<Self> {
        let needed = width_for(item.len());
        let arr = if needed > self.0.width(alloc) {
            self.0.widen_fixed_bytes(alloc, needed, version)?
        } else {
            self.0
        };
        Ok(Self(arr.insert_fixed_bytes(alloc, index, &item, version)?))
    }
    fn delete_at(self, alloc: &mut SlabAlloc, index: u64, version: u64) -> Result<Self> {
        Ok(Self(self.0.delete_fixed_bytes(alloc, index, version)?))
    }
    fn set_at(self, alloc: &mut SlabAlloc, index: u64, item: Vec<u8>, version: u64) -> Result<Self> {
        let deleted = self.delete_at(alloc, index, version)?;
        deleted.insert_at(alloc, index, item, version)
    }
}

pub type ShortStringColumn = BTree<ShortStringLeaf>;

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn width_grows_as_strings_grow() {
        let mut alloc = SlabAlloc::open_buffer(Vec::new());
        let mut col = ShortStringColumn::create_empty(&mut alloc).expect("create");
        col = col.push(&mut alloc, b"a".to_vec(), 1).expect("push");
        assert_eq!(4, Array::new(col.root).width(&alloc));

        col = col.push(&mut alloc, b"abcdefgh".to_vec(), 1).expect("push");
        assert_eq!(16, Array::new(col.root).width(&alloc));

        assert_eq!(b"a".to_vec(), col.get(&alloc, 0));
        assert_eq!(b"abcdefgh".to_vec(), col.get(&alloc, 1));
    }

    #[test]
    fn empty_and_nonempty_strings_roundtrip() {
        let mut alloc = SlabAlloc::open_buffer(Vec::new());
        let mut col = ShortStringColumn::create_empty(&mut alloc).expect("create");
        for s in [&b""[..], b"x", b"hello world"] {
            col = col.push(&mut alloc, s.to_vec(), 1).expect("push");
        }
        assert_eq!(Vec::<u8>::new(), col.get(&alloc, 0));
        assert_eq!(b"x".to_vec(), col.get(&alloc, 1));
        assert_eq!(b"hello world".to_vec(), col.get(&alloc, 2));
    }
}
