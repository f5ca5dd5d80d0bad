// Copyright (c) 2024-present, coldb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The generic split-on-grow, no-merge B-tree skeleton shared by every
//! column flavor (§4.3). Concrete leaf layouts (plain integers, fixed-width
//! short strings, ...) plug in through the [`Leaf`] trait; this module only
//! ever touches `offsets`/`refs` pairs and leaf items, never a column's
//! element semantics.

use crate::alloc::SlabAlloc;
use crate::array::{descend_to_leaf, partition_point, Array};
use crate::error::Result;
use crate::refs::Ref;
use std::marker::PhantomData;

/// Default row-count above which a leaf splits into a two-child inner node.
/// Matches the reference implementation's fan-out for format compatibility.
/// An individual [`crate::alloc::SlabAlloc`] may use a different value via
/// [`crate::config::Config::fanout_override`]; see [`SlabAlloc::fanout`].
pub const FANOUT: u64 = 1000;

/// The per-leaf-kind operations the generic B-tree needs. All methods take
/// the owning allocator explicitly; implementors are thin `Array` wrappers.
pub trait Leaf: Copy {
    type Item;

    fn create_empty(alloc: &mut SlabAlloc) -> Result<Self>;
    fn from_ref(r: Ref) -> Self;
    fn ref_of(self) -> Ref;
    fn len(self, alloc: &SlabAlloc) -> u64;
    fn item_at(self, alloc: &SlabAlloc, index: u64) -> Self::Item;
    fn insert_at(self, alloc: &mut SlabAlloc, index: u64, item: Self::Item, version: u64) -> Result<Self>;
    fn delete_at(self, alloc: &mut SlabAlloc, index: u64, version: u64) -> Result<Self>;
    fn set_at(self, alloc: &mut SlabAlloc, index: u64, item: Self::Item, version: u64) -> Result<Self>;
    fn destroy(self, alloc: &mut SlabAlloc, version: u64) {
        Array::new(self.ref_of()).destroy(alloc, version);
    }
}

enum InsertResult {
    Done(Ref),
    Split(Ref, Ref),
}

/// A handle to a column B-tree: either a bare leaf or the ref of a
/// `has_refs` inner node whose two children are an offsets leaf and a refs
/// leaf (§3.1).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BTree<L> {
    pub root: Ref,
    _leaf: PhantomData<L>,
}

impl<L: Leaf> BTree<L> {
    pub fn create_empty(alloc: &mut SlabAlloc) -> Result<Self> {
        let leaf = L::create_empty(alloc)?;
        Ok(Self { root: leaf.ref_of(), _leaf: PhantomData })
    }

    #[must_use]
    pub fn from_root(root: Ref) -> Self {
        Self { root, _leaf: PhantomData }
    }

    #[must_use]
    pub fn len(self, alloc: &SlabAlloc) -> u64 {
        subtree_len(alloc, self.root, |r| L::from_ref(r).len(alloc))
    }

    #[must_use]
    pub fn get(self, alloc: &SlabAlloc, index: u64) -> L::Item {
        let (leaf_arr, local) = descend_to_leaf(alloc, Array::new(self.root), index);
        L::from_ref(leaf_arr.ref_).item_at(alloc, local)
    }

    pub fn insert(mut self, alloc: &mut SlabAlloc, index: u64, item: L::Item, version: u64) -> Result<Self> {
        match insert_rec::<L>(alloc, self.root, index, item, version)? {
            InsertResult::Done(new_root) => {
                self.root = new_root;
                Ok(self)
            }
            InsertResult::Split(left, right) => {
                let (left_ref, right_ref) = (left, right);
                let left_len = subtree_len(alloc, left_ref, |r| L::from_ref(r).len(alloc));
                let total_len = left_len + subtree_len(alloc, right_ref, |r| L::from_ref(r).len(alloc));

                let mut offsets = Array::create_empty(alloc, false)?;
                offsets = offsets.push(alloc, left_len as i64, version)?;
                offsets = offsets.push(alloc, total_len as i64, version)?;

                let mut refs = Array::create_empty(alloc, true)?;
                refs = refs.push(alloc, left_ref as i64, version)?;
                refs = refs.push(alloc, right_ref as i64, version)?;

                let inner = Array::create_inner_node(alloc, offsets, refs, version)?;
                self.root = inner.ref_;
                Ok(self)
            }
        }
    }

    pub fn push(self, alloc: &mut SlabAlloc, item: L::Item, version: u64) -> Result<Self> {
        let len = self.len(alloc);
        self.insert(alloc, len, item, version)
    }

    pub fn delete(mut self, alloc: &mut SlabAlloc, index: u64, version: u64) -> Result<Self> {
        self.root = delete_rec::<L>(alloc, self.root, index, version)?;
        self.collapse_if_needed(alloc)
    }

    /// Replaces the item at `index` in place (row count unchanged, so this
    /// never splits or collapses).
    pub fn set(mut self, alloc: &mut SlabAlloc, index: u64, item: L::Item, version: u64) -> Result<Self> {
        self.root = set_rec::<L>(alloc, self.root, index, item, version)?;
        Ok(self)
    }

    fn collapse_if_needed(mut self, alloc: &SlabAlloc) -> Result<Self> {
        let arr = Array::new(self.root);
        if arr.is_inner(alloc) {
            let refs = arr.refs_child(alloc);
            if refs.len(alloc) == 1 {
                self.root = refs.get(alloc, 0) as u64;
            }
        }
        Ok(self)
    }

    pub fn destroy(self, alloc: &mut SlabAlloc, version: u64) {
        Array::new(self.root).destroy(alloc, version);
    }
}

fn subtree_len<F: Fn(Ref) -> u64>(alloc: &SlabAlloc, node_ref: Ref, leaf_len: F) -> u64 {
    let arr = Array::new(node_ref);
    if arr.is_inner(alloc) {
        let offsets = arr.offsets_child(alloc);
        let n = offsets.len(alloc);
        if n == 0 {
            0
        } else {
            offsets.get(alloc, n - 1) as u64
        }
    } else {
        leaf_len(node_ref)
    }
}

fn insert_rec<L: Leaf>(
    alloc: &mut SlabAlloc,
    node_ref: Ref,
    index: u64,
    item: L::Item,
    version: u64,
) -> Result<InsertResult> {
    let arr = Array::new(node_ref);

    if !arr.is_inner(alloc) {
        let leaf = L::from_ref(node_ref);
        let len = leaf.len(alloc);

        if len < alloc.fanout() {
            let new_leaf = leaf.insert_at(alloc, index, item, version)?;
            return Ok(InsertResult::Done(new_leaf.ref_of()));
        }

        let mid = len / 2;
        let mut left = leaf;
        let mut right = L::create_empty(alloc)?;

        for i in mid..len {
            let moved = left.item_at(alloc, i);
            right = right.insert_at(alloc, i - mid, moved, version)?;
        }
        for i in (mid..len).rev() {
            left = left.delete_at(alloc, i, version)?;
        }

        if index <= mid {
            left = left.insert_at(alloc, index, item, version)?;
        } else {
            right = right.insert_at(alloc, index - mid, item, version)?;
        }

        return Ok(InsertResult::Split(left.ref_of(), right.ref_of()));
    }

    let offsets = arr.offsets_child(alloc);
    let refs = arr.refs_child(alloc);
    let n = offsets.len(alloc);

    let child_idx = partition_point(n, |k| (offsets.get(alloc, k) as u64) <= index);
    let prev_cum = if child_idx == 0 { 0 } else { offsets.get(alloc, child_idx - 1) as u64 };
    let local_index = index - prev_cum;
    let child_ref = refs.get(alloc, child_idx) as u64;

    match insert_rec::<L>(alloc, child_ref, local_index, item, version)? {
        InsertResult::Done(new_child) => {
            let mut new_refs = refs;
            if new_child != child_ref {
                new_refs = new_refs.set(alloc, child_idx, new_child as i64, version)?;
            }

            let mut new_offsets = offsets;
            for k in child_idx..n {
                let old = new_offsets.get(alloc, k);
                new_offsets = new_offsets.set(alloc, k, old + 1, version)?;
            }

            let mut new_node = arr;
            new_node = new_node.set_offsets_child(alloc, new_offsets, version)?;
            new_node = new_node.set_refs_child(alloc, new_refs, version)?;
            Ok(InsertResult::Done(new_node.ref_))
        }
        InsertResult::Split(left_child, right_child) => {
            let left_len = subtree_len(alloc, left_child, |r| L::from_ref(r).len(alloc));
            let right_len = subtree_len(alloc, right_child, |r| L::from_ref(r).len(alloc));

            let mut new_refs = refs.set(alloc, child_idx, left_child as i64, version)?;
            new_refs = new_refs.insert(alloc, child_idx + 1, right_child as i64, version)?;

            let left_cum = prev_cum + left_len;
            let mut new_offsets = offsets.set(alloc, child_idx, left_cum as i64, version)?;
            new_offsets = new_offsets.insert(alloc, child_idx + 1, (left_cum + right_len) as i64, version)?;

            let n_children = new_refs.len(alloc);

            if n_children <= alloc.fanout() {
                let mut new_node = arr;
                new_node = new_node.set_offsets_child(alloc, new_offsets, version)?;
                new_node = new_node.set_refs_child(alloc, new_refs, version)?;
                Ok(InsertResult::Done(new_node.ref_))
            } else {
                let (left_inner, right_inner) = split_inner(alloc, new_offsets, new_refs, version)?;
                Ok(InsertResult::Split(left_inner, right_inner))
            }
        }
    }
}

fn split_inner(alloc: &mut SlabAlloc, offsets: Array, refs: Array, version: u64) -> Result<(Ref, Ref)> {
    let n = refs.len(alloc);
    let mid = n / 2;

    let all_refs: Vec<i64> = (0..n).map(|i| refs.get(alloc, i)).collect();
    let all_offsets: Vec<i64> = (0..n).map(|i| offsets.get(alloc, i)).collect();

    let left_base = if mid == 0 { 0 } else { all_offsets[mid as usize - 1] };

    let left_offset_vals = &all_offsets[..mid as usize];
    let right_offset_vals: Vec<i64> = all_offsets[mid as usize..].iter().map(|&o| o - left_base).collect();

    let left_ref = build_inner(alloc, left_offset_vals, &all_refs[..mid as usize], version)?;
    let right_ref = build_inner(alloc, &right_offset_vals, &all_refs[mid as usize..], version)?;

    Ok((left_ref, right_ref))
}

fn build_inner(alloc: &mut SlabAlloc, offset_vals: &[i64], ref_vals: &[i64], version: u64) -> Result<Ref> {
    let mut offsets = Array::create_empty(alloc, false)?;
    for &v in offset_vals {
        offsets = offsets.push(alloc, v, version)?;
    }
    let mut refs = Array::create_empty(alloc, true)?;
    for &v in ref_vals {
        refs = refs.push(alloc, v, version)?;
    }
    Ok(Array::create_inner_node(alloc, offsets, refs, version)?.ref_)
}

fn set_rec<L: Leaf>(alloc: &mut SlabAlloc, node_ref: Ref, index: u64, item: L::Item, version: u64) -> Result<Ref> {
    let arr = Array::new(node_ref);

    if !arr.is_inner(alloc) {
        let leaf = L::from_ref(node_ref);
        return Ok(leaf.set_at(alloc, index, item, version)?.ref_of());
    }

    let offsets = arr.offsets_child(alloc);
    let refs = arr.refs_child(alloc);
    let n = offsets.len(alloc);

    let child_idx = partition_point(n, |k| (offsets.get(alloc, k) as u64) <= index);
    let prev_cum = if child_idx == 0 { 0 } else { offsets.get(alloc, child_idx - 1) as u64 };
    let local_index = index - prev_cum;
    let child_ref = refs.get(alloc, child_idx) as u64;

    let new_child = set_rec::<L>(alloc, child_ref, local_index, item, version)?;

    if new_child == child_ref {
        return Ok(arr.ref_);
    }

    let new_refs = refs.set(alloc, child_idx, new_child as i64, version)?;
    let new_node = arr.set_refs_child(alloc, new_refs, version)?;
    Ok(new_node.ref_)
}

fn delete_rec<L: Leaf>(alloc: &mut SlabAlloc, node_ref: Ref, index: u64, version: u64) -> Result<Ref> {
    let arr = Array::new(node_ref);

    if !arr.is_inner(alloc) {
        let leaf = L::from_ref(node_ref);
        return Ok(leaf.delete_at(alloc, index, version)?.ref_of());
    }

    let offsets = arr.offsets_child(alloc);
    let refs = arr.refs_child(alloc);
    let n = offsets.len(alloc);

    let child_idx = partition_point(n, |k| (offsets.get(alloc, k) as u64) <= index);
    let prev_cum = if child_idx == 0 { 0 } else { offsets.get(alloc, child_idx - 1) as u64 };
    let local_index = index - prev_cum;
    let child_ref = refs.get(alloc, child_idx) as u64;

    let new_child = delete_rec::<L>(alloc, child_ref, local_index, version)?;

    let mut new_refs = refs;
    if new_child != child_ref {
        new_refs = new_refs.set(alloc, child_idx, new_child as i64, version)?;
    }

    let mut new_offsets = offsets;
    for k in child_idx..n {
        let old = new_offsets.get(alloc, k);
        new_offsets = new_offsets.set(alloc, k, old - 1, version)?;
    }

    let mut new_node = arr;
    new_node = new_node.set_offsets_child(alloc, new_offsets, version)?;
    new_node = new_node.set_refs_child(alloc, new_refs, version)?;
    Ok(new_node.ref_)
}
