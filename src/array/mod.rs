// Copyright (c) 2024-present, coldb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The universal persistent bit-packed node (§4.2): every piece of data in
//! a [`crate::Group`] — integers, short/long strings, binary blobs, and
//! the B-tree inner nodes that tie them together — is an `Array`.
//!
//! An `Array` never owns its bytes. It is a thin, `Copy` handle around a
//! [`Ref`]; every accessor takes the owning [`SlabAlloc`] explicitly, and
//! every mutator takes it mutably and returns the (possibly new, if
//! copy-on-write or a reallocation fired) `Array` the caller must store
//! back into its parent. See `DESIGN.md` for why this avoids the parent
//! back-pointers the original C++ implementation used.

pub mod bits;
pub mod header;
pub mod search;
pub mod sort;

pub use header::{Header, WidthType};

use crate::alloc::SlabAlloc;
use crate::error::Result;
use crate::refs::{Ref, Slot};
use header::HEADER_SIZE;

/// A handle to a bit-packed node living somewhere in a [`SlabAlloc`]'s
/// address space.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Array {
    pub ref_: Ref,
}

impl Array {
    #[must_use]
    pub const fn new(ref_: Ref) -> Self {
        Self { ref_ }
    }

    #[must_use]
    pub fn header(self, alloc: &SlabAlloc) -> Header {
        Header::decode(alloc.read(self.ref_, HEADER_SIZE))
    }

    fn write_header(self, alloc: &mut SlabAlloc, header: Header) {
        alloc
            .write_mut(self.ref_, HEADER_SIZE)
            .copy_from_slice(&header.encode());
    }

    #[must_use]
    pub fn len(self, alloc: &SlabAlloc) -> u64 {
        u64::from(self.header(alloc).len)
    }

    #[must_use]
    pub fn is_empty(self, alloc: &SlabAlloc) -> bool {
        self.len(alloc) == 0
    }

    #[must_use]
    pub fn is_inner(self, alloc: &SlabAlloc) -> bool {
        self.header(alloc).is_inner
    }

    #[must_use]
    pub fn has_refs(self, alloc: &SlabAlloc) -> bool {
        self.header(alloc).has_refs
    }

    #[must_use]
    pub fn width(self, alloc: &SlabAlloc) -> u8 {
        self.header(alloc).width
    }

    fn payload_byte_len(header: Header) -> u32 {
        match header.width_type {
            WidthType::Bits => bits::byte_len(header.len, header.width),
            WidthType::Multiply => header.len * u32::from(header.width),
            WidthType::Ignore => header.len,
        }
    }

    #[must_use]
    pub fn byte_size(self, alloc: &SlabAlloc) -> u64 {
        HEADER_SIZE as u64 + u64::from(Self::payload_byte_len(self.header(alloc)))
    }

    fn payload(self, alloc: &SlabAlloc) -> &[u8] {
        let plen = Self::payload_byte_len(self.header(alloc)) as usize;
        &alloc.read(self.ref_, HEADER_SIZE + plen)[HEADER_SIZE..]
    }

    fn payload_mut(self, alloc: &mut SlabAlloc, plen: usize) -> &mut [u8] {
        &mut alloc.write_mut(self.ref_, HEADER_SIZE + plen)[HEADER_SIZE..]
    }

    // ---------------------------------------------------------------
    // Creation
    // ---------------------------------------------------------------

    fn create(alloc: &mut SlabAlloc, header: Header) -> Result<Self> {
        let ref_ = alloc.alloc(u64::from(header.capacity))?;
        let arr = Self { ref_ };
        arr.write_header(alloc, header);
        Ok(arr)
    }

    /// Creates an empty leaf of bit-packed integers (used for int/bool/date
    /// columns and for the offsets/refs children of an inner node).
    pub fn create_empty(alloc: &mut SlabAlloc, has_refs: bool) -> Result<Self> {
        Self::create(
            alloc,
            Header {
                is_inner: false,
                has_refs,
                width_type: WidthType::Bits,
                width: 0,
                len: 0,
                capacity: HEADER_SIZE as u32,
            },
        )
    }

    /// Creates an empty fixed-width byte array (short-string leaf layout).
    /// `width` must be one of `{0,4,8,16,32,64}`.
    pub fn create_fixed_bytes(alloc: &mut SlabAlloc, width: u8) -> Result<Self> {
        Self::create(
            alloc,
            Header {
                is_inner: false,
                has_refs: false,
                width_type: WidthType::Multiply,
                width,
                len: 0,
                capacity: HEADER_SIZE as u32,
            },
        )
    }

    /// Creates an empty blob (opaque byte) leaf.
    pub fn create_blob(alloc: &mut SlabAlloc) -> Result<Self> {
        Self::create(
            alloc,
            Header {
                is_inner: false,
                has_refs: false,
                width_type: WidthType::Ignore,
                width: 0,
                len: 0,
                capacity: HEADER_SIZE as u32,
            },
        )
    }

    /// Creates an inner B-tree node from an offsets leaf and a refs leaf.
    pub fn create_inner_node(
        alloc: &mut SlabAlloc,
        offsets: Self,
        refs: Self,
        version: u64,
    ) -> Result<Self> {
        let node = Self::create(
            alloc,
            Header {
                is_inner: true,
                has_refs: true,
                width_type: WidthType::Bits,
                width: 0,
                len: 0,
                capacity: HEADER_SIZE as u32,
            },
        )?;
        let node = node.push(alloc, offsets.ref_ as i64, version)?;
        node.push(alloc, refs.ref_ as i64, version)
    }

    #[must_use]
    pub fn offsets_child(self, alloc: &SlabAlloc) -> Self {
        debug_assert!(self.is_inner(alloc));
        Self::new(self.get(alloc, 0) as u64)
    }

    #[must_use]
    pub fn refs_child(self, alloc: &SlabAlloc) -> Self {
        debug_assert!(self.is_inner(alloc));
        Self::new(self.get(alloc, 1) as u64)
    }

    pub fn set_offsets_child(self, alloc: &mut SlabAlloc, child: Self, version: u64) -> Result<Self> {
        self.set(alloc, 0, child.ref_ as i64, version)
    }

    pub fn set_refs_child(self, alloc: &mut SlabAlloc, child: Self, version: u64) -> Result<Self> {
        self.set(alloc, 1, child.ref_ as i64, version)
    }

    // ---------------------------------------------------------------
    // Copy-on-write and width expansion
    // ---------------------------------------------------------------

    /// Ensures this array is in writable scratch space, copying it there
    /// first if it still lives in the read-only mapped image.
    pub fn ensure_writable(self, alloc: &mut SlabAlloc, version: u64) -> Result<Self> {
        if alloc.is_readonly(self.ref_) {
            self.copy_on_write(alloc, version)
        } else {
            Ok(self)
        }
    }

    fn copy_on_write(self, alloc: &mut SlabAlloc, version: u64) -> Result<Self> {
        let header = self.header(alloc);
        let total = HEADER_SIZE as u64 + u64::from(Self::payload_byte_len(header));
        let new_cap = crate::file::round_up_to_alignment(total) + 64;

        let old_bytes = alloc.read(self.ref_, total as usize).to_vec();
        let new_ref = alloc.alloc(new_cap)?;
        alloc.write_mut(new_ref, old_bytes.len()).copy_from_slice(&old_bytes);

        alloc.free(self.ref_, u64::from(header.capacity), version);

        let mut new_header = header;
        new_header.capacity = new_cap as u32;
        let new_arr = Self { ref_: new_ref };
        new_arr.write_header(alloc, new_header);

        Ok(new_arr)
    }

    fn widen(self, alloc: &mut SlabAlloc, new_width: u8, version: u64) -> Result<Self> {
        let arr = self.ensure_writable(alloc, version)?;
        let header = arr.header(alloc);
        debug_assert_eq!(header.width_type, WidthType::Bits);

        let values: Vec<i64> = (0..u64::from(header.len)).map(|i| arr.get(alloc, i)).collect();
        let new_plen = bits::byte_len(header.len, new_width);
        let needed_total = HEADER_SIZE as u32 + new_plen;

        let (ref_, capacity) = if needed_total <= header.capacity {
            (arr.ref_, header.capacity)
        } else {
            let new_cap =
                (crate::file::round_up_to_alignment(u64::from(needed_total)) + 64) as u32;
            let new_ref = alloc.alloc(u64::from(new_cap))?;
            alloc.free(arr.ref_, u64::from(header.capacity), version);
            (new_ref, new_cap)
        };

        let target = Self { ref_ };
        let new_header = Header {
            width: new_width,
            capacity,
            ..header
        };
        target.write_header(alloc, new_header);

        let payload = target.payload_mut(alloc, new_plen as usize);
        payload.fill(0);
        for (i, &v) in values.iter().enumerate() {
            bits::set(payload, new_width, i as u64, v);
        }

        Ok(target)
    }

    // ---------------------------------------------------------------
    // Integer / ref element access (width-type Bits)
    // ---------------------------------------------------------------

    #[must_use]
    pub fn get(self, alloc: &SlabAlloc, index: u64) -> i64 {
        let header = self.header(alloc);
        debug_assert!(index < u64::from(header.len), "index out of bounds");
        bits::get(self.payload(alloc), header.width, index)
    }

    /// Reads element `index` as a has-refs slot.
    #[must_use]
    pub fn get_slot(self, alloc: &SlabAlloc, index: u64) -> Slot {
        debug_assert!(self.has_refs(alloc));
        Slot::from_raw(self.get(alloc, index))
    }

    pub fn set(self, alloc: &mut SlabAlloc, index: u64, value: i64, version: u64) -> Result<Self> {
        let mut arr = self.ensure_writable(alloc, version)?;
        let header = arr.header(alloc);
        debug_assert!(index < u64::from(header.len), "index out of bounds");

        if !bits::fits(value, header.width) {
            arr = arr.widen(alloc, bits::minimal_width(value), version)?;
        }

        let header = arr.header(alloc);
        let plen = Self::payload_byte_len(header) as usize;
        bits::set(arr.payload_mut(alloc, plen), header.width, index, value);
        Ok(arr)
    }

    fn rebuild_ints(
        alloc: &mut SlabAlloc,
        version: u64,
        old: Self,
        values: &[i64],
        has_refs: bool,
        is_inner: bool,
    ) -> Result<Self> {
        let width = values.iter().map(|&v| bits::minimal_width(v)).max().unwrap_or(0);
        let len = values.len() as u32;
        let plen = bits::byte_len(len, width);
        let needed_total = HEADER_SIZE as u32 + plen;
        let header_old = old.header(alloc);

        let (ref_, capacity) = if needed_total <= header_old.capacity {
            (old.ref_, header_old.capacity)
        } else {
            let new_cap =
                (crate::file::round_up_to_alignment(u64::from(needed_total)) + 64) as u32;
            let new_ref = alloc.alloc(u64::from(new_cap))?;
            alloc.free(old.ref_, u64::from(header_old.capacity), version);
            (new_ref, new_cap)
        };

        let arr = Self { ref_ };
        let header = Header {
            is_inner,
            has_refs,
            width_type: WidthType::Bits,
            width,
            len,
            capacity,
        };
        arr.write_header(alloc, header);

        let payload = arr.payload_mut(alloc, plen as usize);
        payload.fill(0);
        for (i, &v) in values.iter().enumerate() {
            bits::set(payload, width, i as u64, v);
        }

        Ok(arr)
    }

    pub fn insert(self, alloc: &mut SlabAlloc, index: u64, value: i64, version: u64) -> Result<Self> {
        let arr = self.ensure_writable(alloc, version)?;
        let header = arr.header(alloc);
        debug_assert!(index <= u64::from(header.len));

        let mut values: Vec<i64> = (0..u64::from(header.len)).map(|i| arr.get(alloc, i)).collect();
        values.insert(index as usize, value);

        Self::rebuild_ints(alloc, version, arr, &values, header.has_refs, header.is_inner)
    }

    pub fn push(self, alloc: &mut SlabAlloc, value: i64, version: u64) -> Result<Self> {
        let len = self.len(alloc);
        self.insert(alloc, len, value, version)
    }

    pub fn delete(self, alloc: &mut SlabAlloc, index: u64, version: u64) -> Result<Self> {
        let arr = self.ensure_writable(alloc, version)?;
        let header = arr.header(alloc);
        debug_assert!(index < u64::from(header.len));

        let mut values: Vec<i64> = (0..u64::from(header.len)).map(|i| arr.get(alloc, i)).collect();
        values.remove(index as usize);

        Self::rebuild_ints(alloc, version, arr, &values, header.has_refs, header.is_inner)
    }

    pub fn clear(self, alloc: &mut SlabAlloc, version: u64) -> Result<Self> {
        Self::rebuild_ints(alloc, version, self.ensure_writable(alloc, version)?, &[], self.has_refs(alloc), self.is_inner(alloc))
    }

    // ---------------------------------------------------------------
    // Search / aggregation (integer leaves only)
    // ---------------------------------------------------------------

    #[must_use]
    pub fn find_first(self, alloc: &SlabAlloc, v: i64, start: u64, end: u64) -> Option<u64> {
        let header = self.header(alloc);
        search::find_first(self.payload(alloc), header.width, v, start, end)
    }

    #[must_use]
    pub fn sum(self, alloc: &SlabAlloc, start: u64, end: u64) -> i64 {
        let header = self.header(alloc);
        search::sum(self.payload(alloc), header.width, start, end)
    }

    #[must_use]
    pub fn minimum(self, alloc: &SlabAlloc, start: u64, end: u64) -> Option<(u64, i64)> {
        let header = self.header(alloc);
        search::minimum(self.payload(alloc), header.width, start, end)
    }

    #[must_use]
    pub fn maximum(self, alloc: &SlabAlloc, start: u64, end: u64) -> Option<(u64, i64)> {
        let header = self.header(alloc);
        search::maximum(self.payload(alloc), header.width, start, end)
    }

    pub fn sort(self, alloc: &mut SlabAlloc, version: u64) -> Result<Self> {
        let arr = self.ensure_writable(alloc, version)?;
        let len = arr.len(alloc);
        let mut values: Vec<i64> = (0..len).map(|i| arr.get(alloc, i)).collect();
        sort::sort(&mut values);
        Self::rebuild_ints(alloc, version, arr, &values, arr.has_refs(alloc), arr.is_inner(alloc))
    }

    /// Returns the permutation of row indices that sorts this array,
    /// without mutating it (§4.2 `ReferenceSort`).
    #[must_use]
    pub fn reference_sort(self, alloc: &SlabAlloc) -> Vec<u64> {
        let len = self.len(alloc);
        let values: Vec<i64> = (0..len).map(|i| self.get(alloc, i)).collect();
        sort::reference_sort(&values)
    }

    // ---------------------------------------------------------------
    // Fixed-width byte strings (short-string leaf layout)
    // ---------------------------------------------------------------

    #[must_use]
    pub fn get_fixed_bytes(self, alloc: &SlabAlloc, index: u64) -> Vec<u8> {
        let header = self.header(alloc);
        debug_assert_eq!(header.width_type, WidthType::Multiply);
        if header.width == 0 {
            return Vec::new();
        }
        let w = header.width as usize;
        let payload = self.payload(alloc);
        let start = index as usize * w;
        let slot = &payload[start..start + w];
        let pad = *slot.last().expect("width > 0") as usize;
        let real_len = (w - 1).saturating_sub(pad);
        slot[..real_len].to_vec()
    }

    fn encode_fixed_slot(width: u8, bytes: &[u8]) -> Vec<u8> {
        let w = width as usize;
        let mut slot = vec![0_u8; w];
        if w > 0 {
            debug_assert!(bytes.len() <= w - 1, "value does not fit current width");
            slot[..bytes.len()].copy_from_slice(bytes);
            slot[w - 1] = (w - 1 - bytes.len()) as u8;
        } else {
            debug_assert!(bytes.is_empty());
        }
        slot
    }

    fn rebuild_fixed_bytes(
        alloc: &mut SlabAlloc,
        version: u64,
        old: Self,
        width: u8,
        slots: &[Vec<u8>],
    ) -> Result<Self> {
        let len = slots.len() as u32;
        let plen = len * u32::from(width);
        let needed_total = HEADER_SIZE as u32 + plen;
        let header_old = old.header(alloc);

        let (ref_, capacity) = if needed_total <= header_old.capacity {
            (old.ref_, header_old.capacity)
        } else {
            let new_cap =
                (crate::file::round_up_to_alignment(u64::from(needed_total)) + 64) as u32;
            let new_ref = alloc.alloc(u64::from(new_cap))?;
            alloc.free(old.ref_, u64::from(header_old.capacity), version);
            (new_ref, new_cap)
        };

        let arr = Self { ref_ };
        let header = Header {
            is_inner: false,
            has_refs: false,
            width_type: WidthType::Multiply,
            width,
            len,
            capacity,
        };
        arr.write_header(alloc, header);

        let payload = arr.payload_mut(alloc, plen as usize);
        let w = width as usize;
        for (i, slot) in slots.iter().enumerate() {
            payload[i * w..(i + 1) * w].copy_from_slice(slot);
        }

        Ok(arr)
    }

    pub fn insert_fixed_bytes(
        self,
        alloc: &mut SlabAlloc,
        index: u64,
        bytes: &[u8],
        version: u64,
    ) -> Result<Self> {
        let arr = self.ensure_writable(alloc, version)?;
        let header = arr.header(alloc);
        debug_assert!(index <= u64::from(header.len));

        let mut slots: Vec<Vec<u8>> = (0..u64::from(header.len))
            .map(|i| {
                let w = header.width as usize;
                let payload = arr.payload(alloc);
                payload[i as usize * w..(i as usize + 1) * w].to_vec()
            })
            .collect();
        slots.insert(index as usize, Self::encode_fixed_slot(header.width, bytes));

        Self::rebuild_fixed_bytes(alloc, version, arr, header.width, &slots)
    }

    pub fn delete_fixed_bytes(self, alloc: &mut SlabAlloc, index: u64, version: u64) -> Result<Self> {
        let arr = self.ensure_writable(alloc, version)?;
        let header = arr.header(alloc);
        debug_assert!(index < u64::from(header.len));

        let w = header.width as usize;
        let mut slots: Vec<Vec<u8>> = (0..u64::from(header.len))
            .map(|i| {
                let payload = arr.payload(alloc);
                payload[i as usize * w..(i as usize + 1) * w].to_vec()
            })
            .collect();
        slots.remove(index as usize);

        Self::rebuild_fixed_bytes(alloc, version, arr, header.width, &slots)
    }

    /// Rewrites every slot at a new (larger) width. Used when a short
    /// string column grows past its current slot width.
    pub fn widen_fixed_bytes(self, alloc: &mut SlabAlloc, new_width: u8, version: u64) -> Result<Self> {
        let arr = self.ensure_writable(alloc, version)?;
        let header = arr.header(alloc);
        debug_assert_eq!(header.width_type, WidthType::Multiply);

        let values: Vec<Vec<u8>> = (0..u64::from(header.len))
            .map(|i| arr.get_fixed_bytes(alloc, i))
            .collect();
        let slots: Vec<Vec<u8>> = values
            .iter()
            .map(|b| Self::encode_fixed_slot(new_width, b))
            .collect();

        Self::rebuild_fixed_bytes(alloc, version, arr, new_width, &slots)
    }

    // ---------------------------------------------------------------
    // Opaque blob payload (long-string/binary leaf layout)
    // ---------------------------------------------------------------

    #[must_use]
    pub fn blob_bytes(self, alloc: &SlabAlloc) -> &[u8] {
        debug_assert_eq!(self.header(alloc).width_type, WidthType::Ignore);
        self.payload(alloc)
    }

    pub fn append_blob(self, alloc: &mut SlabAlloc, bytes: &[u8], version: u64) -> Result<Self> {
        let arr = self.ensure_writable(alloc, version)?;
        let header = arr.header(alloc);
        debug_assert_eq!(header.width_type, WidthType::Ignore);

        let new_len = header.len + bytes.len() as u32;
        let needed_total = HEADER_SIZE as u32 + new_len;

        let (ref_, capacity) = if needed_total <= header.capacity {
            (arr.ref_, header.capacity)
        } else {
            let new_cap =
                (crate::file::round_up_to_alignment(u64::from(needed_total)) + 64) as u32;
            let new_ref = alloc.alloc(u64::from(new_cap))?;
            let old_bytes = arr.payload(alloc).to_vec();
            alloc
                .write_mut(new_ref, HEADER_SIZE + old_bytes.len())
                [HEADER_SIZE..]
                .copy_from_slice(&old_bytes);
            alloc.free(arr.ref_, u64::from(header.capacity), version);
            (new_ref, new_cap)
        };

        let target = Self { ref_ };
        let new_header = Header {
            len: new_len,
            capacity,
            ..header
        };
        target.write_header(alloc, new_header);

        let payload = target.payload_mut(alloc, new_len as usize);
        payload[header.len as usize..].copy_from_slice(bytes);
        Ok(target)
    }

    /// Truncates the blob to `new_len` bytes (used when a mixed-column
    /// write discovers the old value was the tail of the shared blob).
    pub fn truncate_blob(self, alloc: &mut SlabAlloc, new_len: u64, version: u64) -> Result<Self> {
        let arr = self.ensure_writable(alloc, version)?;
        let mut header = arr.header(alloc);
        debug_assert!(new_len <= u64::from(header.len));
        header.len = new_len as u32;
        arr.write_header(alloc, header);
        Ok(arr)
    }

    // ---------------------------------------------------------------
    // Destruction and structural equality
    // ---------------------------------------------------------------

    /// Recursively destroys this array: for a has-refs array, every
    /// element interpreted as a [`Slot::Ref`] is destroyed first. Inlined
    /// scalars and empty slots are left alone.
    pub fn destroy(self, alloc: &mut SlabAlloc, version: u64) {
        if self.ref_ == 0 {
            return;
        }
        let header = self.header(alloc);
        if header.has_refs {
            for i in 0..u64::from(header.len) {
                if let Slot::Ref(r) = self.get_slot(alloc, i) {
                    if r != 0 {
                        Self::new(r).destroy(alloc, version);
                    }
                }
            }
        }
        alloc.free(self.ref_, u64::from(header.capacity), version);
    }

    /// Deep-compares two arrays (possibly in different allocators), used
    /// by the round-trip test property (§8) and `Group`'s `PartialEq`.
    #[must_use]
    pub fn structural_eq(self, alloc: &SlabAlloc, other: Self, other_alloc: &SlabAlloc) -> bool {
        if self.ref_ == 0 || other.ref_ == 0 {
            return self.ref_ == other.ref_;
        }

        let h1 = self.header(alloc);
        let h2 = other.header(other_alloc);

        if h1.is_inner != h2.is_inner
            || h1.has_refs != h2.has_refs
            || h1.width_type != h2.width_type
            || h1.len != h2.len
        {
            return false;
        }

        match h1.width_type {
            WidthType::Ignore => self.blob_bytes(alloc) == other.blob_bytes(other_alloc),
            WidthType::Multiply => (0..u64::from(h1.len))
                .all(|i| self.get_fixed_bytes(alloc, i) == other.get_fixed_bytes(other_alloc, i)),
            WidthType::Bits => {
                if h1.has_refs {
                    (0..u64::from(h1.len)).all(|i| match (self.get_slot(alloc, i), other.get_slot(other_alloc, i)) {
                        (Slot::Empty, Slot::Empty) => true,
                        (Slot::Inline(a), Slot::Inline(b)) => a == b,
                        (Slot::Ref(a), Slot::Ref(b)) => {
                            Self::new(a).structural_eq(alloc, Self::new(b), other_alloc)
                        }
                        _ => false,
                    })
                } else {
                    (0..u64::from(h1.len)).all(|i| self.get(alloc, i) == other.get(other_alloc, i))
                }
            }
        }
    }
}

/// Binary search helper for the B-tree direct-traversal hot path (§4.2):
/// returns the least index `i` in `0..len` such that `pred(i)` is false,
/// assuming `pred` is monotonically true-then-false.
#[must_use]
pub fn partition_point<F: Fn(u64) -> bool>(len: u64, pred: F) -> u64 {
    let mut left = 0;
    let mut right = len;
    while left < right {
        let mid = left + (right - left) / 2;
        if pred(mid) {
            left = mid + 1;
        } else {
            right = mid;
        }
    }
    left
}

/// Walks an inner-node chain from `root` down to the leaf that logically
/// contains `index`, without instantiating anything beyond the `Array`
/// handles themselves (§4.2 direct traversal helpers). Returns the leaf
/// and the index local to it.
#[must_use]
pub fn descend_to_leaf(alloc: &SlabAlloc, root: Array, mut index: u64) -> (Array, u64) {
    let mut node = root;
    loop {
        let header = node.header(alloc);
        if !header.is_inner {
            return (node, index);
        }

        let offsets = node.offsets_child(alloc);
        let refs = node.refs_child(alloc);
        let n = offsets.len(alloc);

        let child_idx = partition_point(n, |k| (offsets.get(alloc, k) as u64) <= index);
        let prev_cum = if child_idx == 0 {
            0
        } else {
            offsets.get(alloc, child_idx - 1) as u64
        };

        index -= prev_cum;
        node = Array::new(refs.get(alloc, child_idx) as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn int_array_width_expansion() {
        let mut alloc = SlabAlloc::open_buffer(Vec::new());
        let arr = Array::create_empty(&mut alloc, false).expect("create");
        let arr = arr.push(&mut alloc, 0, 1).expect("push");
        let arr = arr.push(&mut alloc, 1, 1).expect("push");
        assert_eq!(1, arr.width(&alloc));

        let arr = arr.set(&mut alloc, 1, 200, 1).expect("set");
        assert_eq!(16, arr.width(&alloc));
        assert_eq!(0, arr.get(&alloc, 0));
        assert_eq!(200, arr.get(&alloc, 1));
    }

    #[test]
    fn insert_and_delete_preserve_order() {
        let mut alloc = SlabAlloc::open_buffer(Vec::new());
        let mut arr = Array::create_empty(&mut alloc, false).expect("create");
        for v in [10_i64, 20, 30, 40] {
            arr = arr.push(&mut alloc, v, 1).expect("push");
        }
        arr = arr.insert(&mut alloc, 2, 25, 1).expect("insert");
        let values: Vec<i64> = (0..arr.len(&alloc)).map(|i| arr.get(&alloc, i)).collect();
        assert_eq!(vec![10, 20, 25, 30, 40], values);

        arr = arr.delete(&mut alloc, 0, 1).expect("delete");
        let values: Vec<i64> = (0..arr.len(&alloc)).map(|i| arr.get(&alloc, i)).collect();
        assert_eq!(vec![20, 25, 30, 40], values);
    }

    #[test]
    fn copy_on_write_yields_new_ref_and_preserves_other_indices() {
        let mut alloc = SlabAlloc::open_buffer(Vec::new());
        let mut arr = Array::create_empty(&mut alloc, false).expect("create");
        for v in [1_i64, 2, 3] {
            arr = arr.push(&mut alloc, v, 1).expect("push");
        }

        // Simulate the array having been committed (now read-only) by
        // lowering the allocator's baseline past it.
        let bytes_len = arr.byte_size(&alloc);
        let mut buf = alloc.read(0, bytes_len as usize).to_vec();
        buf.resize(crate::file::round_up_to_alignment(buf.len() as u64) as usize, 0);
        let mut readonly_alloc = SlabAlloc::open_buffer(buf);
        let readonly_arr = Array::new(0);

        let writable = readonly_arr.set(&mut readonly_alloc, 0, 1, 2).expect("set");
        assert_ne!(readonly_arr.ref_, writable.ref_);
        assert_eq!(1, writable.get(&readonly_alloc, 0));
        assert_eq!(2, writable.get(&readonly_alloc, 1));
        assert_eq!(3, writable.get(&readonly_alloc, 2));
    }

    #[test]
    fn fixed_bytes_roundtrip() {
        let mut alloc = SlabAlloc::open_buffer(Vec::new());
        let mut arr = Array::create_fixed_bytes(&mut alloc, 8).expect("create");
        arr = arr.insert_fixed_bytes(&mut alloc, 0, b"abc", 1).expect("insert");
        arr = arr.insert_fixed_bytes(&mut alloc, 1, b"", 1).expect("insert");
        arr = arr.insert_fixed_bytes(&mut alloc, 2, b"xy", 1).expect("insert");

        assert_eq!(b"abc".to_vec(), arr.get_fixed_bytes(&alloc, 0));
        assert_eq!(Vec::<u8>::new(), arr.get_fixed_bytes(&alloc, 1));
        assert_eq!(b"xy".to_vec(), arr.get_fixed_bytes(&alloc, 2));
    }

    #[test]
    fn blob_append_and_truncate() {
        let mut alloc = SlabAlloc::open_buffer(Vec::new());
        let mut arr = Array::create_blob(&mut alloc).expect("create");
        arr = arr.append_blob(&mut alloc, b"hello", 1).expect("append");
        arr = arr.append_blob(&mut alloc, b" world", 1).expect("append");
        assert_eq!(b"hello world", arr.blob_bytes(&alloc));

        arr = arr.truncate_blob(&mut alloc, 5, 1).expect("truncate");
        assert_eq!(b"hello", arr.blob_bytes(&alloc));
    }

    #[test]
    fn descend_through_inner_node() {
        let mut alloc = SlabAlloc::open_buffer(Vec::new());

        let mut left = Array::create_empty(&mut alloc, false).expect("create");
        for v in 0..3 {
            left = left.push(&mut alloc, v, 1).expect("push");
        }
        let mut right = Array::create_empty(&mut alloc, false).expect("create");
        for v in 3..5 {
            right = right.push(&mut alloc, v, 1).expect("push");
        }

        let mut offsets = Array::create_empty(&mut alloc, false).expect("create");
        offsets = offsets.push(&mut alloc, 3, 1).expect("push");
        offsets = offsets.push(&mut alloc, 5, 1).expect("push");

        let mut refs = Array::create_empty(&mut alloc, true).expect("create");
        refs = refs.push(&mut alloc, left.ref_ as i64, 1).expect("push");
        refs = refs.push(&mut alloc, right.ref_ as i64, 1).expect("push");

        let root = Array::create_inner_node(&mut alloc, offsets, refs, 1).expect("inner");

        for i in 0..5 {
            let (leaf, local) = descend_to_leaf(&alloc, root, i);
            assert_eq!(i as i64, leaf.get(&alloc, local));
        }
    }
}
