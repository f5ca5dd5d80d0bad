// Copyright (c) 2024-present, coldb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Mixed-column cell discipline (§4.4): a parallel types-column and
//! refs-column, plus a lazily-created shared blob for string/binary
//! payloads.
//!
//! The spec describes the refs-column's string/binary slot as "the
//! offset into the blob", but doesn't nail down how the matching length
//! travels with it. We pack both into the one available inlined `i64`:
//! the low 24 bits are the byte length, the rest is the start offset —
//! enough headroom for any cell size this engine would plausibly see.
//! See `DESIGN.md` for the open-question note.

use crate::alloc::SlabAlloc;
use crate::array::Array;
use crate::column::int::{IntColumn, RefColumn};
use crate::error::Result;
use crate::refs::{Ref, Slot, NULL_REF};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MixedType {
    Int,
    Bool,
    Date,
    String,
    Binary,
    Subtable,
}

impl MixedType {
    const fn to_i64(self) -> i64 {
        match self {
            Self::Int => 0,
            Self::Bool => 1,
            Self::Date => 2,
            Self::String => 3,
            Self::Binary => 4,
            Self::Subtable => 5,
        }
    }

    fn from_i64(v: i64) -> Self {
        match v {
            0 => Self::Int,
            1 => Self::Bool,
            2 => Self::Date,
            3 => Self::String,
            4 => Self::Binary,
            5 => Self::Subtable,
            other => panic!("invalid mixed type tag {other}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MixedValue {
    Int(i64),
    Bool(bool),
    Date(i64),
    String(Vec<u8>),
    Binary(Vec<u8>),
    Subtable(Ref),
}

const BLOB_LEN_BITS: i64 = 24;
const BLOB_LEN_MASK: i64 = (1 << BLOB_LEN_BITS) - 1;

fn encode_blob_slot(start: u64, len: u64) -> i64 {
    debug_assert!(len <= BLOB_LEN_MASK as u64, "mixed cell too large for the blob slot encoding");
    ((start as i64) << BLOB_LEN_BITS) | (len as i64)
}

fn decode_blob_slot(v: i64) -> (u64, u64) {
    let len = (v & BLOB_LEN_MASK) as u64;
    let start = (v >> BLOB_LEN_BITS) as u64;
    (start, len)
}

#[derive(Copy, Clone, Debug)]
pub struct MixedColumn {
    pub types: IntColumn,
    pub refs: RefColumn,
    pub blob: Option<Array>,
}

impl MixedColumn {
    pub fn create_empty(alloc: &mut SlabAlloc) -> Result<Self> {
        Ok(Self {
            types: IntColumn::create_empty(alloc)?,
            refs: RefColumn::create_empty(alloc)?,
            blob: None,
        })
    }

    #[must_use]
    pub fn len(self, alloc: &SlabAlloc) -> u64 {
        self.types.len(alloc)
    }

    #[must_use]
    pub fn get(self, alloc: &SlabAlloc, index: u64) -> MixedValue {
        let tag = MixedType::from_i64(self.types.get(alloc, index));
        let slot = Slot::from_raw(self.refs.get(alloc, index));

        match (tag, slot) {
            (MixedType::Int, Slot::Inline(v)) => MixedValue::Int(v),
            (MixedType::Bool, Slot::Inline(v)) => MixedValue::Bool(v != 0),
            (MixedType::Date, Slot::Inline(v)) => MixedValue::Date(v),
            (MixedType::String, Slot::Inline(v)) => MixedValue::String(self.blob_slice(alloc, v)),
            (MixedType::Binary, Slot::Inline(v)) => MixedValue::Binary(self.blob_slice(alloc, v)),
            (MixedType::Subtable, Slot::Ref(r)) => MixedValue::Subtable(r),
            (MixedType::Subtable, Slot::Empty) => MixedValue::Subtable(NULL_REF),
            _ => panic!("mixed column type tag and refs-column slot disagree"),
        }
    }

    fn blob_slice(&self, alloc: &SlabAlloc, encoded: i64) -> Vec<u8> {
        let (start, len) = decode_blob_slot(encoded);
        self.blob
            .map(|b| b.blob_bytes(alloc)[start as usize..(start + len) as usize].to_vec())
            .unwrap_or_default()
    }

    pub fn insert(mut self, alloc: &mut SlabAlloc, index: u64, value: MixedValue, version: u64) -> Result<Self> {
        let (tag, slot) = self.encode_new(alloc, value, version)?;
        self.types = self.types.insert(alloc, index, tag.to_i64(), version)?;
        self.refs = self.refs.insert(alloc, index, slot.to_raw(), version)?;
        Ok(self)
    }

    pub fn push(self, alloc: &mut SlabAlloc, value: MixedValue, version: u64) -> Result<Self> {
        let len = self.len(alloc);
        self.insert(alloc, len, value, version)
    }

    /// Overwrites an existing cell, following the §4.4 clear-then-write
    /// discipline.
    pub fn set(mut self, alloc: &mut SlabAlloc, index: u64, value: MixedValue, version: u64) -> Result<Self> {
        self.clear_value(alloc, index, version)?;
        let (tag, slot) = self.encode_new(alloc, value, version)?;
        self.types = self.types.set(alloc, index, tag.to_i64(), version)?;
        self.refs = self.refs.set(alloc, index, slot.to_raw(), version)?;
        Ok(self)
    }

    pub fn delete(mut self, alloc: &mut SlabAlloc, index: u64, version: u64) -> Result<Self> {
        self.clear_value(alloc, index, version)?;
        self.types = self.types.delete(alloc, index, version)?;
        self.refs = self.refs.delete(alloc, index, version)?;
        Ok(self)
    }

    fn clear_value(&mut self, alloc: &mut SlabAlloc, index: u64, version: u64) -> Result<()> {
        let tag = MixedType::from_i64(self.types.get(alloc, index));
        let slot = Slot::from_raw(self.refs.get(alloc, index));

        match (tag, slot) {
            (MixedType::String | MixedType::Binary, Slot::Inline(v)) => {
                let (start, len) = decode_blob_slot(v);
                if let Some(blob) = self.blob {
                    if start + len == blob.blob_bytes(alloc).len() as u64 {
                        self.blob = Some(blob.truncate_blob(alloc, start, version)?);
                    }
                }
            }
            (MixedType::Subtable, Slot::Ref(r)) if r != NULL_REF => {
                Array::new(r).destroy(alloc, version);
            }
            _ => {}
        }
        Ok(())
    }

    fn encode_new(&mut self, alloc: &mut SlabAlloc, value: MixedValue, version: u64) -> Result<(MixedType, Slot)> {
        Ok(match value {
            MixedValue::Int(v) => (MixedType::Int, Slot::Inline(v)),
            MixedValue::Bool(b) => (MixedType::Bool, Slot::Inline(i64::from(b))),
            MixedValue::Date(v) => (MixedType::Date, Slot::Inline(v)),
            MixedValue::String(bytes) => {
                let (start, len) = self.append_to_blob(alloc, &bytes, version)?;
                (MixedType::String, Slot::Inline(encode_blob_slot(start, len)))
            }
            MixedValue::Binary(bytes) => {
                let (start, len) = self.append_to_blob(alloc, &bytes, version)?;
                (MixedType::Binary, Slot::Inline(encode_blob_slot(start, len)))
            }
            MixedValue::Subtable(r) => (MixedType::Subtable, if r == NULL_REF { Slot::Empty } else { Slot::Ref(r) }),
        })
    }

    /// Lazily materializes the shared blob the first time a mixed cell
    /// needs one (§4.4: "grows from 2 to 3 entries").
    fn append_to_blob(&mut self, alloc: &mut SlabAlloc, bytes: &[u8], version: u64) -> Result<(u64, u64)> {
        let blob = match self.blob {
            Some(b) => b,
            None => Array::create_blob(alloc)?,
        };
        let start = blob.blob_bytes(alloc).len() as u64;
        let new_blob = blob.append_blob(alloc, bytes, version)?;
        self.blob = Some(new_blob);
        Ok((start, bytes.len() as u64))
    }

    /// Destroys the column's own storage, transitively destroying every
    /// subtable still referenced from the refs-column.
    pub fn destroy(self, alloc: &mut SlabAlloc, version: u64) {
        self.types.destroy(alloc, version);
        self.refs.destroy(alloc, version);
        if let Some(blob) = self.blob {
            blob.destroy(alloc, version);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn scalar_roundtrip() {
        let mut alloc = SlabAlloc::open_buffer(Vec::new());
        let mut col = MixedColumn::create_empty(&mut alloc).expect("create");
        col = col.push(&mut alloc, MixedValue::Int(42), 1).expect("push");
        col = col.push(&mut alloc, MixedValue::Bool(true), 1).expect("push");
        col = col.push(&mut alloc, MixedValue::String(b"hi".to_vec()), 1).expect("push");

        assert_eq!(MixedValue::Int(42), col.get(&alloc, 0));
        assert_eq!(MixedValue::Bool(true), col.get(&alloc, 1));
        assert_eq!(MixedValue::String(b"hi".to_vec()), col.get(&alloc, 2));
    }

    #[test]
    fn overwrite_truncates_tail_blob_but_not_buried_string() {
        let mut alloc = SlabAlloc::open_buffer(Vec::new());
        let mut col = MixedColumn::create_empty(&mut alloc).expect("create");
        col = col.push(&mut alloc, MixedValue::String(b"first".to_vec()), 1).expect("push");
        col = col.push(&mut alloc, MixedValue::String(b"second".to_vec()), 1).expect("push");

        // Overwriting row 1 (the tail of the blob) should truncate it away.
        col = col.set(&mut alloc, 1, MixedValue::Int(1), 1).expect("set");
        let blob_len = col.blob.expect("blob exists").blob_bytes(&alloc).len();
        assert_eq!(b"first".len(), blob_len);

        // Row 0's bytes are still readable even though they're not the tail.
        assert_eq!(MixedValue::String(b"first".to_vec()), col.get(&alloc, 0));
    }

    #[test]
    fn set_subtable_then_clear_destroys_old_tree() {
        let mut alloc = SlabAlloc::open_buffer(Vec::new());
        let sub = Array::create_empty(&mut alloc, false).expect("create");

        let mut col = MixedColumn::create_empty(&mut alloc).expect("create");
        col = col.push(&mut alloc, MixedValue::Subtable(sub.ref_), 1).expect("push");
        assert_eq!(MixedValue::Subtable(sub.ref_), col.get(&alloc, 0));

        col = col.set(&mut alloc, 0, MixedValue::Int(9), 1).expect("set");
        assert_eq!(MixedValue::Int(9), col.get(&alloc, 0));
    }
}
