// Copyright (c) 2024-present, coldb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The `ref` type and the tagged-scalar encoding used by has-refs arrays
//! (most prominently the mixed column's refs-column).
//!
//! See `DESIGN.md` for why this is modeled as a sum type instead of
//! following the original C++ source's raw-integer-plus-bit-test style:
//! lowering only happens at the array boundary, so the rest of the code
//! never has to remember to mask the tag bit.

/// An 8-byte-aligned offset into the allocator's unified address space.
///
/// A ref of 0 means "empty subtree / null slot".
pub type Ref = u64;

/// The empty/null ref.
pub const NULL_REF: Ref = 0;

/// A decoded slot from a has-refs array element.
///
/// The low bit of the raw stored integer is a tag: when set, the remaining
/// 63 bits are an inlined scalar rather than an offset. This type exists so
/// that code reading a has-refs array element never has to re-derive the
/// tagging rule by hand.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Slot {
    /// No subtree / no value.
    Empty,
    /// An inlined scalar, shifted left by one at rest.
    Inline(i64),
    /// A real ref to another array.
    Ref(Ref),
}

impl Slot {
    /// Decodes a raw stored 64-bit integer from a has-refs array element.
    #[must_use]
    pub fn from_raw(raw: i64) -> Self {
        if raw == 0 {
            Self::Empty
        } else if raw & 1 == 1 {
            Self::Inline(raw >> 1)
        } else {
            Self::Ref(raw as u64)
        }
    }

    /// Encodes this slot back to the raw 64-bit integer stored in the array.
    #[must_use]
    pub fn to_raw(self) -> i64 {
        match self {
            Self::Empty => 0,
            Self::Inline(v) => (v << 1) | 1,
            Self::Ref(r) => r as i64,
        }
    }

    #[must_use]
    pub const fn is_ref(self) -> bool {
        matches!(self, Self::Ref(_))
    }

    #[must_use]
    pub const fn as_ref(self) -> Option<Ref> {
        match self {
            Self::Ref(r) => Some(r),
            _ => None,
        }
    }
}
