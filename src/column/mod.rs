// Copyright (c) 2024-present, coldb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Per-type column implementations (§4.3) and the `Column` enum that ties
//! them into one runtime handle a [`crate::table::Table`] can store and
//! dispatch on by its schema-recorded [`ColumnType`].

pub mod btree;
pub mod enum_string;
pub mod index;
pub mod int;
pub mod long_string;
pub mod mixed;
pub mod short_string;
pub mod string;
pub mod subtable;

pub use enum_string::EnumStringColumn;
pub use index::Index;
pub use int::{IntColumn, RefColumn};
pub use long_string::LongStringColumn;
pub use mixed::{MixedColumn, MixedType, MixedValue};
pub use string::StringColumn;
pub use subtable::SubtableColumn;

use crate::alloc::SlabAlloc;
use crate::array::Array;
use crate::error::Result;
use crate::refs::Ref;

/// The schema-recorded tag for a column's element type (§3.1, §4.3
/// "Optimize"). `StringEnum` is an internal detail: callers asking a
/// [`crate::table::Table`] for a column's type only ever see [`Self::public`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Bool,
    Date,
    String,
    StringEnum,
    Binary,
    Mixed,
    Subtable,
}

impl ColumnType {
    #[must_use]
    pub const fn to_i64(self) -> i64 {
        match self {
            Self::Int => 0,
            Self::Bool => 1,
            Self::Date => 2,
            Self::String => 3,
            Self::StringEnum => 4,
            Self::Binary => 5,
            Self::Mixed => 6,
            Self::Subtable => 7,
        }
    }

    #[must_use]
    pub fn from_i64(v: i64) -> Self {
        match v {
            0 => Self::Int,
            1 => Self::Bool,
            2 => Self::Date,
            3 => Self::String,
            4 => Self::StringEnum,
            5 => Self::Binary,
            6 => Self::Mixed,
            7 => Self::Subtable,
            other => panic!("invalid column type tag {other}"),
        }
    }

    /// The type reported to callers; `StringEnum` reports as `String`
    /// (§4.3 "Optimize": "the column type is reported as STRING to callers").
    #[must_use]
    pub const fn public(self) -> Self {
        match self {
            Self::StringEnum => Self::String,
            other => other,
        }
    }
}

/// A runtime column handle. Each variant is one of the leaf layouts from
/// §4.3; which variant a given column index holds is recorded by the
/// table's schema, not self-describing in the stored bytes.
#[derive(Copy, Clone, Debug)]
pub enum Column {
    Int(IntColumn),
    Bool(IntColumn),
    Date(IntColumn),
    String(StringColumn),
    StringEnum(EnumStringColumn),
    Binary(LongStringColumn),
    Mixed(MixedColumn),
    Subtable(SubtableColumn),
}

impl Column {
    pub fn create_empty(alloc: &mut SlabAlloc, ty: ColumnType) -> Result<Self> {
        Ok(match ty {
            ColumnType::Int => Self::Int(IntColumn::create_empty(alloc)?),
            ColumnType::Bool => Self::Bool(IntColumn::create_empty(alloc)?),
            ColumnType::Date => Self::Date(IntColumn::create_empty(alloc)?),
            ColumnType::String => Self::String(StringColumn::create_empty(alloc)?),
            ColumnType::StringEnum => Self::StringEnum(EnumStringColumn::create_empty(alloc)?),
            ColumnType::Binary => Self::Binary(LongStringColumn::create_empty(alloc)?),
            ColumnType::Mixed => Self::Mixed(MixedColumn::create_empty(alloc)?),
            ColumnType::Subtable => Self::Subtable(SubtableColumn::create_empty(alloc)?),
        })
    }

    #[must_use]
    pub const fn column_type(&self) -> ColumnType {
        match self {
            Self::Int(_) => ColumnType::Int,
            Self::Bool(_) => ColumnType::Bool,
            Self::Date(_) => ColumnType::Date,
            Self::String(_) => ColumnType::String,
            Self::StringEnum(_) => ColumnType::StringEnum,
            Self::Binary(_) => ColumnType::Binary,
            Self::Mixed(_) => ColumnType::Mixed,
            Self::Subtable(_) => ColumnType::Subtable,
        }
    }

    #[must_use]
    pub fn len(self, alloc: &SlabAlloc) -> u64 {
        match self {
            Self::Int(c) | Self::Bool(c) | Self::Date(c) => c.len(alloc),
            Self::String(c) => c.len(alloc),
            Self::StringEnum(c) => c.len(alloc),
            Self::Binary(c) => c.len(alloc),
            Self::Mixed(c) => c.len(alloc),
            Self::Subtable(c) => c.len(alloc),
        }
    }

    pub fn destroy(self, alloc: &mut SlabAlloc, version: u64) {
        match self {
            Self::Int(c) | Self::Bool(c) | Self::Date(c) => c.destroy(alloc, version),
            Self::String(c) => c.destroy(alloc, version),
            Self::StringEnum(c) => c.destroy(alloc, version),
            Self::Binary(c) => c.destroy(alloc, version),
            Self::Mixed(c) => c.destroy(alloc, version),
            Self::Subtable(c) => c.destroy(alloc, version),
        }
    }

    /// Stores this column's internal ref(s) into a small has-refs wrapper
    /// array, the single handle a table's `columns` array actually holds
    /// for this column. See `DESIGN.md` for why a per-column wrapper was
    /// chosen over the flat variable-width `columns` array layout.
    pub fn to_container(self, alloc: &mut SlabAlloc, version: u64) -> Result<Ref> {
        let refs: Vec<i64> = match self {
            Self::Int(c) | Self::Bool(c) | Self::Date(c) => vec![c.root as i64],
            Self::String(c) => vec![c.tag(), c.root() as i64],
            Self::StringEnum(c) => vec![c.keys.tag(), c.keys.root() as i64, c.values.root as i64],
            Self::Binary(c) => vec![c.root as i64],
            Self::Mixed(c) => vec![
                c.types.root as i64,
                c.refs.root as i64,
                c.blob.map_or(0, |b| b.ref_ as i64),
            ],
            Self::Subtable(c) => vec![c.0.root as i64],
        };

        let mut container = Array::create_empty(alloc, true)?;
        for r in refs {
            container = container.push(alloc, r, version)?;
        }
        Ok(container.ref_)
    }

    #[must_use]
    pub fn from_container(alloc: &SlabAlloc, ty: ColumnType, container: Ref) -> Self {
        let arr = Array::new(container);
        let get = |i: u64| arr.get(alloc, i) as Ref;

        match ty {
            ColumnType::Int => Self::Int(IntColumn::from_root(get(0))),
            ColumnType::Bool => Self::Bool(IntColumn::from_root(get(0))),
            ColumnType::Date => Self::Date(IntColumn::from_root(get(0))),
            ColumnType::String => Self::String(StringColumn::from_tagged_root(get(0) as i64, get(1))),
            ColumnType::StringEnum => Self::StringEnum(EnumStringColumn {
                keys: StringColumn::from_tagged_root(get(0) as i64, get(1)),
                values: IntColumn::from_root(get(2)),
            }),
            ColumnType::Binary => Self::Binary(LongStringColumn::from_root(get(0))),
            ColumnType::Mixed => Self::Mixed(MixedColumn {
                types: IntColumn::from_root(get(0)),
                refs: RefColumn::from_root(get(1)),
                blob: (get(2) != 0).then(|| Array::new(get(2))),
            }),
            ColumnType::Subtable => Self::Subtable(SubtableColumn(RefColumn::from_root(get(0)))),
        }
    }
}
