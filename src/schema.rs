// Copyright (c) 2024-present, coldb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A table's schema (§3.1): column names, type tags, and — for subtable
//! columns — the nested schema of the subtable's own row type.

use crate::alloc::SlabAlloc;
use crate::array::Array;
use crate::column::int::IntColumn;
use crate::column::long_string::LongStringColumn;
use crate::column::ColumnType;
use crate::error::Result;
use crate::refs::{Ref, NULL_REF};

/// `[names, types, subtable-schemas]`: column names (a long-string column),
/// type tags (a plain int column), and, for subtable columns only, the
/// nested schema's root ref (`NULL_REF` for every other column).
#[derive(Copy, Clone, Debug)]
pub struct Schema {
    pub root: Ref,
}

impl Schema {
    pub fn create_empty(alloc: &mut SlabAlloc, version: u64) -> Result<Self> {
        let names = LongStringColumn::create_empty(alloc)?;
        let types = IntColumn::create_empty(alloc)?;
        let subtables = IntColumn::create_empty(alloc)?;

        let root = Array::create_empty(alloc, true)?;
        let root = root.push(alloc, names.root as i64, version)?;
        let root = root.push(alloc, types.root as i64, version)?;
        let root = root.push(alloc, subtables.root as i64, version)?;
        Ok(Self { root: root.ref_ })
    }

    fn names(self, alloc: &SlabAlloc) -> LongStringColumn {
        LongStringColumn::from_root(Array::new(self.root).get(alloc, 0) as Ref)
    }

    fn types(self, alloc: &SlabAlloc) -> IntColumn {
        IntColumn::from_root(Array::new(self.root).get(alloc, 1) as Ref)
    }

    fn subtable_schemas(self, alloc: &SlabAlloc) -> IntColumn {
        IntColumn::from_root(Array::new(self.root).get(alloc, 2) as Ref)
    }

    #[must_use]
    pub fn len(self, alloc: &SlabAlloc) -> u64 {
        self.types(alloc).len(alloc)
    }

    #[must_use]
    pub fn name_at(self, alloc: &SlabAlloc, index: u64) -> Vec<u8> {
        self.names(alloc).get(alloc, index)
    }

    #[must_use]
    pub fn type_at(self, alloc: &SlabAlloc, index: u64) -> ColumnType {
        ColumnType::from_i64(self.types(alloc).get(alloc, index))
    }

    #[must_use]
    pub fn subtable_schema_at(self, alloc: &SlabAlloc, index: u64) -> Option<Schema> {
        let root = self.subtable_schemas(alloc).get(alloc, index) as Ref;
        (root != NULL_REF).then_some(Self { root })
    }

    #[must_use]
    pub fn find_column(self, alloc: &SlabAlloc, name: &[u8]) -> Option<u64> {
        (0..self.len(alloc)).find(|&i| self.name_at(alloc, i) == name)
    }

    pub fn add_column(
        mut self,
        alloc: &mut SlabAlloc,
        name: &[u8],
        ty: ColumnType,
        subtable_schema: Option<Schema>,
        version: u64,
    ) -> Result<Self> {
        let index = self.len(alloc);
        let names = self.names(alloc).insert(alloc, index, name, version)?;
        let types = self.types(alloc).insert(alloc, index, ty.to_i64(), version)?;
        let subtables = self.subtable_schemas(alloc).insert(
            alloc,
            index,
            subtable_schema.map_or(NULL_REF, |s| s.root) as i64,
            version,
        )?;

        let root = Array::new(self.root);
        let root = root.set(alloc, 0, names.root as i64, version)?;
        let root = root.set(alloc, 1, types.root as i64, version)?;
        let root = root.set(alloc, 2, subtables.root as i64, version)?;
        self.root = root.ref_;
        Ok(self)
    }

    /// Rewrites the tag of an already-present column (used by `optimize()`
    /// to flip a plain string column's tag to `StringEnum` in place).
    pub fn set_type_at(mut self, alloc: &mut SlabAlloc, index: u64, ty: ColumnType, version: u64) -> Result<Self> {
        let types = self.types(alloc).set(alloc, index, ty.to_i64(), version)?;
        let root = Array::new(self.root).set(alloc, 1, types.root as i64, version)?;
        self.root = root.ref_;
        Ok(self)
    }

    pub fn destroy(self, alloc: &mut SlabAlloc, version: u64) {
        // `subtable_schemas` stores nested schema roots as plain integers,
        // not `Slot::Ref`s, so the recursive destroy below never reaches
        // them; free each one explicitly first.
        for i in 0..self.len(alloc) {
            if let Some(sub) = self.subtable_schema_at(alloc, i) {
                sub.destroy(alloc, version);
            }
        }
        Array::new(self.root).destroy(alloc, version);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn add_and_look_up_columns() {
        let mut alloc = SlabAlloc::open_buffer(Vec::new());
        let mut schema = Schema::create_empty(&mut alloc, 1).expect("create");
        schema = schema.add_column(&mut alloc, b"age", ColumnType::Int, None, 1).expect("add");
        schema = schema.add_column(&mut alloc, b"name", ColumnType::String, None, 1).expect("add");

        assert_eq!(2, schema.len(&alloc));
        assert_eq!(Some(1), schema.find_column(&alloc, b"name"));
        assert_eq!(ColumnType::Int, schema.type_at(&alloc, 0));
        assert_eq!(None, schema.subtable_schema_at(&alloc, 0));
    }

    #[test]
    fn optimize_rewrites_tag_in_place() {
        let mut alloc = SlabAlloc::open_buffer(Vec::new());
        let mut schema = Schema::create_empty(&mut alloc, 1).expect("create");
        schema = schema.add_column(&mut alloc, b"tag", ColumnType::String, None, 1).expect("add");
        schema = schema.set_type_at(&mut alloc, 0, ColumnType::StringEnum, 1).expect("set");
        assert_eq!(ColumnType::StringEnum, schema.type_at(&alloc, 0));
        assert_eq!(ColumnType::String, schema.type_at(&alloc, 0).public());
    }
}
