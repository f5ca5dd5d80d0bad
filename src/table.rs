// Copyright (c) 2024-present, coldb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Tables (§3.1, §6): `[schema, columns, indexes]`. Every column of a
//! table has the same row count, which is the table's row count.

use crate::alloc::SlabAlloc;
use crate::array::Array;
use crate::column::{Column, ColumnType, EnumStringColumn, Index, MixedValue};
use crate::error::{Error, Result};
use crate::refs::{Ref, NULL_REF};
use crate::schema::Schema;

/// `[schema, columns, indexes]`. `columns[i]` is the container ref for
/// column `i` (see `Column::to_container`); `indexes[i]` is `NULL_REF`
/// unless column `i` has a materialized secondary index (§4.3 "Indexes").
#[derive(Copy, Clone, Debug)]
pub struct Table {
    pub root: Ref,
}

impl Table {
    pub fn create_empty(alloc: &mut SlabAlloc, version: u64) -> Result<Self> {
        let schema = Schema::create_empty(alloc, version)?;
        let columns = Array::create_empty(alloc, true)?;
        let indexes = Array::create_empty(alloc, true)?;

        let root = Array::create_empty(alloc, true)?;
        let root = root.push(alloc, schema.root as i64, version)?;
        let root = root.push(alloc, columns.ref_ as i64, version)?;
        let root = root.push(alloc, indexes.ref_ as i64, version)?;
        Ok(Self { root: root.ref_ })
    }

    #[must_use]
    pub fn schema(self, alloc: &SlabAlloc) -> Schema {
        Schema { root: Array::new(self.root).get(alloc, 0) as Ref }
    }

    /// Builds an empty table whose own schema is `schema` itself — not a
    /// fresh, independent copy — so that every subtable row created this
    /// way for the same parent column starts out byte-identical (§3.1:
    /// "for each subtable column, the subtable's own schema"). Column
    /// arrays are created to match whatever columns `schema` already has.
    fn create_empty_with_schema(alloc: &mut SlabAlloc, schema: Schema, version: u64) -> Result<Self> {
        let mut columns = Array::create_empty(alloc, true)?;
        let mut indexes = Array::create_empty(alloc, true)?;
        for i in 0..schema.len(alloc) {
            let ty = schema.type_at(alloc, i);
            let container = Column::create_empty(alloc, ty)?.to_container(alloc, version)?;
            columns = columns.push(alloc, container as i64, version)?;
            indexes = indexes.push(alloc, NULL_REF as i64, version)?;
        }

        let root = Array::create_empty(alloc, true)?;
        let root = root.push(alloc, schema.root as i64, version)?;
        let root = root.push(alloc, columns.ref_ as i64, version)?;
        let root = root.push(alloc, indexes.ref_ as i64, version)?;
        Ok(Self { root: root.ref_ })
    }

    fn columns_array(self, alloc: &SlabAlloc) -> Array {
        Array::new(Array::new(self.root).get(alloc, 1) as Ref)
    }

    fn indexes_array(self, alloc: &SlabAlloc) -> Array {
        Array::new(Array::new(self.root).get(alloc, 2) as Ref)
    }

    #[must_use]
    pub fn column_count(self, alloc: &SlabAlloc) -> u64 {
        self.schema(alloc).len(alloc)
    }

    #[must_use]
    pub fn row_count(self, alloc: &SlabAlloc) -> u64 {
        if self.column_count(alloc) == 0 {
            0
        } else {
            self.get_column(alloc, 0).len(alloc)
        }
    }

    #[must_use]
    pub fn get_column(self, alloc: &SlabAlloc, index: u64) -> Column {
        let ty = self.schema(alloc).type_at(alloc, index);
        let container = self.columns_array(alloc).get(alloc, index) as Ref;
        Column::from_container(alloc, ty, container)
    }

    fn set_column(mut self, alloc: &mut SlabAlloc, index: u64, column: Column, version: u64) -> Result<Self> {
        let container = column.to_container(alloc, version)?;
        let columns = self.columns_array(alloc).set(alloc, index, container as i64, version)?;
        let root = Array::new(self.root).set(alloc, 1, columns.ref_ as i64, version)?;
        self.root = root.ref_;
        Ok(self)
    }

    pub fn add_column(mut self, alloc: &mut SlabAlloc, name: &[u8], ty: ColumnType, version: u64) -> Result<Self> {
        if self.column_count(alloc) > 0 && self.row_count(alloc) > 0 {
            return Err(Error::SchemaChangeOnNonEmptyTable);
        }

        let column = Column::create_empty(alloc, ty)?;
        let container = column.to_container(alloc, version)?;

        let columns = self.columns_array(alloc).push(alloc, container as i64, version)?;
        let indexes = self.indexes_array(alloc).push(alloc, NULL_REF as i64, version)?;

        // A subtable column gets one shared schema (§3.1), created here so
        // every row's subtable, once materialized, starts out with the
        // same column layout instead of each inventing its own.
        let subtable_schema =
            if ty == ColumnType::Subtable { Some(Schema::create_empty(alloc, version)?) } else { None };
        let schema = self.schema(alloc).add_column(alloc, name, ty, subtable_schema, version)?;

        let root = Array::new(self.root);
        let root = root.set(alloc, 0, schema.root as i64, version)?;
        let root = root.set(alloc, 1, columns.ref_ as i64, version)?;
        let root = root.set(alloc, 2, indexes.ref_ as i64, version)?;
        self.root = root.ref_;
        Ok(self)
    }

    /// Appends a new row with every column's default value (§6
    /// "typed ... insert").
    pub fn insert_row(mut self, alloc: &mut SlabAlloc, version: u64) -> Result<Self> {
        let row = self.row_count(alloc);
        for i in 0..self.column_count(alloc) {
            let col = self.get_column(alloc, i);
            let col = match col {
                Column::Int(c) | Column::Bool(c) | Column::Date(c) => Column::Int(c.insert(alloc, row, 0, version)?),
                Column::String(c) => Column::String(c.insert(alloc, row, &[], version)?),
                Column::StringEnum(c) => Column::StringEnum(c.insert(alloc, row, &[], version)?),
                Column::Binary(c) => Column::Binary(c.insert(alloc, row, Vec::new(), version)?),
                Column::Mixed(c) => Column::Mixed(c.insert(alloc, row, MixedValue::Int(0), version)?),
                Column::Subtable(c) => Column::Subtable(c.insert(alloc, row, version)?),
            };
            self = self.set_column(alloc, i, col, version)?;
        }
        Ok(self)
    }

    pub fn remove_row(mut self, alloc: &mut SlabAlloc, row: u64, version: u64) -> Result<Self> {
        for i in 0..self.column_count(alloc) {
            let col = self.get_column(alloc, i);
            let col = match col {
                Column::Int(c) | Column::Bool(c) | Column::Date(c) => Column::Int(c.delete(alloc, row, version)?),
                Column::String(c) => Column::String(c.delete(alloc, row, version)?),
                Column::StringEnum(c) => Column::StringEnum(c.delete(alloc, row, version)?),
                Column::Binary(c) => Column::Binary(c.delete(alloc, row, version)?),
                Column::Mixed(c) => Column::Mixed(c.delete(alloc, row, version)?),
                Column::Subtable(c) => Column::Subtable(c.delete(alloc, row, version)?),
            };
            self = self.set_column(alloc, i, col, version)?;
        }
        Ok(self)
    }

    fn column_as_int(self, alloc: &SlabAlloc, index: u64) -> Result<crate::column::IntColumn> {
        match self.get_column(alloc, index) {
            Column::Int(c) | Column::Bool(c) | Column::Date(c) => Ok(c),
            _ => Err(Error::ColumnTypeMismatch),
        }
    }

    pub fn get_int(self, alloc: &SlabAlloc, column: u64, row: u64) -> Result<i64> {
        Ok(self.column_as_int(alloc, column)?.get(alloc, row))
    }

    pub fn set_int(mut self, alloc: &mut SlabAlloc, column: u64, row: u64, value: i64, version: u64) -> Result<Self> {
        let c = self.column_as_int(alloc, column)?.set(alloc, row, value, version)?;
        self.set_column(alloc, column, Column::Int(c), version)
    }

    pub fn get_bool(self, alloc: &SlabAlloc, column: u64, row: u64) -> Result<bool> {
        Ok(self.get_int(alloc, column, row)? != 0)
    }

    pub fn set_bool(self, alloc: &mut SlabAlloc, column: u64, row: u64, value: bool, version: u64) -> Result<Self> {
        self.set_int(alloc, column, row, i64::from(value), version)
    }

    pub fn get_date(self, alloc: &SlabAlloc, column: u64, row: u64) -> Result<i64> {
        self.get_int(alloc, column, row)
    }

    pub fn set_date(self, alloc: &mut SlabAlloc, column: u64, row: u64, value: i64, version: u64) -> Result<Self> {
        self.set_int(alloc, column, row, value, version)
    }

    pub fn get_string(self, alloc: &SlabAlloc, column: u64, row: u64) -> Result<Vec<u8>> {
        match self.get_column(alloc, column) {
            Column::String(c) => Ok(c.get(alloc, row)),
            Column::StringEnum(c) => Ok(c.get(alloc, row)),
            _ => Err(Error::ColumnTypeMismatch),
        }
    }

    pub fn set_string(self, alloc: &mut SlabAlloc, column: u64, row: u64, value: &[u8], version: u64) -> Result<Self> {
        let col = match self.get_column(alloc, column) {
            Column::String(c) => Column::String(c.set(alloc, row, value, version)?),
            Column::StringEnum(c) => Column::StringEnum(c.set(alloc, row, value, version)?),
            _ => return Err(Error::ColumnTypeMismatch),
        };
        self.set_column(alloc, column, col, version)
    }

    pub fn get_binary(self, alloc: &SlabAlloc, column: u64, row: u64) -> Result<Vec<u8>> {
        match self.get_column(alloc, column) {
            Column::Binary(c) => Ok(c.get(alloc, row)),
            _ => Err(Error::ColumnTypeMismatch),
        }
    }

    pub fn set_binary(mut self, alloc: &mut SlabAlloc, column: u64, row: u64, value: &[u8], version: u64) -> Result<Self> {
        let c = match self.get_column(alloc, column) {
            Column::Binary(c) => c,
            _ => return Err(Error::ColumnTypeMismatch),
        };
        let c = c.set(alloc, row, value.to_vec(), version)?;
        self.set_column(alloc, column, Column::Binary(c), version)
    }

    pub fn get_mixed(self, alloc: &SlabAlloc, column: u64, row: u64) -> Result<MixedValue> {
        match self.get_column(alloc, column) {
            Column::Mixed(c) => Ok(c.get(alloc, row)),
            _ => Err(Error::ColumnTypeMismatch),
        }
    }

    pub fn set_mixed(mut self, alloc: &mut SlabAlloc, column: u64, row: u64, value: MixedValue, version: u64) -> Result<Self> {
        let c = match self.get_column(alloc, column) {
            Column::Mixed(c) => c,
            _ => return Err(Error::ColumnTypeMismatch),
        };
        let c = c.set(alloc, row, value, version)?;
        self.set_column(alloc, column, Column::Mixed(c), version)
    }

    /// Materializes (creating it if necessary) the subtable at `(column,
    /// row)` and returns its handle. A freshly materialized subtable reuses
    /// `column`'s shared schema (§3.1) rather than inventing its own, so
    /// every row of the same subtable column starts out with the same
    /// column layout.
    pub fn get_subtable(mut self, alloc: &mut SlabAlloc, column: u64, row: u64, version: u64) -> Result<(Self, Table)> {
        let c = match self.get_column(alloc, column) {
            Column::Subtable(c) => c,
            _ => return Err(Error::ColumnTypeMismatch),
        };

        let existing = c.get_ref(alloc, row);
        if existing != NULL_REF {
            return Ok((self, Table { root: existing }));
        }

        let shared_schema = self
            .schema(alloc)
            .subtable_schema_at(alloc, column)
            .expect("a subtable column always has a shared schema recorded by add_column");
        let sub = Table::create_empty_with_schema(alloc, shared_schema, version)?;
        let c = c.set_ref(alloc, row, sub.root, version)?;
        self = self.set_column(alloc, column, Column::Subtable(c), version)?;
        Ok((self, sub))
    }

    pub fn find_first_int(self, alloc: &SlabAlloc, column: u64, value: i64) -> Result<Option<u64>> {
        if let Some(idx) = self.index_for(alloc, column) {
            return Ok(idx.find_first(alloc, value));
        }
        let c = self.column_as_int(alloc, column)?;
        Ok((0..c.len(alloc)).find(|&i| c.get(alloc, i) == value))
    }

    pub fn find_all_int(self, alloc: &SlabAlloc, column: u64, value: i64) -> Result<Vec<u64>> {
        if let Some(idx) = self.index_for(alloc, column) {
            return Ok(idx.find_all(alloc, value));
        }
        let c = self.column_as_int(alloc, column)?;
        Ok((0..c.len(alloc)).filter(|&i| c.get(alloc, i) == value).collect())
    }

    pub fn find_first_string(self, alloc: &SlabAlloc, column: u64, value: &[u8]) -> Result<Option<u64>> {
        match self.get_column(alloc, column) {
            Column::String(c) => Ok(c.find_first(alloc, value)),
            Column::StringEnum(c) => Ok(c.find_first(alloc, value)),
            _ => Err(Error::ColumnTypeMismatch),
        }
    }

    pub fn sum_int(self, alloc: &SlabAlloc, column: u64) -> Result<i64> {
        let c = self.column_as_int(alloc, column)?;
        Ok((0..c.len(alloc)).map(|i| c.get(alloc, i)).sum())
    }

    pub fn min_int(self, alloc: &SlabAlloc, column: u64) -> Result<Option<i64>> {
        let c = self.column_as_int(alloc, column)?;
        Ok((0..c.len(alloc)).map(|i| c.get(alloc, i)).min())
    }

    pub fn max_int(self, alloc: &SlabAlloc, column: u64) -> Result<Option<i64>> {
        let c = self.column_as_int(alloc, column)?;
        Ok((0..c.len(alloc)).map(|i| c.get(alloc, i)).max())
    }

    /// §4.3 "Optimize": rewrites any plain string column whose distinct
    /// value count is below half its row count into an enum column.
    pub fn optimize(mut self, alloc: &mut SlabAlloc, version: u64) -> Result<Self> {
        for i in 0..self.column_count(alloc) {
            let Column::String(c) = self.get_column(alloc, i) else { continue };
            let row_count = c.len(alloc);
            if row_count == 0 {
                continue;
            }

            let mut distinct: std::collections::HashSet<Vec<u8>> = std::collections::HashSet::new();
            for r in 0..row_count {
                distinct.insert(c.get(alloc, r));
                if distinct.len() as u64 * 2 >= row_count {
                    break;
                }
            }
            if distinct.len() as u64 * 2 >= row_count {
                continue;
            }

            let enumed = EnumStringColumn::build_from(alloc, c, version)?;
            c.destroy(alloc, version);
            self = self.set_column(alloc, i, Column::StringEnum(enumed), version)?;
            let schema = self.schema(alloc).set_type_at(alloc, i, ColumnType::StringEnum, version)?;
            let root = Array::new(self.root).set(alloc, 0, schema.root as i64, version)?;
            self.root = root.ref_;
        }
        Ok(self)
    }

    #[must_use]
    fn index_for(self, alloc: &SlabAlloc, column: u64) -> Option<Index> {
        let r = self.indexes_array(alloc).get(alloc, column) as Ref;
        (r != NULL_REF).then(|| {
            let arr = Array::new(r);
            Index {
                keys: crate::column::IntColumn::from_root(arr.get(alloc, 0) as Ref),
                rows: crate::column::RefColumn::from_root(arr.get(alloc, 1) as Ref),
            }
        })
    }

    /// §4.3 "Indexes": builds a secondary index over an int column and
    /// records its ref in the table's `indexes` array.
    pub fn set_index(mut self, alloc: &mut SlabAlloc, column: u64, version: u64) -> Result<Self> {
        let c = self.column_as_int(alloc, column)?;
        let idx = Index::build_from(alloc, c, version)?;

        let mut container = Array::create_empty(alloc, true)?;
        container = container.push(alloc, idx.keys.root as i64, version)?;
        container = container.push(alloc, idx.rows.root as i64, version)?;

        let indexes = self.indexes_array(alloc).set(alloc, column, container.ref_ as i64, version)?;
        let root = Array::new(self.root).set(alloc, 2, indexes.ref_ as i64, version)?;
        self.root = root.ref_;
        Ok(self)
    }

    pub fn destroy(self, alloc: &mut SlabAlloc, version: u64) {
        for i in 0..self.column_count(alloc) {
            self.get_column(alloc, i).destroy(alloc, version);
            if let Some(idx) = self.index_for(alloc, i) {
                idx.destroy(alloc, version);
            }
        }
        self.schema(alloc).destroy(alloc, version);
        self.columns_array(alloc).destroy(alloc, version);
        self.indexes_array(alloc).destroy(alloc, version);
        Array::new(self.root).destroy(alloc, version);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn add_columns_rows_and_typed_access() {
        let mut alloc = SlabAlloc::open_buffer(Vec::new());
        let mut table = Table::create_empty(&mut alloc, 1).expect("create");
        table = table.add_column(&mut alloc, b"age", ColumnType::Int, 1).expect("add");
        table = table.add_column(&mut alloc, b"name", ColumnType::String, 1).expect("add");

        table = table.insert_row(&mut alloc, 1).expect("insert row");
        table = table.insert_row(&mut alloc, 1).expect("insert row");
        assert_eq!(2, table.row_count(&alloc));

        table = table.set_int(&mut alloc, 0, 0, 30, 1).expect("set");
        table = table.set_string(&mut alloc, 1, 0, b"alice", 1).expect("set");
        table = table.set_int(&mut alloc, 0, 1, 40, 1).expect("set");
        table = table.set_string(&mut alloc, 1, 1, b"bob", 1).expect("set");

        assert_eq!(30, table.get_int(&alloc, 0, 0).expect("get"));
        assert_eq!(b"alice".to_vec(), table.get_string(&alloc, 1, 0).expect("get"));
        assert_eq!(Some(1), table.find_first_string(&alloc, 1, b"bob").expect("find"));
        assert_eq!(70, table.sum_int(&alloc, 0).expect("sum"));
    }

    #[test]
    fn add_column_on_nonempty_table_is_rejected() {
        let mut alloc = SlabAlloc::open_buffer(Vec::new());
        let mut table = Table::create_empty(&mut alloc, 1).expect("create");
        table = table.add_column(&mut alloc, b"a", ColumnType::Int, 1).expect("add");
        table = table.insert_row(&mut alloc, 1).expect("insert row");

        let err = table.add_column(&mut alloc, b"b", ColumnType::Int, 1).unwrap_err();
        assert!(matches!(err, Error::SchemaChangeOnNonEmptyTable));
    }

    #[test]
    fn remove_row_destroys_subtable() {
        let mut alloc = SlabAlloc::open_buffer(Vec::new());
        let mut table = Table::create_empty(&mut alloc, 1).expect("create");
        table = table.add_column(&mut alloc, b"children", ColumnType::Subtable, 1).expect("add");
        table = table.insert_row(&mut alloc, 1).expect("insert row");

        let (updated, _sub) = table.get_subtable(&mut alloc, 0, 0, 1).expect("get subtable");
        table = updated;
        table = table.remove_row(&mut alloc, 0, 1).expect("remove");
        assert_eq!(0, table.row_count(&alloc));
    }

    #[test]
    fn subtable_rows_share_the_same_schema_object() {
        let mut alloc = SlabAlloc::open_buffer(Vec::new());
        let mut table = Table::create_empty(&mut alloc, 1).expect("create");
        table = table.add_column(&mut alloc, b"children", ColumnType::Subtable, 1).expect("add");
        table = table.insert_row(&mut alloc, 1).expect("insert row");
        table = table.insert_row(&mut alloc, 1).expect("insert row");

        let (updated, first) = table.get_subtable(&mut alloc, 0, 0, 1).expect("get subtable");
        table = updated;
        let (_, second) = table.get_subtable(&mut alloc, 0, 1, 1).expect("get subtable");

        assert_eq!(
            first.schema(&alloc).root,
            second.schema(&alloc).root,
            "rows of the same subtable column should start from one shared schema"
        );
    }

    #[test]
    fn set_index_enables_log_n_lookup() {
        let mut alloc = SlabAlloc::open_buffer(Vec::new());
        let mut table = Table::create_empty(&mut alloc, 1).expect("create");
        table = table.add_column(&mut alloc, b"id", ColumnType::Int, 1).expect("add");
        for v in [30_i64, 10, 20] {
            table = table.insert_row(&mut alloc, 1).expect("insert row");
            let row = table.row_count(&alloc) - 1;
            table = table.set_int(&mut alloc, 0, row, v, 1).expect("set");
        }
        table = table.set_index(&mut alloc, 0, 1).expect("index");
        assert_eq!(Some(1), table.find_first_int(&alloc, 0, 10).expect("find"));
        assert_eq!(Some(0), table.find_first_int(&alloc, 0, 30).expect("find"));
    }

    #[test]
    fn optimize_enumerates_low_cardinality_string_column() {
        let mut alloc = SlabAlloc::open_buffer(Vec::new());
        let mut table = Table::create_empty(&mut alloc, 1).expect("create");
        table = table.add_column(&mut alloc, b"status", ColumnType::String, 1).expect("add");
        for s in [&b"ok"[..], b"ok", b"ok", b"error"] {
            table = table.insert_row(&mut alloc, 1).expect("insert row");
            let row = table.row_count(&alloc) - 1;
            table = table.set_string(&mut alloc, 0, row, s, 1).expect("set");
        }

        table = table.optimize(&mut alloc, 1).expect("optimize");
        assert_eq!(ColumnType::StringEnum, table.schema(&alloc).type_at(&alloc, 0));
        assert_eq!(ColumnType::String, table.schema(&alloc).type_at(&alloc, 0).public());
        assert_eq!(b"ok".to_vec(), table.get_string(&alloc, 0, 0).expect("get"));
        assert_eq!(b"error".to_vec(), table.get_string(&alloc, 0, 3).expect("get"));

        let again = table.optimize(&mut alloc, 1).expect("optimize again");
        assert_eq!(ColumnType::StringEnum, again.schema(&alloc).type_at(&alloc, 0));
    }
}
