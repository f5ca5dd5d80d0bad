// Copyright (c) 2024-present, coldb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The Group (§3.1, §4.5, §6): the root object over one data file or
//! buffer. Owns the table-name index and drives the commit protocol; it is
//! the only thing in this crate that ever writes bytes past `baseline`.
//!
//! On-disk, the first 16 bytes of the file are the header: bytes 0..7 are
//! the top-ref (little-endian), the ref of the Group's own top `Array`,
//! `[table-names, tables, free-pos, free-len, free-ver?]` (§6) — the
//! free-pos/free-len pair is added by the first commit; free-ver is present
//! only for groups opened in a sharing mode. Bytes 8..15 are the
//! [`FileHeader`] (`MAGIC_BYTES` + version byte + padding), stamped once at
//! bootstrap and checked on every later open. A top-ref of 0 means "reserved
//! slot, nothing committed yet" — a brand-new group that has never called
//! `commit`.

use std::path::Path;

use crate::alloc::{SlabAlloc, VersionedFreeEntry};
use crate::array::Array;
use crate::coding::{Decode, DecodeError};
use crate::column::long_string::LongStringColumn;
use crate::config::{Backing, Config, OpenMode};
use crate::error::{Error, Result};
use crate::file::{round_up_to_alignment, FileHeader, HEADER_SIZE};
use crate::refs::{Ref, Slot, NULL_REF};
use crate::table::Table;
use crate::version::Version;

pub struct Group {
    alloc: SlabAlloc,
    top: Ref,
    current_version: u64,
    read_only: bool,
    shared: bool,
}

impl Group {
    /// Opens (creating if absent) the file at `path`.
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self> {
        Self::open_with_config(Config::new(path).mode(mode))
    }

    /// Opens a group backed by an in-memory buffer, e.g. bytes received
    /// from another process or read back from a prior `open_buffer` group.
    pub fn open_buffer(bytes: Vec<u8>) -> Result<Self> {
        Self::from_alloc(SlabAlloc::open_buffer(bytes), Config::in_memory())
    }

    pub fn open_with_config(config: Config) -> Result<Self> {
        let alloc = match &config.backing {
            Backing::File(path) => SlabAlloc::open_file(path, config.mode == OpenMode::ReadOnly)?,
            Backing::Buffer => SlabAlloc::open_buffer(Vec::new()),
        };
        Self::from_alloc(alloc, config)
    }

    fn from_alloc(mut alloc: SlabAlloc, config: Config) -> Result<Self> {
        let read_only = config.mode == OpenMode::ReadOnly;
        let wants_shared = matches!(config.mode, OpenMode::Shared | OpenMode::Async);

        if let Some(fanout) = config.fanout_override {
            alloc.set_fanout(fanout);
        }
        alloc.set_initial_slab_size(config.initial_slab_size as u64);

        if alloc.baseline() == 0 {
            if read_only {
                return Err(Error::InvalidFile);
            }
            Self::reserve_top_slot(&mut alloc)?;
        } else if alloc.baseline() % 8 != 0 {
            return Err(Error::InvalidFile);
        } else {
            Self::validate_header(&alloc)?;
        }

        let top_ref = Self::read_top_ref(&alloc);

        let (top, shared, current_version) = if top_ref == NULL_REF {
            if read_only {
                return Err(Error::InvalidFile);
            }
            let version = 1;
            let table_names = LongStringColumn::create_empty(&mut alloc)?;
            let tables = Array::create_empty(&mut alloc, true)?;

            let mut top_arr = Array::create_empty(&mut alloc, true)?;
            top_arr = top_arr.push(&mut alloc, table_names.root as i64, version)?;
            top_arr = top_arr.push(&mut alloc, tables.ref_ as i64, version)?;
            // Free-list slots are added by the first `commit`, not here:
            // nothing has been freed yet in a brand-new group.
            (top_arr.ref_, wants_shared, version)
        } else {
            if top_ref % 8 != 0 || top_ref >= alloc.baseline() {
                return Err(Error::InvalidFile);
            }
            let format_shared = Array::new(top_ref).len(&alloc) >= 5;
            let newest_freed = Self::restore_free_lists(&mut alloc, top_ref);
            (top_ref, format_shared || wants_shared, newest_freed + 1)
        };

        Ok(Self {
            alloc,
            top,
            current_version,
            read_only,
            shared,
        })
    }

    /// Writes the placeholder top-ref and stamps the [`FileHeader`] into a
    /// brand-new, empty backing store.
    fn reserve_top_slot(alloc: &mut SlabAlloc) -> Result<()> {
        let mut bytes = [0_u8; HEADER_SIZE as usize];
        bytes[8..].copy_from_slice(&FileHeader { version: Version::V1 }.encode_into_vec());
        alloc.write_at(0, &bytes)?;
        alloc.free_all(HEADER_SIZE)
    }

    fn read_top_ref(alloc: &SlabAlloc) -> Ref {
        let mut bytes = [0_u8; 8];
        bytes.copy_from_slice(alloc.read(0, 8));
        Ref::from_le_bytes(bytes)
    }

    /// Checks the magic bytes and version stamped into an existing backing
    /// store's header (bytes 8..15).
    fn validate_header(alloc: &SlabAlloc) -> Result<()> {
        let bytes = alloc.read(8, (HEADER_SIZE - 8) as usize);
        let raw_version = bytes[4];
        match FileHeader::decode_from(&mut &bytes[..]) {
            Ok(_) => Ok(()),
            Err(DecodeError::InvalidVersion) => Err(Error::InvalidVersion(raw_version)),
            Err(other) => Err(other.into()),
        }
    }

    /// Loads any free-pos/free-len/free-ver entries already in the file
    /// into the allocator's read-only free list, returning the newest
    /// version tag seen (so the in-process version counter can resume
    /// past it rather than restart at 1 and make those entries
    /// unreclaimable until it catches back up).
    fn restore_free_lists(alloc: &mut SlabAlloc, top_ref: Ref) -> u64 {
        let top_arr = Array::new(top_ref);
        let len = top_arr.len(alloc);
        if len < 4 {
            return 0;
        }

        let positions = Array::new(top_arr.get(alloc, 2) as Ref);
        let sizes = Array::new(top_arr.get(alloc, 3) as Ref);
        let versions = (len >= 5).then(|| Array::new(top_arr.get(alloc, 4) as Ref));

        let n = positions.len(alloc);
        let mut entries = Vec::with_capacity(n as usize);
        let mut newest = 0;
        for i in 0..n {
            let version = versions.map_or(0, |v| v.get(alloc, i) as u64);
            newest = newest.max(version);
            entries.push(VersionedFreeEntry {
                ref_: positions.get(alloc, i) as Ref,
                size: sizes.get(alloc, i) as u64,
                version,
            });
        }
        alloc.restore_read_free(entries);
        newest
    }

    // -----------------------------------------------------------------
    // Table directory
    // -----------------------------------------------------------------

    fn table_names(&self) -> LongStringColumn {
        LongStringColumn::from_root(Array::new(self.top).get(&self.alloc, 0) as Ref)
    }

    fn tables_array(&self) -> Array {
        Array::new(Array::new(self.top).get(&self.alloc, 1) as Ref)
    }

    fn find_table(&self, name: &[u8]) -> Option<u64> {
        let names = self.table_names();
        (0..names.len(&self.alloc)).find(|&i| names.get(&self.alloc, i) == name)
    }

    #[must_use]
    pub fn has_table(&self, name: &[u8]) -> bool {
        self.find_table(name).is_some()
    }

    #[must_use]
    pub fn table_count(&self) -> u64 {
        self.table_names().len(&self.alloc)
    }

    #[must_use]
    pub fn table_name_at(&self, index: u64) -> Vec<u8> {
        self.table_names().get(&self.alloc, index)
    }

    #[must_use]
    pub fn get_table(&self, name: &[u8]) -> Option<Table> {
        let index = self.find_table(name)?;
        Some(Table { root: self.tables_array().get(&self.alloc, index) as Ref })
    }

    /// Returns the table named `name`, creating an empty one on demand
    /// (§6: "tables created on demand").
    pub fn add_table(&mut self, name: &[u8]) -> Result<Table> {
        if let Some(existing) = self.get_table(name) {
            return Ok(existing);
        }
        if self.read_only {
            return Err(Error::InvalidGroup);
        }

        let version = self.current_version;
        let table = Table::create_empty(&mut self.alloc, version)?;

        let names_len = self.table_names().len(&self.alloc);
        let names = self.table_names().insert(&mut self.alloc, names_len, name.to_vec(), version)?;
        let tables = self.tables_array().push(&mut self.alloc, table.root as i64, version)?;
        self.set_directory(names.root, tables.ref_, version)?;

        Ok(table)
    }

    pub fn remove_table(&mut self, name: &[u8]) -> Result<()> {
        if self.read_only {
            return Err(Error::InvalidGroup);
        }
        let index = self.find_table(name).ok_or(Error::NoSuchTable)?;
        let version = self.current_version;

        let table = Table { root: self.tables_array().get(&self.alloc, index) as Ref };
        table.destroy(&mut self.alloc, version);

        let names = self.table_names().delete(&mut self.alloc, index, version)?;
        let tables = self.tables_array().delete(&mut self.alloc, index, version)?;
        self.set_directory(names.root, tables.ref_, version)
    }

    /// Writes a table's new root ref back into the tables directory after
    /// a caller has mutated it through the copy-on-write `Table` API.
    pub fn update_table(&mut self, name: &[u8], table: Table) -> Result<()> {
        let index = self.find_table(name).ok_or(Error::NoSuchTable)?;
        let version = self.current_version;
        let tables = self.tables_array().set(&mut self.alloc, index, table.root as i64, version)?;

        let top_arr = Array::new(self.top).set(&mut self.alloc, 1, tables.ref_ as i64, version)?;
        self.top = top_arr.ref_;
        Ok(())
    }

    fn set_directory(&mut self, names_root: Ref, tables_root: Ref, version: u64) -> Result<()> {
        let top_arr = Array::new(self.top);
        let top_arr = top_arr.set(&mut self.alloc, 0, names_root as i64, version)?;
        let top_arr = top_arr.set(&mut self.alloc, 1, tables_root as i64, version)?;
        self.top = top_arr.ref_;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Allocator access for table/column mutators
    // -----------------------------------------------------------------

    #[must_use]
    pub fn alloc(&self) -> &SlabAlloc {
        &self.alloc
    }

    pub fn alloc_mut(&mut self) -> &mut SlabAlloc {
        &mut self.alloc
    }

    #[must_use]
    pub const fn version(&self) -> u64 {
        self.current_version
    }

    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.read_only
    }

    // -----------------------------------------------------------------
    // Commit (§4.5)
    // -----------------------------------------------------------------

    /// Commits the current transaction, using `current_version` as a
    /// stand-in for `readlock_version` (no readers are pinned older than
    /// "whatever this writer has not freed yet"). `SharedGroup` calls
    /// [`Self::commit_with_readlock`] directly with the value it learns
    /// from the reader ring buffer (§5).
    pub fn commit(&mut self) -> Result<()> {
        let readlock_version = self.current_version;
        self.commit_with_readlock(readlock_version)
    }

    /// Runs the 8-step commit sequence (§4.5). `readlock_version` gates
    /// which previously-freed regions of the file are safe to reuse: an
    /// entry freed at version `v` is only reused once `v < readlock_version`,
    /// i.e. once no live reader could still be looking at the pre-free
    /// content — so a region freed by *this* transaction is never reused
    /// within the same commit, only by a later one.
    pub fn commit_with_readlock(&mut self, readlock_version: u64) -> Result<()> {
        if self.read_only {
            return Err(Error::InvalidGroup);
        }
        let version = self.current_version;
        let top = Array::new(self.top);

        // Step 1: flatten the real data bottom-up, reusing file space the
        // version gate allows. table-names and tables are flattened
        // independently (each a single bottom-up descent) rather than as
        // one descent over the whole top, so that assembling the new top
        // below never re-visits — and so never re-copies — data this step
        // already finalized.
        let names_ref = Self::serialize_subtree(&mut self.alloc, top.get(&self.alloc, 0) as Ref, readlock_version, version)?;
        let tables_ref = Self::serialize_subtree(&mut self.alloc, top.get(&self.alloc, 1) as Ref, readlock_version, version)?;

        // Steps 2-3: snapshot the free list now that every reuse decision
        // for this commit has already been made (step 1 is the only thing
        // that calls `get_free_space`), and build fresh free-pos/free-len/
        // free-ver leaves describing exactly that snapshot. They are
        // appended below rather than drawn from the free list they
        // describe, so writing them can never retroactively change the
        // very thing they describe — see DESIGN.md for why this sidesteps
        // the spec's literal placeholder-padding trick.
        let entries: Vec<VersionedFreeEntry> = self.alloc.read_free_entries().copied().collect();

        let mut positions = Array::create_empty(&mut self.alloc, false)?;
        let mut sizes = Array::create_empty(&mut self.alloc, false)?;
        let mut versions = self.shared.then(|| Array::create_empty(&mut self.alloc, false)).transpose()?;
        for entry in &entries {
            positions = positions.push(&mut self.alloc, entry.ref_ as i64, version)?;
            sizes = sizes.push(&mut self.alloc, entry.size as i64, version)?;
            if let Some(v) = versions {
                versions = Some(v.push(&mut self.alloc, entry.version as i64, version)?);
            }
        }

        let positions_ref = self.append_array(positions)?;
        let sizes_ref = self.append_array(sizes)?;
        let versions_ref = versions.map(|v| self.append_array(v)).transpose()?;

        let mut new_top = Array::create_empty(&mut self.alloc, true)?;
        new_top = new_top.push(&mut self.alloc, names_ref as i64, version)?;
        new_top = new_top.push(&mut self.alloc, tables_ref as i64, version)?;
        new_top = new_top.push(&mut self.alloc, positions_ref as i64, version)?;
        new_top = new_top.push(&mut self.alloc, sizes_ref as i64, version)?;
        if let Some(v) = versions_ref {
            new_top = new_top.push(&mut self.alloc, v as i64, version)?;
        }
        let new_top_ref = self.append_array(new_top)?;

        // Step 4: fsync before the new root becomes reachable.
        self.alloc.sync()?;

        // Step 5: publish the new top-ref with a single aligned 8-byte write.
        self.alloc.write_at(0, &new_top_ref.to_le_bytes())?;

        // Step 6: fsync again so the top-ref write itself is durable.
        self.alloc.sync()?;

        // Step 7: remap and hand the allocator the new file size.
        let new_file_size = round_up_to_alignment(self.alloc.actual_len()?);
        self.alloc.free_all(new_file_size)?;

        // Step 8: table/column handles in this engine are recomputed from
        // the live top ref on every lookup rather than cached, so there is
        // nothing further to refresh (see DESIGN.md).
        self.top = new_top_ref;
        self.current_version += 1;
        Ok(())
    }

    /// Recursively relocates every scratch-backed (dirty) array reachable
    /// from `r` into file space, rewriting parent ref slots in place as
    /// children are relocated. Arrays already in the read-only image are
    /// returned unchanged — they are not dirty, so nothing to do.
    fn serialize_subtree(alloc: &mut SlabAlloc, r: Ref, readlock_version: u64, version: u64) -> Result<Ref> {
        if r == NULL_REF || alloc.is_readonly(r) {
            return Ok(r);
        }

        let mut arr = Array::new(r);
        if arr.has_refs(alloc) {
            for i in 0..arr.len(alloc) {
                if let Slot::Ref(child) = arr.get_slot(alloc, i) {
                    let relocated = Self::serialize_subtree(alloc, child, readlock_version, version)?;
                    if relocated != child {
                        arr = arr.set(alloc, i, relocated as i64, version)?;
                    }
                }
            }
        }

        let size = arr.byte_size(alloc);
        let bytes = alloc.read(arr.ref_, size as usize).to_vec();

        Ok(match alloc.get_free_space(size, readlock_version) {
            Some(dest) => {
                alloc.write_at(dest, &bytes)?;
                dest
            }
            None => alloc.append(&bytes)?,
        })
    }

    /// Copies a freshly-built scratch array's current bytes to the end of
    /// the backing store, never drawing from the free list (see the
    /// commit-sequence comment above for why).
    fn append_array(&mut self, arr: Array) -> Result<Ref> {
        let size = arr.byte_size(&self.alloc);
        let bytes = self.alloc.read(arr.ref_, size as usize).to_vec();
        self.alloc.append(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{Column, ColumnType};
    use test_log::test;

    #[test]
    fn fresh_buffer_has_no_tables() {
        let group = Group::open_buffer(Vec::new()).expect("open");
        assert_eq!(0, group.table_count());
        assert!(!group.has_table(b"people"));
    }

    #[test]
    fn add_table_is_idempotent_by_name() {
        let mut group = Group::open_buffer(Vec::new()).expect("open");
        let a = group.add_table(b"people").expect("add");
        let b = group.add_table(b"people").expect("add again");
        assert_eq!(a.root, b.root);
        assert_eq!(1, group.table_count());
    }

    #[test]
    fn commit_persists_data_across_reopen() {
        let mut group = Group::open_buffer(Vec::new()).expect("open");
        let version = group.version();
        let mut table = group.add_table(b"people").expect("add table");
        table = table.add_column(group.alloc_mut(), b"age", ColumnType::Int, version).expect("add column");
        table = table.insert_row(group.alloc_mut(), version).expect("insert row");
        table = table.set_int(group.alloc_mut(), 0, 0, 42, version).expect("set");
        group.update_table(b"people", table).expect("update");

        group.commit().expect("commit");

        // Re-derive the bytes and reopen as a brand-new Group to prove the
        // write actually reached the backing store, not just this handle.
        let bytes = group.alloc().read(0, group.alloc().actual_len().expect("len") as usize).to_vec();
        let reopened = Group::open_buffer(bytes).expect("reopen");
        let table = reopened.get_table(b"people").expect("table survives commit");
        assert_eq!(1, table.row_count(reopened.alloc()));
        assert_eq!(42, table.get_int(reopened.alloc(), 0, 0).expect("get"));
    }

    #[test]
    fn third_commit_reuses_space_freed_by_the_second() {
        let mut group = Group::open_buffer(Vec::new()).expect("open");
        let mut table = group.add_table(b"t").expect("add table");
        let version = group.version();
        table = table.add_column(group.alloc_mut(), b"n", ColumnType::Int, version).expect("add column");
        table = table.insert_row(group.alloc_mut(), version).expect("insert row");
        group.update_table(b"t", table).expect("update");
        group.commit().expect("first commit");

        // Second commit: the int leaf's copy-on-write chain is freed tagged
        // at this (not-yet-incremented) version. Those entries are gated by
        // `readlock_version` and so are not yet reusable within this same
        // commit — this commit still grows the file.
        let mut table = group.get_table(b"t").expect("table");
        let version = group.version();
        table = table.set_int(group.alloc_mut(), 0, 0, 7, version).expect("set");
        group.update_table(b"t", table).expect("update");
        group.commit().expect("second commit");

        let size_after_second = group.alloc().actual_len().expect("len");

        // Third commit: readlock_version has advanced past the second
        // commit's frees, so this commit's own copy-on-write chain can
        // reuse that space instead of growing the file further.
        let mut table = group.get_table(b"t").expect("table");
        let version = group.version();
        table = table.set_int(group.alloc_mut(), 0, 0, 9, version).expect("set");
        group.update_table(b"t", table).expect("update");
        group.commit().expect("third commit");

        let table = group.get_table(b"t").expect("table");
        assert_eq!(9, table.get_int(group.alloc(), 0, 0).expect("get"));

        let size_after_third = group.alloc().actual_len().expect("len");
        assert!(
            size_after_third <= size_after_second + 64,
            "third commit should mostly reuse space freed by the second instead of growing the file further"
        );
    }

    #[test]
    fn read_only_group_rejects_mutation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ro.cdb");

        let mut group = Group::open(&path, OpenMode::Default).expect("open");
        group.add_table(b"t").expect("add table");
        group.commit().expect("commit");
        drop(group);

        let mut ro = Group::open(&path, OpenMode::ReadOnly).expect("reopen read-only");
        assert!(ro.has_table(b"t"));
        assert!(matches!(ro.add_table(b"other"), Err(Error::InvalidGroup)));
        assert!(matches!(ro.commit(), Err(Error::InvalidGroup)));
    }

    #[test]
    fn fanout_override_takes_effect_for_new_columns() {
        let mut group = Group::open_with_config(Config::in_memory().fanout_override(4)).expect("open");
        let mut table = group.add_table(b"t").expect("add table");
        let version = group.version();
        table = table.add_column(group.alloc_mut(), b"n", ColumnType::Int, version).expect("add column");

        for i in 0..10 {
            table = table.insert_row(group.alloc_mut(), version).expect("insert row");
            table = table.set_int(group.alloc_mut(), 0, i, i as i64, version).expect("set");
        }

        let root = match table.get_column(group.alloc(), 0) {
            Column::Int(c) => c.root,
            _ => unreachable!("column 0 was created as Int"),
        };
        assert!(
            Array::new(root).is_inner(group.alloc()),
            "a fan-out override of 4 should force a split well before the default 1000-row threshold"
        );
    }

    #[test]
    fn reopening_empty_path_twice_builds_file_backed_group() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fresh.cdb");

        {
            let mut group = Group::open(&path, OpenMode::Default).expect("open");
            group.add_table(b"t").expect("add table");
            group.commit().expect("commit");
        }

        let group = Group::open(&path, OpenMode::Default).expect("reopen");
        assert!(group.has_table(b"t"));
    }
}
