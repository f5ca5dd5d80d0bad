// Copyright (c) 2024-present, coldb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The slab allocator (§4.1): a single address space in which every live
//! region has a stable [`Ref`]. Refs below `baseline` resolve into the
//! read-only mapped image; refs at or above resolve into a chain of
//! in-memory scratch slabs allocated during the current write transaction.

mod free_list;
mod image;
mod slab;

pub use free_list::VersionedFreeEntry;
use free_list::{FreeList, VersionedFreeList};
pub use image::Image;
use slab::{next_slab_size, Slab};

use crate::column::btree::FANOUT;
use crate::error::{Error, Result};
use crate::refs::Ref;
use std::path::Path;

/// Hybrid allocator: read-only region backed by a memory map (or an
/// in-memory buffer), write region backed by growable scratch slabs.
pub struct SlabAlloc {
    baseline: Ref,
    image: Image,
    slabs: Vec<Slab>,
    write_free: FreeList,
    read_free: VersionedFreeList,
    fanout: u64,
    initial_slab_size: u64,
}

impl SlabAlloc {
    pub fn open_file(path: &Path, read_only: bool) -> Result<Self> {
        let image = Image::open_file(path, read_only)?;
        let baseline = image.len();

        if baseline % 8 != 0 {
            return Err(Error::InvalidFile);
        }

        Ok(Self {
            baseline,
            image,
            slabs: Vec::new(),
            write_free: FreeList::default(),
            read_free: VersionedFreeList::default(),
            fanout: FANOUT,
            initial_slab_size: slab::MIN_SLAB_SIZE,
        })
    }

    #[must_use]
    pub fn open_buffer(bytes: Vec<u8>) -> Self {
        let baseline = bytes.len() as Ref;
        Self {
            baseline,
            image: Image::open_buffer(bytes),
            slabs: Vec::new(),
            write_free: FreeList::default(),
            read_free: VersionedFreeList::default(),
            fanout: FANOUT,
            initial_slab_size: slab::MIN_SLAB_SIZE,
        }
    }

    #[must_use]
    pub const fn baseline(&self) -> Ref {
        self.baseline
    }

    /// The column B-tree fan-out new splits in this allocator use (§4.3).
    /// Defaults to [`FANOUT`]; overridden by [`Self::set_fanout`] when a
    /// [`crate::config::Config::fanout_override`] is in effect.
    #[must_use]
    pub const fn fanout(&self) -> u64 {
        self.fanout
    }

    /// Overrides the column B-tree fan-out (§6, test-only knob). Must be
    /// called before any column is created in this allocator, since it is
    /// not itself persisted.
    pub fn set_fanout(&mut self, fanout: u64) {
        self.fanout = fanout;
    }

    /// Overrides the size of the first write-scratch slab (§4.1, §6).
    pub fn set_initial_slab_size(&mut self, bytes: u64) {
        self.initial_slab_size = bytes;
    }

    #[must_use]
    pub const fn is_readonly(&self, r: Ref) -> bool {
        r < self.baseline
    }

    #[must_use]
    pub fn file_path(&self) -> Option<&std::path::PathBuf> {
        self.image.path()
    }

    fn find_slab(&self, r: Ref) -> &Slab {
        self.slabs
            .iter()
            .find(|s| s.contains(r))
            .expect("ref must resolve into a known slab")
    }

    fn find_slab_mut(&mut self, r: Ref) -> &mut Slab {
        self.slabs
            .iter_mut()
            .find(|s| s.contains(r))
            .expect("ref must resolve into a known slab")
    }

    /// Borrows `len` bytes starting at `r`, wherever they live.
    #[must_use]
    pub fn read(&self, r: Ref, len: usize) -> &[u8] {
        if r < self.baseline {
            let start = r as usize;
            &self.image.as_slice()[start..start + len]
        } else {
            let slab = self.find_slab(r);
            let local = (r - slab.start) as usize;
            &slab.data[local..local + len]
        }
    }

    /// Mutably borrows `len` bytes starting at `r`. Only valid for scratch
    /// refs (`r >= baseline`); mutating the read-only image directly would
    /// violate copy-on-write and is a programmer error.
    pub fn write_mut(&mut self, r: Ref, len: usize) -> &mut [u8] {
        assert!(
            r >= self.baseline,
            "attempted to mutate a read-only ref without copy-on-write"
        );
        let slab = self.find_slab_mut(r);
        let local = (r - slab.start) as usize;
        &mut slab.data[local..local + len]
    }

    /// Allocates `size` (a multiple of 8) bytes of scratch space, returning
    /// its ref. First-fit over the write-side free list; on a miss, grows
    /// the slab chain.
    pub fn alloc(&mut self, size: u64) -> Result<Ref> {
        debug_assert_eq!(size % 8, 0, "allocations must be 8-byte aligned");

        if let Some(r) = self.write_free.take_first_fit(size) {
            return Ok(r);
        }

        let new_size = match self.slabs.last() {
            Some(last) => next_slab_size(size, last.data.len() as u64),
            None => next_slab_size(size, 0).max(self.initial_slab_size),
        };

        let start = self.slabs.last().map_or(self.baseline, Slab::end);
        let slab = Slab::new(start, new_size);
        self.slabs.push(slab);

        if new_size > size {
            // Register the unused tail of the freshly grown slab.
            self.write_free.insert(start + size, new_size - size, &[]);
        }

        Ok(start)
    }

    /// Returns `r` (and the `size` bytes at it) to the appropriate free
    /// list. Refs below `baseline` go to the read-only free list, tagged
    /// with `version` (the commit at which they became unreachable);
    /// scratch refs go to the write-side free list.
    pub fn free(&mut self, r: Ref, size: u64, version: u64) {
        if r < self.baseline {
            self.read_free.insert(r, size, version);
        } else {
            let boundaries: Vec<Ref> = self.slabs.iter().map(|s| s.start).collect();
            self.write_free.insert(r, size, &boundaries);
        }
    }

    /// Allocates a new region, copies `old_size` bytes from `r`, and frees
    /// the old region. The allocator never attempts in-place growth.
    pub fn realloc(&mut self, r: Ref, old_size: u64, new_size: u64, version: u64) -> Result<Ref> {
        let new_ref = self.alloc(new_size)?;

        let copy_len = old_size.min(new_size) as usize;
        let old_bytes = self.read(r, copy_len).to_vec();
        self.write_mut(new_ref, copy_len).copy_from_slice(&old_bytes);

        self.free(r, old_size, version);

        Ok(new_ref)
    }

    /// Looks for free space to serialize a dirty array of `size` bytes
    /// during commit (§4.5 step 1): reuse a read-only free-list entry
    /// vacated before `readlock_version`, or signal that the file must be
    /// extended by returning `None`.
    pub fn get_free_space(&mut self, size: u64, readlock_version: u64) -> Option<Ref> {
        self.read_free.take_first_fit(size, readlock_version)
    }

    /// Appends bytes at the end of the backing file/buffer, returning the
    /// ref they now live at. Used by commit when `get_free_space` can't
    /// satisfy an allocation from the read-only free list.
    pub fn append(&mut self, bytes: &[u8]) -> Result<Ref> {
        let end = self.image.len().max(self.baseline);
        self.image.write_at(end, bytes)?;
        Ok(end)
    }

    pub fn write_at(&mut self, r: Ref, bytes: &[u8]) -> Result<()> {
        self.image.write_at(r, bytes)
    }

    pub fn sync(&self) -> Result<()> {
        self.image.sync()
    }

    /// The backing store's true current length (see `Image::actual_len`).
    pub fn actual_len(&self) -> Result<u64> {
        self.image.actual_len()
    }

    /// The commit handoff (§4.1): every scratch slab's content has already
    /// been serialized into the file by the caller, so it's discarded
    /// wholesale; the mapping is re-established at `new_file_size`, and
    /// `baseline` advances. The read-only free list carries forward.
    pub fn free_all(&mut self, new_file_size: u64) -> Result<()> {
        self.slabs.clear();
        self.write_free.clear();
        self.image.remap()?;
        self.baseline = new_file_size;
        Ok(())
    }

    pub fn read_free_entries(&self) -> impl Iterator<Item = &VersionedFreeEntry> {
        self.read_free.iter()
    }

    pub fn restore_read_free(&mut self, entries: Vec<VersionedFreeEntry>) {
        self.read_free.replace_all(entries);
    }
}
