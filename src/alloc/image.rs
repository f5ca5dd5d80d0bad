// Copyright (c) 2024-present, coldb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::error::{Error, Result};
use memmap2::{Mmap, MmapOptions};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// The read-only region backing a [`super::SlabAlloc`]: either a
/// memory-mapped file, or an in-memory buffer handed in via
/// `Group::open_buffer`.
pub enum Image {
    /// Backed by a real file, memory-mapped read-only.
    File { path: PathBuf, file: File, map: Option<Mmap> },
    /// Backed by a caller-owned in-memory buffer. Freed when the `Group`
    /// that owns it is dropped, same as the C++ source's owned-buffer flag.
    Buffer(Vec<u8>),
    /// No backing store yet (a brand-new, empty group).
    Empty,
}

impl Image {
    pub fn open_file(path: &Path, read_only: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .create(!read_only)
            .open(path)?;

        let len = file.metadata()?.len();

        let map = if len == 0 {
            None
        } else {
            // SAFETY: the file is only ever mutated by this process while holding
            // the write lock, and committed writes always land at offsets beyond
            // what any existing mapping covers or are immediately followed by a
            // remap; concurrent external modification of the file is outside this
            // engine's contract (see §5: single-writer/multi-reader per file).
            #[expect(unsafe_code, reason = "memmap2::Mmap::map is inherently unsafe")]
            Some(unsafe { MmapOptions::new().map(&file)? })
        };

        Ok(Self::File {
            path: path.to_path_buf(),
            file,
            map,
        })
    }

    #[must_use]
    pub fn open_buffer(bytes: Vec<u8>) -> Self {
        Self::Buffer(bytes)
    }

    #[must_use]
    pub fn len(&self) -> u64 {
        match self {
            Self::File { map, .. } => map.as_ref().map_or(0, |m| m.len() as u64),
            Self::Buffer(b) => b.len() as u64,
            Self::Empty => 0,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Self::File { map, .. } => map.as_deref().unwrap_or(&[]),
            Self::Buffer(b) => b,
            Self::Empty => &[],
        }
    }

    /// Writes `bytes` at `offset`, growing the backing store if needed, but
    /// does *not* remap/refresh the readable view; call [`Self::remap`]
    /// afterwards.
    pub fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        match self {
            Self::File { file, .. } => {
                file.seek(SeekFrom::Start(offset))?;
                file.write_all(bytes)?;
                Ok(())
            }
            Self::Buffer(buf) => {
                let end = offset as usize + bytes.len();
                if buf.len() < end {
                    buf.resize(end, 0);
                }
                buf[offset as usize..end].copy_from_slice(bytes);
                Ok(())
            }
            Self::Empty => Err(Error::InvalidGroup),
        }
    }

    /// The backing store's true current length, independent of whether the
    /// read-only view has been remapped to see it yet. Used by commit to
    /// learn the post-append file size before handing it to `remap`.
    pub fn actual_len(&self) -> Result<u64> {
        Ok(match self {
            Self::File { file, .. } => file.metadata()?.len(),
            Self::Buffer(b) => b.len() as u64,
            Self::Empty => 0,
        })
    }

    pub fn sync(&self) -> Result<()> {
        if let Self::File { file, .. } = self {
            file.sync_all()?;
        }
        Ok(())
    }

    /// Re-establishes the readable view after a commit wrote past the
    /// previous end of file (the "munmap+mmap" step of §4.1's commit
    /// handoff). For a buffer-backed image this is a no-op: the buffer is
    /// already the readable view.
    pub fn remap(&mut self) -> Result<()> {
        if let Self::File { file, map, .. } = self {
            let len = file.metadata()?.len();
            *map = if len == 0 {
                None
            } else {
                #[expect(unsafe_code, reason = "memmap2::Mmap::map is inherently unsafe")]
                Some(unsafe { MmapOptions::new().map(&*file)? })
            };
        }
        Ok(())
    }

    #[must_use]
    pub const fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::File { path, .. } => Some(path),
            _ => None,
        }
    }
}
