// Copyright (c) 2024-present, coldb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! `Group` configuration builder (§6). Mirrors the teacher's
//! `Config::new(path).builder_method(...)` idiom: a plain struct with public
//! fields, a `Default` impl, and chainable `#[must_use]` setters.

use std::path::{Path, PathBuf};

/// How a [`crate::group::Group`] is opened (§6, §5).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OpenMode {
    /// Single process, exclusive read/write access. No lock file.
    Default,

    /// Single process, the data file is never written to.
    ReadOnly,

    /// Multi-process: maintains the sibling `.lock` file and the
    /// `ReadCount` ring buffer so concurrent readers and one writer can
    /// coordinate (§5).
    Shared,

    /// Like `Default`, but new tables are only ever appended to, never
    /// rewritten in place — existing committed data is never touched by a
    /// subsequent commit.
    Append,

    /// Like `Shared`, but commits are expected to be driven from an async
    /// runtime rather than blocking the calling thread on `writemutex`.
    Async,
}

impl Default for OpenMode {
    fn default() -> Self {
        Self::Default
    }
}

impl From<OpenMode> for u8 {
    fn from(val: OpenMode) -> Self {
        match val {
            OpenMode::Default => 0,
            OpenMode::ReadOnly => 1,
            OpenMode::Shared => 2,
            OpenMode::Append => 3,
            OpenMode::Async => 4,
        }
    }
}

impl TryFrom<u8> for OpenMode {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Default),
            1 => Ok(Self::ReadOnly),
            2 => Ok(Self::Shared),
            3 => Ok(Self::Append),
            4 => Ok(Self::Async),
            _ => Err(()),
        }
    }
}

/// Where a [`crate::group::Group`]'s bytes live.
#[derive(Clone, Debug)]
pub enum Backing {
    /// A file on disk at this path, mmap-backed.
    File(PathBuf),

    /// An in-memory buffer; never persisted. Used by tests and by callers
    /// building a group purely to hand its bytes to another process.
    Buffer,
}

/// Process-local knobs that never touch the on-disk image: backing store
/// selection, open mode, and allocator tuning. Split from any persisted
/// header fields the same way the teacher splits `Config` (process-local)
/// from the bytes it stamps into `file.rs`/`format_version.rs` headers.
#[derive(Clone, Debug)]
pub struct Config {
    /// Backing store: a file path or an in-memory buffer.
    #[doc(hidden)]
    pub backing: Backing,

    /// How the group is opened (§6).
    pub mode: OpenMode,

    /// Initial size of the first write-scratch slab, in bytes (§4.1).
    pub initial_slab_size: usize,

    /// Overrides the column B-tree fan-out (§4.3). Test-only: changing
    /// this changes the on-disk split points, so real files must always
    /// use the default.
    #[doc(hidden)]
    pub fanout_override: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backing: Backing::Buffer,
            mode: OpenMode::default(),
            initial_slab_size: /* 4 KiB */ 4_096,
            fanout_override: None,
        }
    }
}

impl Config {
    /// Initializes a new config for a file-backed group at `path`.
    #[must_use]
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            backing: Backing::File(path.as_ref().to_path_buf()),
            ..Default::default()
        }
    }

    /// Initializes a new config for an in-memory, non-persisted group.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Sets the open mode.
    ///
    /// Defaults to [`OpenMode::Default`] (single-process, read/write, no
    /// lock file).
    #[must_use]
    pub fn mode(mut self, mode: OpenMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the initial write-scratch slab size.
    ///
    /// Defaults to 4 KiB. Larger values reduce the number of slabs a
    /// write-heavy transaction has to grow through (§4.1), at the cost of
    /// over-allocating for small, short-lived groups.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is 0.
    #[must_use]
    pub fn initial_slab_size(mut self, bytes: usize) -> Self {
        assert!(bytes > 0, "initial slab size must be non-zero");
        self.initial_slab_size = bytes;
        self
    }

    /// Overrides the column B-tree fan-out used by newly created groups.
    ///
    /// Test-only: exists so tests can exercise split/collapse behavior
    /// without building arrays with thousands of entries. Never set this
    /// on a group meant to be read by another process or a future run,
    /// since the fan-out is not recorded in the file header.
    #[must_use]
    pub fn fanout_override(mut self, fanout: u64) -> Self {
        assert!(fanout >= 2, "fan-out must allow at least a two-way split");
        self.fanout_override = Some(fanout);
        self
    }
}
