// Copyright (c) 2024-present, coldb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! In-process stand-in for the cross-process reader/writer protocol (§5).
//!
//! The real protocol coordinates independent processes through a sibling
//! lock file holding `writemutex`/`readmutex` and a bounded ring buffer of
//! `ReadCount{version, count}` entries, so a writer can commit while
//! readers keep observing the top-ref that was current when they started,
//! lock-free. This crate has one process and no lock file, so `SharedGroup`
//! models the same bookkeeping with `std::sync::Mutex`:
//!
//! - `writemutex` is a real `Mutex<()>`, held for a write transaction's
//!   full duration, exactly as the protocol specifies.
//! - the reader ring buffer is a real `VecDeque<ReadCount>` guarded by its
//!   own mutex, and still drives `readlock_version` for `Group::
//!   commit_with_readlock` the same way it would from the lock file.
//! - what is *not* reproduced is lock-free concurrent reading during a
//!   live write transaction: both read and write access ultimately borrow
//!   the one in-process [`Group`] through a `Mutex`, so a reader's access
//!   blocks until a writer transaction finishes rather than observing a
//!   stale-but-consistent snapshot. See `DESIGN.md` for why this trade is
//!   taken instead of reaching for unsafe aliasing of the mapped image.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use crate::alloc::SlabAlloc;
use crate::error::Result;
use crate::group::Group;
use crate::table::Table;

/// One entry of the reader ring buffer (§5): how many active readers are
/// pinned at `version`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ReadCount {
    pub version: u64,
    pub count: u64,
}

#[derive(Default)]
struct ReaderState {
    ring: VecDeque<ReadCount>,
}

impl ReaderState {
    fn register(&mut self, version: u64) {
        match self.ring.back_mut() {
            Some(last) if last.version == version => last.count += 1,
            _ => self.ring.push_back(ReadCount { version, count: 1 }),
        }
    }

    fn unregister(&mut self, version: u64) {
        if let Some(entry) = self.ring.iter_mut().find(|e| e.version == version) {
            entry.count -= 1;
        }
        while matches!(self.ring.front(), Some(e) if e.count == 0) {
            self.ring.pop_front();
        }
    }

    /// The oldest version any registered reader is still pinned at, or
    /// `current_version + 1` if no reader is registered (§5 step 4: "or
    /// `current_version + 1` if empty").
    fn readlock_version(&self, current_version: u64) -> u64 {
        self.ring.front().map_or(current_version + 1, |e| e.version)
    }
}

/// Coordinates one [`Group`] across concurrent readers and a single writer
/// within this process (§5).
pub struct SharedGroup {
    group: Mutex<Group>,
    writemutex: Mutex<()>,
    readers: Mutex<ReaderState>,
}

impl SharedGroup {
    #[must_use]
    pub fn new(group: Group) -> Self {
        Self {
            group: Mutex::new(group),
            writemutex: Mutex::new(()),
            readers: Mutex::new(ReaderState::default()),
        }
    }

    /// Reader protocol step 1-2 (§5): registers this reader at the group's
    /// current version.
    #[must_use]
    pub fn begin_read(&self) -> ReadTransaction<'_> {
        let version = self.lock_group().version();
        self.lock_readers().register(version);
        ReadTransaction { shared: self, version }
    }

    /// Writer protocol steps 1-4 (§5): acquires `writemutex` for the
    /// duration of the returned transaction and computes `readlock_version`
    /// from the reader ring buffer.
    pub fn begin_write(&self) -> WriteTransaction<'_> {
        let write_guard = self.writemutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let group = self.lock_group();
        let readlock_version = self.lock_readers().readlock_version(group.version());

        WriteTransaction {
            shared: self,
            group,
            _write_guard: write_guard,
            readlock_version,
        }
    }

    fn lock_group(&self) -> MutexGuard<'_, Group> {
        self.group.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock_readers(&self) -> MutexGuard<'_, ReaderState> {
        self.readers.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// A pinned read-only view (§5 reader protocol). Dropping it (or calling
/// [`Self::end_read`]) is the only way to release the pin.
pub struct ReadTransaction<'a> {
    shared: &'a SharedGroup,
    version: u64,
}

impl ReadTransaction<'_> {
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn has_table(&self, name: &[u8]) -> bool {
        self.shared.lock_group().has_table(name)
    }

    #[must_use]
    pub fn get_table(&self, name: &[u8]) -> Option<Table> {
        self.shared.lock_group().get_table(name)
    }

    #[must_use]
    pub fn table_count(&self) -> u64 {
        self.shared.lock_group().table_count()
    }

    /// Reads an int cell from `table` (obtained from [`Self::get_table`] on
    /// this same transaction) as of this transaction's pinned version. Each
    /// accessor takes its own brief lock of the underlying `Group` rather
    /// than exposing `&SlabAlloc` directly, since this transaction doesn't
    /// hold the lock continuously (see the module doc comment).
    pub fn get_int(&self, table: Table, column: u64, row: u64) -> Result<i64> {
        table.get_int(self.shared.lock_group().alloc(), column, row)
    }

    /// Reads a bool cell from `table` as of this transaction's pinned version.
    pub fn get_bool(&self, table: Table, column: u64, row: u64) -> Result<bool> {
        table.get_bool(self.shared.lock_group().alloc(), column, row)
    }

    /// Reads a string cell from `table` as of this transaction's pinned version.
    pub fn get_string(&self, table: Table, column: u64, row: u64) -> Result<Vec<u8>> {
        table.get_string(self.shared.lock_group().alloc(), column, row)
    }

    /// Reads a binary cell from `table` as of this transaction's pinned version.
    pub fn get_binary(&self, table: Table, column: u64, row: u64) -> Result<Vec<u8>> {
        table.get_binary(self.shared.lock_group().alloc(), column, row)
    }

    /// Returns `table`'s row count as of this transaction's pinned version.
    #[must_use]
    pub fn row_count(&self, table: Table) -> u64 {
        table.row_count(self.shared.lock_group().alloc())
    }

    /// Ends this read transaction (reader protocol step 4). Equivalent to
    /// dropping it; provided for parity with the external API surface (§6).
    pub fn end_read(self) {}
}

impl Drop for ReadTransaction<'_> {
    fn drop(&mut self) {
        self.shared.lock_readers().unregister(self.version);
    }
}

/// An exclusive write transaction (§5 writer protocol). Mutate through the
/// forwarding methods, then call [`Self::commit`] to make the changes
/// durable and visible, or drop/[`Self::end_write`] to discard them.
pub struct WriteTransaction<'a> {
    shared: &'a SharedGroup,
    group: MutexGuard<'a, Group>,
    _write_guard: MutexGuard<'a, ()>,
    readlock_version: u64,
}

impl WriteTransaction<'_> {
    #[must_use]
    pub fn has_table(&self, name: &[u8]) -> bool {
        self.group.has_table(name)
    }

    #[must_use]
    pub fn get_table(&self, name: &[u8]) -> Option<Table> {
        self.group.get_table(name)
    }

    pub fn add_table(&mut self, name: &[u8]) -> Result<Table> {
        self.group.add_table(name)
    }

    pub fn remove_table(&mut self, name: &[u8]) -> Result<()> {
        self.group.remove_table(name)
    }

    pub fn update_table(&mut self, name: &[u8], table: Table) -> Result<()> {
        self.group.update_table(name, table)
    }

    #[must_use]
    pub fn alloc(&self) -> &SlabAlloc {
        self.group.alloc()
    }

    pub fn alloc_mut(&mut self) -> &mut SlabAlloc {
        self.group.alloc_mut()
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.group.version()
    }

    /// Runs the commit sequence (§4.5) with the `readlock_version` computed
    /// from the reader ring buffer at `begin_write` time (writer protocol
    /// steps 5-6).
    pub fn commit(mut self) -> Result<()> {
        self.group.commit_with_readlock(self.readlock_version)
    }

    /// Discards any mutations made through this transaction without
    /// committing them (§5 "Cancellation": a write is either committed or
    /// discarded by destroying the group — here, by dropping the
    /// transaction instead of calling `commit`).
    pub fn end_write(self) {}
}
