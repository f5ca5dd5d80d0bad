// Copyright (c) 2024-present, coldb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! An embedded, single-writer, memory-mapped columnar storage engine.
//!
//! ##### About
//!
//! A [`Group`] is the root object over one data file (or in-memory buffer):
//! a set of named [`Table`]s, each a column-oriented B-tree of typed rows.
//! Every mutator is copy-on-write and returns the handle the caller must
//! write back into its parent; nothing is durable until [`Group::commit`]
//! flattens the dirty subtree into the backing store and publishes a new
//! top-ref with two `fsync` barriers (§4.5 of the design notes in
//! `DESIGN.md`).
//!
//! Concurrent readers keep working against the top-ref that was current
//! when they started, even while a writer commits a new one — see
//! [`shared::SharedGroup`] for the in-process stand-in for the
//! cross-process reader/writer protocol.
//!
//! # Example usage
//!
//! ```
//! use coldb::{ColumnType, Group};
//!
//! let mut group = Group::open_buffer(Vec::new())?;
//! let version = group.version();
//!
//! let mut people = group.add_table(b"people")?;
//! people = people.add_column(group.alloc_mut(), b"age", ColumnType::Int, version)?;
//! people = people.insert_row(group.alloc_mut(), version)?;
//! people = people.set_int(group.alloc_mut(), 0, 0, 42, version)?;
//! group.update_table(b"people", people)?;
//!
//! group.commit()?;
//!
//! let people = group.get_table(b"people").expect("just committed");
//! assert_eq!(42, people.get_int(group.alloc(), 0, 0)?);
//! # Ok::<(), coldb::Error>(())
//! ```

#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]
#![allow(clippy::option_if_let_else)]
// Unlike the teacher, this crate cannot `#![forbid(unsafe_code)]`: the
// slab allocator's read-only image is a memory map (`alloc::image`). Every
// unsafe block there carries a `#[expect(unsafe_code, ...)]` with its own
// safety justification instead.
#![deny(unsafe_code)]

pub mod alloc;
pub mod array;
mod coding;
pub mod column;
mod config;
mod error;
#[doc(hidden)]
pub mod file;
mod group;
pub mod refs;
mod schema;
pub mod shared;
mod table;
mod version;

pub use alloc::SlabAlloc;
pub use column::{Column, ColumnType, MixedValue};
pub use config::{Backing, Config, OpenMode};
pub use error::{Error, Result};
pub use group::Group;
pub use schema::Schema;
pub use shared::SharedGroup;
pub use table::Table;
pub use version::Version;
