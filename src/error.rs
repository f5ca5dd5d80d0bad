// Copyright (c) 2024-present, coldb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{DecodeError, EncodeError};

/// Represents errors that can occur while operating on a [`crate::Group`].
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// Serialization failed
    Encode(EncodeError),

    /// Deserialization failed
    Decode(DecodeError),

    /// File header's version byte did not match a known [`crate::version::Version`]
    InvalidVersion(u8),

    /// The mapped file's length is not a multiple of 8, or its top-ref points
    /// outside the file
    InvalidFile,

    /// The allocator could not satisfy an allocation request
    OutOfMemory,

    /// A caller tried to add a column to a table that already has rows
    SchemaChangeOnNonEmptyTable,

    /// A caller accessed a column as the wrong type (e.g. `get_subtable` on a
    /// non-subtable column)
    ColumnTypeMismatch,

    /// A caller referenced a column or table that does not exist
    NoSuchColumn,

    /// A caller referenced a table that does not exist
    NoSuchTable,

    /// An operation was attempted on a `Group` that failed to open
    InvalidGroup,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ColDbError: {self:?}")
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        Self::Encode(value)
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

/// Group result
pub type Result<T> = std::result::Result<T, Error>;
