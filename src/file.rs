// Copyright (c) 2024-present, coldb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::version::Version;

/// Magic bytes stamped into every file's header, right after the top-ref
/// (see [`FileHeader`]).
pub const MAGIC_BYTES: [u8; 4] = [b'C', b'O', b'L', 1];

/// Suffix appended to a data file's path to name its sibling lock file.
pub const LOCK_FILE_SUFFIX: &str = ".lock";

/// A reference is always 8-byte aligned; every allocation in the slab
/// allocator's address space is rounded up to this boundary.
pub const ALIGNMENT: u64 = 8;

/// Total size of the file header: an 8-byte top-ref (`Group` owns reading
/// and writing this part directly, since it is also a live `Ref`) followed
/// by the 8-byte [`FileHeader`] (magic, version, padding).
pub const HEADER_SIZE: u64 = 16;

#[must_use]
pub fn round_up_to_alignment(size: u64) -> u64 {
    (size + (ALIGNMENT - 1)) & !(ALIGNMENT - 1)
}

/// The fixed 8 bytes that follow the top-ref at the start of every file:
/// [`MAGIC_BYTES`], a version byte, and 3 bytes of zero padding to keep the
/// whole 16-byte header 8-byte aligned.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FileHeader {
    pub version: Version,
}

impl Encode for FileHeader {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_all(&MAGIC_BYTES)?;
        writer.write_u8(self.version.into())?;
        writer.write_all(&[0_u8; 3])?;
        Ok(())
    }
}

impl Decode for FileHeader {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let mut magic = [0_u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC_BYTES {
            return Err(DecodeError::InvalidHeader("file magic bytes did not match"));
        }

        let raw_version = reader.read_u8()?;
        let version = Version::try_from(raw_version).map_err(|()| DecodeError::InvalidVersion)?;

        let mut padding = [0_u8; 3];
        reader.read_exact(&mut padding)?;

        Ok(Self { version })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn rounding() {
        assert_eq!(0, round_up_to_alignment(0));
        assert_eq!(8, round_up_to_alignment(1));
        assert_eq!(8, round_up_to_alignment(8));
        assert_eq!(16, round_up_to_alignment(9));
        assert_eq!(24, round_up_to_alignment(17));
    }

    #[test]
    fn header_roundtrip() {
        let header = FileHeader { version: Version::V1 };
        let bytes = header.encode_into_vec();
        assert_eq!(8, bytes.len());
        let decoded = FileHeader::decode_from(&mut &bytes[..]).expect("decode");
        assert_eq!(header, decoded);
    }

    #[test]
    fn mismatched_magic_is_rejected() {
        let mut bytes = FileHeader { version: Version::V1 }.encode_into_vec();
        bytes[0] = b'X';
        assert!(matches!(FileHeader::decode_from(&mut &bytes[..]), Err(DecodeError::InvalidHeader(_))));
    }

    #[test]
    fn unrecognized_version_byte_is_rejected() {
        let mut bytes = FileHeader { version: Version::V1 }.encode_into_vec();
        bytes[4] = 255;
        assert!(matches!(FileHeader::decode_from(&mut &bytes[..]), Err(DecodeError::InvalidVersion)));
    }
}
