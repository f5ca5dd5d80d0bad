// Copyright (c) 2024-present, coldb
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Header size in bytes: every array starts with exactly this many bytes
/// before its payload.
pub const HEADER_SIZE: usize = 8;

/// Top-level layout mode of an array's payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WidthType {
    /// N elements bit-packed at the declared width.
    Bits,
    /// N elements, each occupying exactly `width` whole bytes.
    Multiply,
    /// Opaque bytes; element count equals byte count (the blob payload).
    Ignore,
}

impl WidthType {
    const fn to_bits(self) -> u8 {
        match self {
            Self::Bits => 0b00,
            Self::Multiply => 0b01,
            Self::Ignore => 0b10,
        }
    }

    const fn from_bits(bits: u8) -> Self {
        match bits {
            0b00 => Self::Bits,
            0b01 => Self::Multiply,
            _ => Self::Ignore,
        }
    }
}

/// The full set of valid element widths, indexed by their stored 3-bit
/// encoding. For [`WidthType::Bits`] this is bits-per-element; for
/// [`WidthType::Multiply`] it is bytes-per-element; meaningless for
/// [`WidthType::Ignore`].
pub const WIDTHS: [u8; 8] = [0, 1, 2, 4, 8, 16, 32, 64];

#[must_use]
pub fn width_to_stored(width: u8) -> u8 {
    WIDTHS
        .iter()
        .position(|&w| w == width)
        .expect("width must be one of the 8 valid widths") as u8
}

#[must_use]
pub const fn stored_to_width(stored: u8) -> u8 {
    // (1 << stored) >> 1, yielding 0,1,2,4,8,16,32,64 for stored 0..7
    ((1_u16 << stored) >> 1) as u8
}

/// The 8-byte header preceding every array's payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// Whether this array is a B-tree inner node (vs. a leaf).
    pub is_inner: bool,
    /// Whether payload elements are themselves refs.
    pub has_refs: bool,
    pub width_type: WidthType,
    /// Decoded width: bits for `Bits`, bytes for `Multiply`, unused for
    /// `Ignore`.
    pub width: u8,
    /// Element count (24-bit).
    pub len: u32,
    /// Allocated capacity in bytes (24-bit).
    pub capacity: u32,
}

impl Header {
    #[must_use]
    pub fn encode(self) -> [u8; HEADER_SIZE] {
        let mut out = [0_u8; HEADER_SIZE];

        let stored_width = width_to_stored(self.width);

        let mut flags = 0_u8;
        if self.is_inner {
            flags |= 0b1000_0000;
        }
        if self.has_refs {
            flags |= 0b0100_0000;
        }
        flags |= self.width_type.to_bits() << 3;
        flags |= stored_width & 0b0000_0111;
        out[0] = flags;

        let len = self.len.to_be_bytes();
        out[1] = len[1];
        out[2] = len[2];
        out[3] = len[3];

        let cap = self.capacity.to_be_bytes();
        out[4] = cap[1];
        out[5] = cap[2];
        out[6] = cap[3];

        out
    }

    #[must_use]
    pub fn decode(bytes: &[u8]) -> Self {
        assert!(bytes.len() >= HEADER_SIZE, "header is truncated");

        let flags = bytes[0];
        let is_inner = flags & 0b1000_0000 != 0;
        let has_refs = flags & 0b0100_0000 != 0;
        let width_type = WidthType::from_bits((flags >> 3) & 0b0000_0011);
        let width = stored_to_width(flags & 0b0000_0111);

        let len = u32::from_be_bytes([0, bytes[1], bytes[2], bytes[3]]);
        let capacity = u32::from_be_bytes([0, bytes[4], bytes[5], bytes[6]]);

        Self {
            is_inner,
            has_refs,
            width_type,
            width,
            len,
            capacity,
        }
    }
}

impl crate::coding::Encode for Header {
    fn encode_into<W: std::io::Write>(&self, writer: &mut W) -> Result<(), crate::coding::EncodeError> {
        writer.write_all(&self.encode())?;
        Ok(())
    }
}

impl crate::coding::Decode for Header {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> Result<Self, crate::coding::DecodeError> {
        let mut bytes = [0_u8; HEADER_SIZE];
        reader.read_exact(&mut bytes)?;
        Ok(Self::decode(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn encode_decode_trait_matches_raw_methods() {
        let header = Header {
            is_inner: false,
            has_refs: true,
            width_type: WidthType::Bits,
            width: 8,
            len: 3,
            capacity: 64,
        };

        let via_trait = crate::coding::Encode::encode_into_vec(&header);
        assert_eq!(header.encode().to_vec(), via_trait);

        let decoded: Header = crate::coding::Decode::decode_from(&mut &via_trait[..]).expect("decode");
        assert_eq!(header, decoded);
    }

    #[test]
    fn width_roundtrip() {
        for &w in &WIDTHS {
            assert_eq!(w, stored_to_width(width_to_stored(w)));
        }
    }

    #[test]
    fn header_roundtrip() {
        let header = Header {
            is_inner: true,
            has_refs: true,
            width_type: WidthType::Bits,
            width: 16,
            len: 12345,
            capacity: 999_999,
        };

        let encoded = header.encode();
        let decoded = Header::decode(&encoded);
        assert_eq!(header, decoded);
    }

    #[test]
    fn header_flag_bits() {
        let header = Header {
            is_inner: false,
            has_refs: false,
            width_type: WidthType::Multiply,
            width: 4,
            len: 0,
            capacity: 0,
        };
        let encoded = header.encode();
        assert_eq!(0b0000_1011, encoded[0]);
    }
}
