//! Transfer file headers.
//!
//! Every transfer file starts with a 64-byte big-endian primary header followed by an 84-byte
//! little-endian secondary header, then `byte_count` payload bytes.

use std::io::{self, Cursor, Read};
use std::time::{SystemTime, UNIX_EPOCH};

use memmgr_core::{AddressSpec, CrcAlgorithm, MemoryType, MemoryWidth, MAX_SYM_LEN};
use serde::Serialize;
use thiserror::Error;

use crate::io::{ReadWireExt, WriteWireExt};

/// Content type tag, ASCII `cFE1`.
pub const FILE_CONTENT_TYPE: u32 = 0x6346_4531;
pub const PRIMARY_HEADER_BYTES: usize = 64;
pub const SECONDARY_HEADER_BYTES: usize = 84;
/// Offset of the payload.
pub const FILE_HEADER_BYTES: usize = PRIMARY_HEADER_BYTES + SECONDARY_HEADER_BYTES;

const DESCRIPTION_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("truncated header: {0}")]
    Truncated(#[from] io::Error),

    #[error("bad content type 0x{0:08x}")]
    BadContentType(u32),

    #[error("primary header length {0} is not {PRIMARY_HEADER_BYTES}")]
    BadLength(u32),

    #[error("symbol name is not valid UTF-8")]
    BadSymbolName,

    #[error("unknown memory type code {0}")]
    BadMemoryType(u8),

    #[error("unknown memory width code {0}")]
    BadWidth(u8),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrimaryHeader {
    pub content_type: u32,
    pub sub_type: u32,
    pub length: u32,
    pub spacecraft_id: u32,
    pub processor_id: u32,
    pub application_id: u32,
    pub time_seconds: u32,
    pub time_subseconds: u32,
    pub description: String,
}

impl PrimaryHeader {
    /// Header stamped with the current time.
    pub fn new(sub_type: u32, description: &str) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            content_type: FILE_CONTENT_TYPE,
            sub_type,
            length: PRIMARY_HEADER_BYTES as u32,
            spacecraft_id: 0,
            processor_id: 0,
            application_id: 0,
            time_seconds: now.as_secs() as u32,
            // Subseconds are in units of 2^-32 s.
            time_subseconds: ((u64::from(now.subsec_nanos()) << 32) / 1_000_000_000) as u32,
            description: description.to_string(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PRIMARY_HEADER_BYTES);
        // Writes into a Vec cannot fail.
        let _ = self.encode_into(&mut out);
        out
    }

    fn encode_into(&self, out: &mut Vec<u8>) -> io::Result<()> {
        out.write_u32_be(self.content_type)?;
        out.write_u32_be(self.sub_type)?;
        out.write_u32_be(self.length)?;
        out.write_u32_be(self.spacecraft_id)?;
        out.write_u32_be(self.processor_id)?;
        out.write_u32_be(self.application_id)?;
        out.write_u32_be(self.time_seconds)?;
        out.write_u32_be(self.time_subseconds)?;
        out.write_padded_str(&self.description, DESCRIPTION_BYTES)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, HeaderError> {
        let mut r = Cursor::new(bytes);
        let header = Self {
            content_type: r.read_u32_be()?,
            sub_type: r.read_u32_be()?,
            length: r.read_u32_be()?,
            spacecraft_id: r.read_u32_be()?,
            processor_id: r.read_u32_be()?,
            application_id: r.read_u32_be()?,
            time_seconds: r.read_u32_be()?,
            time_subseconds: r.read_u32_be()?,
            description: String::from_utf8_lossy(&r.read_padded(DESCRIPTION_BYTES)?).into_owned(),
        };
        if header.content_type != FILE_CONTENT_TYPE {
            return Err(HeaderError::BadContentType(header.content_type));
        }
        if header.length != PRIMARY_HEADER_BYTES as u32 {
            return Err(HeaderError::BadLength(header.length));
        }
        Ok(header)
    }
}

/// Describes the payload: where it came from, how it was read and its checksum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecondaryHeader {
    pub address: AddressSpec,
    pub mem_type: MemoryType,
    pub width: MemoryWidth,
    pub byte_count: u32,
    /// Raw algorithm tag; unknown tags are rejected when the payload is validated.
    pub crc_algorithm: u8,
    pub crc: u32,
}

impl SecondaryHeader {
    pub fn new(address: AddressSpec, mem_type: MemoryType, width: MemoryWidth, byte_count: u32) -> Self {
        Self {
            address,
            mem_type,
            width,
            byte_count,
            crc_algorithm: CrcAlgorithm::Crc16.code(),
            crc: 0,
        }
    }

    pub fn crc_algorithm(&self) -> Option<CrcAlgorithm> {
        CrcAlgorithm::from_code(self.crc_algorithm)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SECONDARY_HEADER_BYTES);
        let _ = self.encode_into(&mut out);
        out
    }

    fn encode_into(&self, out: &mut Vec<u8>) -> io::Result<()> {
        out.write_padded_str(self.address.symbol_name(), MAX_SYM_LEN)?;
        out.write_u64_le(self.address.offset)?;
        out.write_u8(self.mem_type.code())?;
        out.write_u8(self.width.code())?;
        out.write_u8(self.crc_algorithm)?;
        out.write_u8(0)?;
        out.write_u32_le(self.byte_count)?;
        out.write_u32_le(self.crc)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, HeaderError> {
        let mut r = Cursor::new(bytes);
        let name = String::from_utf8(r.read_padded(MAX_SYM_LEN)?)
            .map_err(|_| HeaderError::BadSymbolName)?;
        let offset = r.read_u64_le()?;
        let type_code = r.read_u8()?;
        let width_code = r.read_u8()?;
        let crc_algorithm = r.read_u8()?;
        let _reserved = r.read_u8()?;
        let byte_count = r.read_u32_le()?;
        let crc = r.read_u32_le()?;

        Ok(Self {
            address: AddressSpec::symbol(name, offset),
            mem_type: MemoryType::from_code(type_code).ok_or(HeaderError::BadMemoryType(type_code))?,
            width: MemoryWidth::from_code(width_code).ok_or(HeaderError::BadWidth(width_code))?,
            byte_count,
            crc_algorithm,
            crc,
        })
    }
}

/// Reads and validates both headers from the start of `reader`.
pub fn read_headers<R: Read + ?Sized>(reader: &mut R) -> Result<(PrimaryHeader, SecondaryHeader), HeaderError> {
    let mut primary = [0u8; PRIMARY_HEADER_BYTES];
    reader.read_exact(&mut primary)?;
    let mut secondary = [0u8; SECONDARY_HEADER_BYTES];
    reader.read_exact(&mut secondary)?;
    Ok((PrimaryHeader::decode(&primary)?, SecondaryHeader::decode(&secondary)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_sizes_are_fixed() {
        let primary = PrimaryHeader::new(0x4D4D, "a description longer than thirty-two bytes");
        assert_eq!(primary.encode().len(), PRIMARY_HEADER_BYTES);
        assert_eq!(&primary.encode()[..4], b"cFE1");

        let secondary = SecondaryHeader::new(
            AddressSpec::symbol("x".repeat(80), 4),
            MemoryType::Volatile,
            MemoryWidth::Bits16,
            64,
        );
        assert_eq!(secondary.encode().len(), SECONDARY_HEADER_BYTES);
    }

    #[test]
    fn secondary_layout_is_little_endian() {
        let mut header = SecondaryHeader::new(
            AddressSpec::symbol("tbl", 0x10),
            MemoryType::Durable,
            MemoryWidth::Bits32,
            0x0102_0304,
        );
        header.crc = 0xBB3D;
        let bytes = header.encode();
        assert_eq!(&bytes[..4], b"tbl\0");
        assert_eq!(bytes[64], 0x10);
        assert_eq!(&bytes[72..76], [2, 3, 2, 0]);
        assert_eq!(&bytes[76..80], [0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&bytes[80..84], [0x3D, 0xBB, 0, 0]);

        let decoded = SecondaryHeader::decode(&bytes).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.crc_algorithm(), Some(CrcAlgorithm::Crc16));
    }

    #[test]
    fn rejects_foreign_and_malformed_headers() {
        let mut primary = PrimaryHeader::new(1, "x").encode();
        primary[0] = b'X';
        assert!(matches!(
            PrimaryHeader::decode(&primary),
            Err(HeaderError::BadContentType(_))
        ));

        let mut primary = PrimaryHeader::new(1, "x").encode();
        primary[11] = 63;
        assert!(matches!(PrimaryHeader::decode(&primary), Err(HeaderError::BadLength(63))));

        let mut secondary = SecondaryHeader::new(
            AddressSpec::absolute(0),
            MemoryType::Volatile,
            MemoryWidth::Bits8,
            1,
        )
        .encode();
        secondary[73] = 9;
        assert!(matches!(
            SecondaryHeader::decode(&secondary),
            Err(HeaderError::BadWidth(9))
        ));

        assert!(matches!(
            SecondaryHeader::decode(&secondary[..40]),
            Err(HeaderError::Truncated(_))
        ));
    }
}
