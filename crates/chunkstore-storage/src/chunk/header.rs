//! Chunk header and footer encoding
//!
//! ```text
//! Header (128 bytes, at file offset 0)
//!   magic "CHNK" (4) | version (2) | reserved (2) | chunk number (8)
//!   | data start (8) | capacity (8) | created at ms (8) | CRC32 of the above (4)
//!   | zero padding
//!
//! Footer (128 bytes, at file offset HEADER_SIZE + capacity, written on seal)
//!   magic "CEND" (4) | completed flag (1) | reserved (3) | data size (8)
//!   | data CRC32 (4) | CRC32 of the above (4) | zero padding
//! ```
//!
//! Integers are big-endian. Message frames inside the data region are
//! little-endian (see `chunkstore_core::record`).

use bytes::{Buf, BufMut, BytesMut};
use chunkstore_core::{Error, Result};

pub const HEADER_SIZE: u64 = 128;
pub const FOOTER_SIZE: u64 = 128;

pub const CHUNK_MAGIC: [u8; 4] = *b"CHNK";
pub const FOOTER_MAGIC: [u8; 4] = *b"CEND";
pub const CHUNK_VERSION: u16 = 1;

const HEADER_BODY_SIZE: usize = 40;
const FOOTER_BODY_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub chunk_number: u64,
    pub data_start: u64,
    pub capacity: u64,
    pub created_at: u64,
}

impl ChunkHeader {
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE as usize);
        buf.put_slice(&CHUNK_MAGIC);
        buf.put_u16(CHUNK_VERSION);
        buf.put_u16(0);
        buf.put_u64(self.chunk_number);
        buf.put_u64(self.data_start);
        buf.put_u64(self.capacity);
        buf.put_u64(self.created_at);

        let crc = crc32fast::hash(&buf[..HEADER_BODY_SIZE]);
        buf.put_u32(crc);
        buf.put_bytes(0, HEADER_SIZE as usize - buf.len());
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE as usize {
            return Err(Error::Truncated {
                needed: HEADER_SIZE as usize,
                available: data.len(),
            });
        }
        if data[0..4] != CHUNK_MAGIC {
            return Err(Error::InvalidMagic);
        }

        let mut cursor = &data[4..];
        let version = cursor.get_u16();
        if version != CHUNK_VERSION {
            return Err(Error::InvalidHeader(format!(
                "unsupported chunk version {}",
                version
            )));
        }
        let _reserved = cursor.get_u16();
        let chunk_number = cursor.get_u64();
        let data_start = cursor.get_u64();
        let capacity = cursor.get_u64();
        let created_at = cursor.get_u64();
        let stored_crc = cursor.get_u32();

        let computed_crc = crc32fast::hash(&data[..HEADER_BODY_SIZE]);
        if stored_crc != computed_crc {
            return Err(Error::CrcMismatch {
                expected: stored_crc,
                actual: computed_crc,
            });
        }
        if capacity == 0 {
            return Err(Error::InvalidHeader("zero capacity".to_string()));
        }
        if capacity > u32::MAX as u64 {
            return Err(Error::InvalidHeader(format!(
                "capacity {} exceeds {}",
                capacity,
                u32::MAX
            )));
        }

        Ok(Self {
            chunk_number,
            data_start,
            capacity,
            created_at,
        })
    }

    /// Total file size for this chunk: header, data region and footer.
    pub fn file_size(&self) -> u64 {
        HEADER_SIZE + self.capacity + FOOTER_SIZE
    }

    /// File offset of the footer
    pub fn footer_offset(&self) -> u64 {
        HEADER_SIZE + self.capacity
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkFooter {
    pub data_size: u64,
    pub data_checksum: u32,
}

impl ChunkFooter {
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(FOOTER_SIZE as usize);
        buf.put_slice(&FOOTER_MAGIC);
        buf.put_u8(1);
        buf.put_bytes(0, 3);
        buf.put_u64(self.data_size);
        buf.put_u32(self.data_checksum);

        let crc = crc32fast::hash(&buf[..FOOTER_BODY_SIZE]);
        buf.put_u32(crc);
        buf.put_bytes(0, FOOTER_SIZE as usize - buf.len());
        buf
    }

    /// Decode a footer region.
    ///
    /// Zero-filled space (a chunk that was never sealed) yields `Ok(None)`.
    pub fn decode(data: &[u8]) -> Result<Option<Self>> {
        if data.len() < FOOTER_SIZE as usize {
            return Err(Error::Truncated {
                needed: FOOTER_SIZE as usize,
                available: data.len(),
            });
        }
        if data[..FOOTER_BODY_SIZE + 4].iter().all(|b| *b == 0) {
            return Ok(None);
        }
        if data[0..4] != FOOTER_MAGIC {
            return Err(Error::InvalidMagic);
        }

        let mut cursor = &data[4..];
        let completed = cursor.get_u8();
        cursor.advance(3);
        let data_size = cursor.get_u64();
        let data_checksum = cursor.get_u32();
        let stored_crc = cursor.get_u32();

        let computed_crc = crc32fast::hash(&data[..FOOTER_BODY_SIZE]);
        if stored_crc != computed_crc {
            return Err(Error::CrcMismatch {
                expected: stored_crc,
                actual: computed_crc,
            });
        }
        if completed != 1 {
            return Ok(None);
        }

        Ok(Some(Self {
            data_size,
            data_checksum,
        }))
    }
}
