//! Message Frame Format
//!
//! This module defines how a single message is laid out inside a chunk's data
//! region, and the decoded `MessageRecord` handed back to readers.
//!
//! ## Frame Layout
//!
//! ```text
//! ┌────────────┬───────────┬──────────────┬──────────┬────────────┐
//! │ Length     │ CRC32     │ Timestamp    │ Payload  │ Length     │
//! │ (4 bytes)  │ (4 bytes) │ (8 bytes)    │ (N bytes)│ (4 bytes)  │
//! └────────────┴───────────┴──────────────┴──────────┴────────────┘
//! ```
//!
//! - `Length` is `8 + N` (timestamp plus payload), little-endian, written both
//!   before and after the body so a frame can be validated on its own.
//! - `CRC32` covers timestamp and payload.
//!
//! A zero leading length never describes a frame: preallocated chunk files are
//! zero-filled, so recovery stops scanning at the first zero length.
//!
//! ## Example
//! ```ignore
//! let frame = encode_frame(1_700_000_000_000, b"hello");
//! let decoded = decode_frame(&frame)?;
//! assert_eq!(decoded.payload.as_ref(), b"hello");
//! assert_eq!(decoded.frame_len, frame.len());
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Bytes a frame adds on top of its payload.
pub const FRAME_OVERHEAD: usize = 4 + 4 + 8 + 4;

/// Largest payload a single frame may carry.
pub const MAX_PAYLOAD_SIZE: usize = (u32::MAX as usize) - FRAME_OVERHEAD;

const LENGTH_SIZE: usize = 4;
const CRC_SIZE: usize = 4;
const TIMESTAMP_SIZE: usize = 8;

/// A message read back from a stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Global position of the frame within its stream
    pub position: u64,

    /// Store timestamp in milliseconds since epoch
    pub timestamp: u64,

    /// Opaque message body
    pub payload: Bytes,
}

impl MessageRecord {
    pub fn new(position: u64, timestamp: u64, payload: Bytes) -> Self {
        Self {
            position,
            timestamp,
            payload,
        }
    }

    /// Size of this record once framed on disk
    pub fn frame_len(&self) -> usize {
        frame_len(self.payload.len())
    }

    /// Position of the frame that follows this one
    pub fn next_position(&self) -> u64 {
        self.position + self.frame_len() as u64
    }
}

/// A frame decoded from raw bytes, before a position is attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub timestamp: u64,
    pub payload: Bytes,
    /// Total bytes the frame occupies, overhead included
    pub frame_len: usize,
}

/// Total on-disk size of a frame carrying `payload_len` bytes.
pub fn frame_len(payload_len: usize) -> usize {
    payload_len + FRAME_OVERHEAD
}

fn checksum(timestamp: u64, payload: &[u8]) -> u32 {
    let mut crc = crc32fast::Hasher::new();
    crc.update(&timestamp.to_le_bytes());
    crc.update(payload);
    crc.finalize()
}

/// Encode a payload into a frame.
///
/// Callers must keep `payload.len()` at or below [`MAX_PAYLOAD_SIZE`]; chunk
/// capacities are validated far below that bound.
pub fn encode_frame(timestamp: u64, payload: &[u8]) -> Bytes {
    let body_len = (TIMESTAMP_SIZE + payload.len()) as u32;
    let mut buf = BytesMut::with_capacity(frame_len(payload.len()));

    buf.put_u32_le(body_len);
    buf.put_u32_le(checksum(timestamp, payload));
    buf.put_u64_le(timestamp);
    buf.put_slice(payload);
    buf.put_u32_le(body_len);

    buf.freeze()
}

/// Read the total frame length announced by the leading length field.
///
/// Returns `Ok(None)` when the length is zero (unwritten, zero-filled space).
pub fn peek_frame_len(buf: &[u8]) -> Result<Option<usize>> {
    if buf.len() < LENGTH_SIZE {
        return Err(Error::Truncated {
            needed: LENGTH_SIZE,
            available: buf.len(),
        });
    }

    let body_len = read_u32(buf, 0);
    if body_len == 0 {
        return Ok(None);
    }
    if (body_len as usize) < TIMESTAMP_SIZE {
        return Err(Error::InvalidLength(body_len));
    }

    Ok(Some(body_len as usize + LENGTH_SIZE + CRC_SIZE + LENGTH_SIZE))
}

/// Decode the frame at the start of `buf`.
///
/// Trailing bytes after the frame are ignored; `frame_len` tells the caller
/// where the next frame begins.
pub fn decode_frame(buf: &[u8]) -> Result<DecodedFrame> {
    let total = peek_frame_len(buf)?.ok_or(Error::InvalidLength(0))?;
    if buf.len() < total {
        return Err(Error::Truncated {
            needed: total,
            available: buf.len(),
        });
    }

    let leading = read_u32(buf, 0);
    let trailing = read_u32(buf, total - LENGTH_SIZE);
    if leading != trailing {
        return Err(Error::LengthMismatch { leading, trailing });
    }

    let expected = read_u32(buf, LENGTH_SIZE);
    let body_start = LENGTH_SIZE + CRC_SIZE;
    let timestamp = read_u64(buf, body_start);
    let payload = &buf[body_start + TIMESTAMP_SIZE..total - LENGTH_SIZE];

    let actual = checksum(timestamp, payload);
    if expected != actual {
        return Err(Error::CrcMismatch { expected, actual });
    }

    Ok(DecodedFrame {
        timestamp,
        payload: Bytes::copy_from_slice(payload),
        frame_len: total,
    })
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(raw)
}

fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(raw)
}
