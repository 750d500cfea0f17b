//! Error Types for chunkstore record encoding
//!
//! Errors raised while decoding message frames and chunk headers.
//!
//! ## Error Categories
//!
//! ### Framing Errors
//! - `Truncated`: The buffer ends before the frame does (torn write at the tail)
//! - `InvalidLength`: The length prefix cannot describe a valid frame
//! - `LengthMismatch`: Leading and trailing lengths disagree
//!
//! ### Data Integrity Errors
//! - `CrcMismatch`: Payload corruption detected via checksum
//! - `InvalidMagic`: A header or footer does not start with its magic bytes
//! - `InvalidHeader`: A header decoded but carries impossible values
//!
//! ## Usage
//! All decoding functions return `Result<T>` which is aliased to `Result<T, Error>`.
//! The storage crate wraps this error so `?` works across the crate boundary.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("Truncated frame: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("Invalid frame length: {0}")]
    InvalidLength(u32),

    #[error("Frame length mismatch: leading {leading}, trailing {trailing}")]
    LengthMismatch { leading: u32, trailing: u32 },

    #[error("CRC mismatch: expected {expected:#010x}, computed {actual:#010x}")]
    CrcMismatch { expected: u32, actual: u32 },

    #[error("Invalid magic bytes")]
    InvalidMagic,

    #[error("Invalid header: {0}")]
    InvalidHeader(String),
}

pub type Result<T> = std::result::Result<T, Error>;
