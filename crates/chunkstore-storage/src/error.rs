//! Storage Error Types
//!
//! This module defines all error types that can occur during chunk storage operations.
//!
//! ## Error Categories
//!
//! ### Missing Data
//! - `ChunkFileNotExist`: A segment file expected on disk is gone
//! - `ChunkNotExist`: No in-memory chunk holds the requested position
//!   (already deleted by retention, or past the end of the stream)
//! - `ChunkNumberNotExist`: No in-memory chunk has the requested number
//!
//! ### Write Errors
//! - `ChunkWrite`: An append failed; the chunk's data end did not move
//! - `StreamClosed`: The stream was shut down before the append arrived
//!
//! ### Integrity Errors
//! - `CorruptChunk`: Header/footer damage, filename mismatch, or a gap in the
//!   chunk sequence found during recovery
//! - `Record`: A message frame failed to decode
//!
//! ### Usage Errors
//! - `InvalidArgument`: Rejected input (index too wide, zero policy limits)
//! - `ChunkNotRemovable`: Removal of the active chunk or of a chunk that is not
//!   the oldest one
//! - `Config`: Invalid or unreadable configuration
//!
//! ## Usage
//!
//! All storage operations return `Result<T>` which is aliased to
//! `Result<T, Error>`. Errors propagate unchanged to the broker layer; only the
//! retention collector swallows (and logs) per-chunk failures.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Chunk file not found: {}", .0.display())]
    ChunkFileNotExist(PathBuf),

    #[error("No chunk holds position {position} (readable range {start}..{end})")]
    ChunkNotExist { position: u64, start: u64, end: u64 },

    #[error("Chunk {0} not found")]
    ChunkNumberNotExist(u64),

    #[error("Chunk {chunk} write failed: {reason}")]
    ChunkWrite { chunk: u64, reason: String },

    #[error("Chunk {chunk} cannot be removed: {reason}")]
    ChunkNotRemovable { chunk: u64, reason: String },

    #[error("Corrupt chunk {}: {reason}", .path.display())]
    CorruptChunk { path: PathBuf, reason: String },

    #[error("Stream closed: {0}")]
    StreamClosed(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Record error: {0}")]
    Record(#[from] chunkstore_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error means "that offset is gone, resynchronise".
    pub fn is_position_unavailable(&self) -> bool {
        matches!(
            self,
            Error::ChunkNotExist { .. } | Error::ChunkNumberNotExist(_)
        )
    }
}
