//! Chunk Metadata
//!
//! This module defines the diagnostics view of a chunk - the storage unit of a
//! chunkstore stream.
//!
//! ## What is a Chunk?
//! A chunk is a fixed-capacity, append-only file holding a contiguous range of
//! a stream's byte positions. Chunks are numbered from 0 upwards; chunk `n + 1`
//! starts exactly where chunk `n` ends.
//!
//! ## Chunk Lifecycle
//! 1. Created (as a `.tmp` file, renamed once its header is durable)
//! 2. Written by the stream's single writer until full
//! 3. Sealed: a footer records the final data size and checksum
//! 4. Read by any number of consumers
//! 5. Deleted by the retention collector once policy allows
//!
//! ## ChunkInfo
//! A serialisable snapshot of one chunk for admin listings:
//! ```ignore
//! let info = ChunkInfo {
//!     number: 12,
//!     file_name: "chunk-000000012".to_string(),
//!     data_start: 3_221_225_472,
//!     data_end: 3_489_660_928,
//!     capacity: 268_435_456,
//!     completed: true,
//!     last_modified_ms: Some(1_700_000_000_000),
//! };
//! ```

use serde::{Deserialize, Serialize};

/// Point-in-time description of a chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInfo {
    /// Chunk number (also the file index)
    pub number: u64,

    /// File name within the stream directory
    pub file_name: String,

    /// Global position of the first byte in this chunk
    pub data_start: u64,

    /// Global position one past the last committed byte
    pub data_end: u64,

    /// Data region capacity in bytes
    pub capacity: u64,

    /// Whether the chunk has been sealed
    pub completed: bool,

    /// File modification time, if it could be read
    pub last_modified_ms: Option<u64>,
}

impl ChunkInfo {
    /// Committed bytes in this chunk
    pub fn data_size(&self) -> u64 {
        self.data_end - self.data_start
    }

    /// Whether `position` falls inside the committed range
    pub fn contains(&self, position: u64) -> bool {
        position >= self.data_start && position < self.data_end
    }
}
