//! Chunk Manager
//!
//! This module implements `ChunkManager`, which owns the ordered chunks of one
//! stream (a topic queue) and serves appends and reads against them.
//!
//! ## What Does ChunkManager Do?
//!
//! - Rediscovers chunk files on startup and rebuilds the chunk list
//! - Appends message frames to the active (last) chunk
//! - Rolls to a new chunk when the active one is full
//! - Resolves a global position to a `(chunk, offset)` pair for reads
//! - Detaches and deletes the oldest chunks on behalf of retention
//!
//! ## Architecture
//!
//! ```text
//! global position   0          4096         8192        9000
//!                   │          │            │           │
//!                   ▼          ▼            ▼           ▼
//!                   ┌──────────┬────────────┬───────────┐
//!                   │ chunk 0  │ chunk 1    │ chunk 2   │ ← appends
//!                   │ completed│ completed  │ active    │
//!                   └──────────┴────────────┴───────────┘
//!                   ▲
//!                   └─ retention removes from the front only
//! ```
//!
//! Chunk `n + 1` always starts at chunk `n`'s data end, so positions stay
//! contiguous across files and strictly increase for the life of the stream.
//!
//! ## Thread Safety
//!
//! - Appends are serialised by a writer mutex; rollover (seal + allocate)
//!   happens entirely under it.
//! - The chunk list is a `RwLock<Vec<Arc<Chunk>>>`. Readers clone the `Arc` they
//!   need and release the lock before any file IO.
//! - Removal takes the list write lock only to detach a chunk; the file is
//!   deleted after the lock is released.
//!
//! ## Usage
//!
//! ```ignore
//! use chunkstore_storage::{ChunkManager, FileNamingStrategy};
//!
//! let manager = ChunkManager::open(
//!     "orders/0",
//!     "./data/orders/0",
//!     FileNamingStrategy::default(),
//!     64 * 1024 * 1024,
//! )?;
//!
//! let result = manager.append(b"hello")?;
//! let record = manager.read_message(result.position)?;
//! assert_eq!(record.payload.as_ref(), b"hello");
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Bytes, BytesMut};
use chunkstore_core::{encode_frame, frame_len, ChunkInfo, MessageRecord};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chunk::Chunk;
use crate::config::StorageConfig;
use crate::error::{Error, Result};
use crate::metrics;
use crate::naming::FileNamingStrategy;

/// Where an appended message landed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AppendResult {
    /// Global position of the message frame
    pub position: u64,
    /// Chunk that holds it
    pub chunk_number: u64,
    /// Framed size on disk
    pub size: u64,
}

struct WriterState {
    closed: bool,
}

/// Ordered chunks of one stream
pub struct ChunkManager {
    name: String,
    directory: PathBuf,
    naming: FileNamingStrategy,
    chunk_capacity: u64,
    chunks: RwLock<Vec<Arc<Chunk>>>,
    writer: Mutex<WriterState>,
}

impl std::fmt::Debug for ChunkManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkManager")
            .field("name", &self.name)
            .field("directory", &self.directory)
            .field("chunk_capacity", &self.chunk_capacity)
            .field("chunk_count", &self.chunk_count())
            .finish()
    }
}

impl ChunkManager {
    /// Open the stream stored in `directory`, recovering any existing chunks.
    ///
    /// ## Recovery
    ///
    /// 1. Delete `.tmp` files left by interrupted chunk creations
    /// 2. Reopen chunk files in name order; numbers must be consecutive and
    ///    each chunk must start where the previous one ends
    /// 3. Seal every chunk but the last
    /// 4. Resume on the last chunk, or allocate a fresh one if it is completed
    ///    (or if the directory holds no chunks at all)
    pub fn open(
        name: impl Into<String>,
        directory: impl Into<PathBuf>,
        naming: FileNamingStrategy,
        chunk_capacity: u64,
    ) -> Result<Self> {
        let name = name.into();
        let directory = directory.into();

        if chunk_capacity < StorageConfig::MIN_CHUNK_CAPACITY || chunk_capacity > u32::MAX as u64 {
            return Err(Error::InvalidArgument(format!(
                "chunk capacity {} outside {}..={}",
                chunk_capacity,
                StorageConfig::MIN_CHUNK_CAPACITY,
                u32::MAX
            )));
        }

        std::fs::create_dir_all(&directory)?;

        for temp in naming.temp_files(&directory)? {
            warn!(
                stream = %name,
                path = ?temp,
                "Removing incomplete chunk file left by a crash"
            );
            match std::fs::remove_file(&temp) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        let mut chunks: Vec<Arc<Chunk>> = Vec::new();
        for path in naming.chunk_files(&directory)? {
            let number = file_index(&naming, &path)?;
            let chunk = Chunk::open(&path, number)?;

            if let Some(prev) = chunks.last() {
                if number != prev.number() + 1 {
                    return Err(Error::CorruptChunk {
                        path,
                        reason: format!("chunk {} follows chunk {}", number, prev.number()),
                    });
                }
                if chunk.data_start() != prev.data_end() {
                    return Err(Error::CorruptChunk {
                        path,
                        reason: format!(
                            "data start {} does not match previous data end {}",
                            chunk.data_start(),
                            prev.data_end()
                        ),
                    });
                }
                if !prev.is_completed() {
                    warn!(
                        stream = %name,
                        chunk = prev.number(),
                        "Sealing unsealed chunk found before the last chunk"
                    );
                    // Keep the age by-time retention sees
                    let modified = prev.last_modified()?;
                    prev.seal()?;
                    if let Err(e) = prev.set_last_modified(modified) {
                        warn!(
                            stream = %name,
                            chunk = prev.number(),
                            error = %e,
                            "Failed to restore modified time after sealing"
                        );
                    }
                }
            }

            chunks.push(Arc::new(chunk));
        }

        let manager = Self {
            name,
            directory,
            naming,
            chunk_capacity,
            chunks: RwLock::new(Vec::new()),
            writer: Mutex::new(WriterState { closed: false }),
        };

        let recovered = chunks.len();
        let next = match chunks.last() {
            None => Some((0, 0)),
            Some(last) if last.is_completed() => Some((last.number() + 1, last.data_end())),
            Some(_) => None,
        };
        if let Some((number, data_start)) = next {
            let chunk = Chunk::create(
                &manager.naming,
                &manager.directory,
                number,
                data_start,
                manager.chunk_capacity,
            )?;
            chunks.push(Arc::new(chunk));
        }

        *manager.chunks.write() = chunks;

        info!(
            stream = %manager.name,
            directory = ?manager.directory,
            recovered_chunks = recovered,
            start_position = manager.start_position(),
            end_position = manager.end_position(),
            "Stream opened"
        );

        Ok(manager)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn chunk_capacity(&self) -> u64 {
        self.chunk_capacity
    }

    /// Append a payload stamped with the current time.
    pub fn append(&self, payload: &[u8]) -> Result<AppendResult> {
        self.append_with_timestamp(now_ms(), payload)
    }

    /// Append a payload with an explicit store timestamp.
    ///
    /// If the active chunk cannot hold the frame, it is sealed, the next chunk
    /// is allocated at its data end, and the append is retried once there.
    pub fn append_with_timestamp(&self, timestamp: u64, payload: &[u8]) -> Result<AppendResult> {
        let writer = self.writer.lock();
        if writer.closed {
            return Err(Error::StreamClosed(self.name.clone()));
        }

        let mut active = self.active_chunk();
        let size = frame_len(payload.len()) as u64;
        if size > self.chunk_capacity {
            return Err(Error::ChunkWrite {
                chunk: active.number(),
                reason: format!(
                    "message of {} bytes exceeds chunk capacity {}",
                    size, self.chunk_capacity
                ),
            });
        }

        if active.is_completed() || active.remaining() < size {
            active = self.roll(&active)?;
        }

        let frame = encode_frame(timestamp, payload);
        let offset = active.append(&frame)?;
        let result = AppendResult {
            position: active.data_start() + offset,
            chunk_number: active.number(),
            size,
        };

        metrics::APPENDED_MESSAGES_TOTAL
            .with_label_values(&[&self.name])
            .inc();
        metrics::APPENDED_BYTES_TOTAL
            .with_label_values(&[&self.name])
            .inc_by(size);

        if active.remaining() == 0 {
            // Full: roll now; a failure here is retried by the next append
            if let Err(e) = self.roll(&active) {
                warn!(
                    stream = %self.name,
                    chunk = active.number(),
                    error = %e,
                    "Eager rollover of full chunk failed"
                );
            }
        }

        drop(writer);
        Ok(result)
    }

    /// Seal `active` and allocate its successor. Caller holds the writer lock.
    fn roll(&self, active: &Arc<Chunk>) -> Result<Arc<Chunk>> {
        active.seal()?;

        let next = Arc::new(Chunk::create(
            &self.naming,
            &self.directory,
            active.number() + 1,
            active.data_end(),
            self.chunk_capacity,
        )?);
        self.chunks.write().push(Arc::clone(&next));

        metrics::CHUNKS_ROLLED_TOTAL
            .with_label_values(&[&self.name])
            .inc();

        info!(
            stream = %self.name,
            sealed = active.number(),
            active = next.number(),
            data_start = next.data_start(),
            "Chunk rolled"
        );

        Ok(next)
    }

    /// The chunk appends currently go to.
    pub fn active_chunk(&self) -> Arc<Chunk> {
        let chunks = self.chunks.read();
        // open() always leaves one chunk and remove() never takes the last
        Arc::clone(&chunks[chunks.len() - 1])
    }

    /// All chunks, ascending by chunk number.
    pub fn chunks(&self) -> Vec<Arc<Chunk>> {
        self.chunks.read().clone()
    }

    /// Leading completed chunks, excluding the active one.
    ///
    /// This is the only range retention may delete from.
    pub fn sealed_prefix(&self) -> Vec<Arc<Chunk>> {
        let chunks = self.chunks.read();
        let (_, older) = match chunks.split_last() {
            Some(split) => split,
            None => return Vec::new(),
        };
        older
            .iter()
            .take_while(|c| c.is_completed())
            .cloned()
            .collect()
    }

    pub fn get_chunk(&self, number: u64) -> Result<Arc<Chunk>> {
        let chunks = self.chunks.read();
        let first = chunks.first().map(|c| c.number()).unwrap_or(0);
        number
            .checked_sub(first)
            .and_then(|idx| chunks.get(idx as usize))
            .cloned()
            .ok_or(Error::ChunkNumberNotExist(number))
    }

    pub fn chunk_infos(&self) -> Vec<ChunkInfo> {
        self.chunks().iter().map(|c| c.info()).collect()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.read().len()
    }

    /// Global position of the oldest retained byte
    pub fn start_position(&self) -> u64 {
        self.chunks
            .read()
            .first()
            .map(|c| c.data_start())
            .unwrap_or(0)
    }

    /// Global position the next append will be written at (unless it rolls)
    pub fn end_position(&self) -> u64 {
        self.chunks
            .read()
            .last()
            .map(|c| c.data_end())
            .unwrap_or(0)
    }

    /// Find the chunk whose `[data_start, data_end)` holds `position`.
    ///
    /// Returns the chunk and the offset of `position` within it.
    pub fn resolve(&self, position: u64) -> Result<(Arc<Chunk>, u64)> {
        let chunks = self.chunks.read();
        let idx = chunks.partition_point(|c| c.data_end() <= position);

        match chunks.get(idx) {
            Some(chunk) if chunk.contains(position) => {
                Ok((Arc::clone(chunk), position - chunk.data_start()))
            }
            _ => Err(Error::ChunkNotExist {
                position,
                start: chunks.first().map(|c| c.data_start()).unwrap_or(0),
                end: chunks.last().map(|c| c.data_end()).unwrap_or(0),
            }),
        }
    }

    /// Read up to `max_len` committed bytes starting at `position`, crossing
    /// chunk boundaries as needed. Reading at the end position returns empty.
    pub fn read_at(&self, position: u64, max_len: u64) -> Result<Bytes> {
        let end = self.end_position();
        if position == end {
            return Ok(Bytes::new());
        }
        if position > end {
            return Err(self.past_end(position, end));
        }

        let limit = position.saturating_add(max_len).min(end);
        let mut buf = BytesMut::with_capacity((limit - position) as usize);
        let mut cursor = position;
        while cursor < limit {
            let (chunk, offset) = self.resolve(cursor)?;
            let len = chunk.data_end().min(limit) - cursor;
            buf.extend_from_slice(&chunk.read_at(offset, len)?);
            cursor += len;
        }

        Ok(buf.freeze())
    }

    fn past_end(&self, position: u64, end: u64) -> Error {
        Error::ChunkNotExist {
            position,
            start: self.start_position(),
            end,
        }
    }

    /// Decode the message at `position`.
    pub fn read_message(&self, position: u64) -> Result<MessageRecord> {
        let (chunk, offset) = self.resolve(position)?;
        chunk.read_record(offset)
    }

    /// Decode up to `max_count` consecutive messages starting at `position`.
    /// Reading at the end position returns an empty list.
    pub fn read_messages(&self, position: u64, max_count: usize) -> Result<Vec<MessageRecord>> {
        let end = self.end_position();
        let mut records = Vec::new();
        let mut cursor = position;

        if cursor == end {
            return Ok(records);
        }
        if cursor > end {
            return Err(self.past_end(position, end));
        }

        while records.len() < max_count && cursor < end {
            let record = self.read_message(cursor)?;
            cursor = record.next_position();
            records.push(record);
        }

        debug!(
            stream = %self.name,
            position,
            count = records.len(),
            "Read messages"
        );

        Ok(records)
    }

    /// Detach `chunk` from the list and delete its file.
    ///
    /// Only the oldest chunk may be removed, and only once it is completed and
    /// no longer the active chunk. Once detached a chunk is never re-added, even
    /// if deleting the file fails.
    pub fn remove(&self, chunk: &Chunk) -> Result<()> {
        let removed = {
            let mut chunks = self.chunks.write();
            let idx = chunks
                .iter()
                .position(|c| c.number() == chunk.number())
                .ok_or(Error::ChunkNumberNotExist(chunk.number()))?;

            if idx + 1 == chunks.len() {
                return Err(Error::ChunkNotRemovable {
                    chunk: chunk.number(),
                    reason: "chunk is active".to_string(),
                });
            }
            if idx != 0 {
                return Err(Error::ChunkNotRemovable {
                    chunk: chunk.number(),
                    reason: format!("chunk {} is older", chunks[0].number()),
                });
            }
            if !chunks[0].is_completed() {
                return Err(Error::ChunkNotRemovable {
                    chunk: chunk.number(),
                    reason: "chunk is not completed".to_string(),
                });
            }

            chunks.remove(0)
        };

        match std::fs::remove_file(removed.path()) {
            Ok(()) => {
                metrics::CHUNKS_DELETED_TOTAL
                    .with_label_values(&[&self.name])
                    .inc();
                info!(
                    stream = %self.name,
                    chunk = removed.number(),
                    data_start = removed.data_start(),
                    data_end = removed.data_end(),
                    "Chunk deleted"
                );
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    stream = %self.name,
                    chunk = removed.number(),
                    path = ?removed.path(),
                    "Chunk file already gone"
                );
                Err(Error::ChunkFileNotExist(removed.path().to_path_buf()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Wait for the in-flight append, seal the active chunk and reject
    /// further appends.
    ///
    /// An empty active chunk is left unsealed so the next `open` resumes it
    /// instead of allocating another chunk.
    pub fn close(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        if writer.closed {
            return Ok(());
        }
        writer.closed = true;

        let active = self.active_chunk();
        if active.data_size() > 0 {
            active.seal()?;
        }

        info!(
            stream = %self.name,
            end_position = self.end_position(),
            "Stream closed"
        );
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.writer.lock().closed
    }
}

fn file_index(naming: &FileNamingStrategy, path: &Path) -> Result<u64> {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| naming.parse_index(n))
        .ok_or_else(|| Error::CorruptChunk {
            path: path.to_path_buf(),
            reason: "file name does not carry a chunk index".to_string(),
        })
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// 10-byte payloads frame to 30 bytes; three fit in a 100-byte chunk
    const CAPACITY: u64 = 100;

    fn open(dir: &Path) -> ChunkManager {
        ChunkManager::open("test/0", dir, FileNamingStrategy::default(), CAPACITY).unwrap()
    }

    #[test]
    fn test_empty_directory_gets_chunk_zero() {
        let temp_dir = TempDir::new().unwrap();
        let manager = open(temp_dir.path());

        assert_eq!(manager.chunk_count(), 1);
        let active = manager.active_chunk();
        assert_eq!(active.number(), 0);
        assert_eq!(active.data_start(), 0);
        assert_eq!(manager.end_position(), 0);
    }

    #[test]
    fn test_positions_strictly_increase() {
        let temp_dir = TempDir::new().unwrap();
        let manager = open(temp_dir.path());

        let mut last = None;
        for i in 0..10u8 {
            let before = manager.end_position();
            let result = manager.append(&[i; 10]).unwrap();
            assert_eq!(result.position, before);
            if let Some(prev) = last {
                assert!(result.position > prev);
            }
            last = Some(result.position);
        }
    }

    #[test]
    fn test_rollover_seals_and_continues_at_data_end() {
        let temp_dir = TempDir::new().unwrap();
        let manager = open(temp_dir.path());

        for _ in 0..3 {
            manager.append(&[1u8; 10]).unwrap();
        }
        assert_eq!(manager.chunk_count(), 1);

        let result = manager.append(&[2u8; 10]).unwrap();
        assert_eq!(result.chunk_number, 1);
        assert_eq!(result.position, 90);

        let chunks = manager.chunks();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].is_completed());
        assert!(!chunks[1].is_completed());
        assert_eq!(chunks[1].data_start(), chunks[0].data_end());
    }

    #[test]
    fn test_exact_fill_rolls_eagerly() {
        let temp_dir = TempDir::new().unwrap();
        let manager =
            ChunkManager::open("exact", temp_dir.path(), FileNamingStrategy::default(), 60)
                .unwrap();

        manager.append(&[0u8; 10]).unwrap();
        manager.append(&[0u8; 10]).unwrap();

        let chunks = manager.chunks();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].is_completed());
        assert_eq!(chunks[1].data_start(), 60);
        assert_eq!(manager.end_position(), 60);
    }

    #[test]
    fn test_leftover_temp_file_does_not_block_rollover() {
        let temp_dir = TempDir::new().unwrap();
        let naming = FileNamingStrategy::default();
        let manager =
            ChunkManager::open("stale-tmp", temp_dir.path(), naming.clone(), 60).unwrap();

        // What a failed creation of chunk 1 leaves behind
        std::fs::write(naming.temp_file_name_for(temp_dir.path(), 1).unwrap(), b"").unwrap();

        manager.append(&[0u8; 10]).unwrap();
        manager.append(&[0u8; 10]).unwrap();
        let result = manager.append(&[1u8; 10]).unwrap();
        assert_eq!(result.chunk_number, 1);
        assert_eq!(result.position, 60);
        assert!(!naming.temp_file_name_for(temp_dir.path(), 1).unwrap().exists());
        assert_eq!(manager.read_message(60).unwrap().payload.as_ref(), &[1u8; 10]);
    }

    #[test]
    fn test_append_and_roll_update_metrics() {
        let temp_dir = TempDir::new().unwrap();
        let manager = ChunkManager::open(
            "metrics/append",
            temp_dir.path(),
            FileNamingStrategy::default(),
            CAPACITY,
        )
        .unwrap();

        for _ in 0..4 {
            manager.append(&[0u8; 10]).unwrap();
        }
        let oldest = manager.chunks()[0].clone();
        manager.remove(&oldest).unwrap();

        let label = ["metrics/append"];
        assert_eq!(metrics::APPENDED_MESSAGES_TOTAL.with_label_values(&label).get(), 4);
        assert_eq!(metrics::APPENDED_BYTES_TOTAL.with_label_values(&label).get(), 120);
        assert_eq!(metrics::CHUNKS_ROLLED_TOTAL.with_label_values(&label).get(), 1);
        assert_eq!(metrics::CHUNKS_DELETED_TOTAL.with_label_values(&label).get(), 1);
    }

    #[test]
    fn test_oversized_message_rejected_without_rolling() {
        let temp_dir = TempDir::new().unwrap();
        let manager = open(temp_dir.path());
        manager.append(&[0u8; 10]).unwrap();

        let err = manager.append(&[0u8; 81]).unwrap_err();
        assert!(matches!(err, Error::ChunkWrite { chunk: 0, .. }));
        assert_eq!(manager.chunk_count(), 1);
        assert!(!manager.active_chunk().is_completed());
        assert_eq!(manager.end_position(), 30);
    }

    #[test]
    fn test_resolve_boundaries() {
        let temp_dir = TempDir::new().unwrap();
        let manager = open(temp_dir.path());
        for _ in 0..4 {
            manager.append(&[0u8; 10]).unwrap();
        }

        let (chunk, offset) = manager.resolve(0).unwrap();
        assert_eq!((chunk.number(), offset), (0, 0));
        let (chunk, offset) = manager.resolve(89).unwrap();
        assert_eq!((chunk.number(), offset), (0, 89));
        let (chunk, offset) = manager.resolve(90).unwrap();
        assert_eq!((chunk.number(), offset), (1, 0));

        let err = manager.resolve(120).unwrap_err();
        assert!(matches!(
            err,
            Error::ChunkNotExist {
                position: 120,
                start: 0,
                end: 120
            }
        ));
        assert!(err.is_position_unavailable());
    }

    #[test]
    fn test_read_at_crosses_chunks() {
        let temp_dir = TempDir::new().unwrap();
        let manager = open(temp_dir.path());
        for i in 0..5u8 {
            manager.append(&[i; 10]).unwrap();
        }

        let bytes = manager.read_at(60, 60).unwrap();
        assert_eq!(bytes.len(), 60);
        let third = chunkstore_core::decode_frame(&bytes[..30]).unwrap();
        let fourth = chunkstore_core::decode_frame(&bytes[30..]).unwrap();
        assert_eq!(third.payload.as_ref(), &[2u8; 10]);
        assert_eq!(fourth.payload.as_ref(), &[3u8; 10]);

        // Clamped to the committed end
        assert_eq!(manager.read_at(120, 1000).unwrap().len(), 30);
        assert!(manager.read_at(150, 10).unwrap().is_empty());
        assert!(manager.read_at(151, 10).is_err());
    }

    #[test]
    fn test_read_messages_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let manager = open(temp_dir.path());
        for i in 0..7u8 {
            manager.append_with_timestamp(1000 + i as u64, &[i; 10]).unwrap();
        }

        let records = manager.read_messages(0, 100).unwrap();
        assert_eq!(records.len(), 7);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.position, i as u64 * 30);
            assert_eq!(record.timestamp, 1000 + i as u64);
            assert_eq!(record.payload.as_ref(), &[i as u8; 10]);
        }

        let page = manager.read_messages(60, 2).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[1].position, 90);

        assert!(manager.read_messages(210, 10).unwrap().is_empty());
        assert!(manager.read_messages(211, 10).is_err());
    }

    #[test]
    fn test_remove_only_oldest_completed() {
        let temp_dir = TempDir::new().unwrap();
        let manager = open(temp_dir.path());
        for _ in 0..7 {
            manager.append(&[0u8; 10]).unwrap();
        }
        let chunks = manager.chunks();
        assert_eq!(chunks.len(), 3);

        let err = manager.remove(&chunks[1]).unwrap_err();
        assert!(matches!(err, Error::ChunkNotRemovable { chunk: 1, .. }));
        let err = manager.remove(&chunks[2]).unwrap_err();
        assert!(matches!(err, Error::ChunkNotRemovable { chunk: 2, .. }));

        manager.remove(&chunks[0]).unwrap();
        assert!(!chunks[0].path().exists());
        assert_eq!(manager.start_position(), 90);
        assert!(matches!(
            manager.read_message(0),
            Err(Error::ChunkNotExist { .. })
        ));

        let err = manager.remove(&chunks[0]).unwrap_err();
        assert!(matches!(err, Error::ChunkNumberNotExist(0)));
        assert_eq!(manager.get_chunk(1).unwrap().number(), 1);
        assert!(manager.get_chunk(0).is_err());
    }

    #[test]
    fn test_remove_reports_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let manager = open(temp_dir.path());
        for _ in 0..4 {
            manager.append(&[0u8; 10]).unwrap();
        }
        let oldest = manager.chunks()[0].clone();
        std::fs::remove_file(oldest.path()).unwrap();

        let err = manager.remove(&oldest).unwrap_err();
        assert!(matches!(err, Error::ChunkFileNotExist(_)));
        assert_eq!(manager.chunk_count(), 1);
    }

    #[test]
    fn test_sealed_prefix_excludes_active() {
        let temp_dir = TempDir::new().unwrap();
        let manager = open(temp_dir.path());
        assert!(manager.sealed_prefix().is_empty());

        for _ in 0..7 {
            manager.append(&[0u8; 10]).unwrap();
        }
        let prefix: Vec<u64> = manager.sealed_prefix().iter().map(|c| c.number()).collect();
        assert_eq!(prefix, vec![0, 1]);
    }

    #[test]
    fn test_close_rejects_appends() {
        let temp_dir = TempDir::new().unwrap();
        let manager = open(temp_dir.path());
        manager.append(&[0u8; 10]).unwrap();

        manager.close().unwrap();
        manager.close().unwrap();
        assert!(manager.is_closed());
        assert!(manager.active_chunk().is_completed());
        assert!(matches!(
            manager.append(&[0u8; 10]),
            Err(Error::StreamClosed(_))
        ));
        assert_eq!(manager.read_messages(0, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_reopen_after_close_allocates_next_chunk() {
        let temp_dir = TempDir::new().unwrap();
        {
            let manager = open(temp_dir.path());
            manager.append(&[0u8; 10]).unwrap();
            manager.close().unwrap();
        }

        let manager = open(temp_dir.path());
        assert_eq!(manager.chunk_count(), 2);
        let result = manager.append(&[1u8; 10]).unwrap();
        assert_eq!(result.chunk_number, 1);
        assert_eq!(result.position, 30);
    }

    #[test]
    fn test_close_leaves_empty_active_chunk_for_reuse() {
        let temp_dir = TempDir::new().unwrap();
        {
            let manager = open(temp_dir.path());
            manager.append(&[0u8; 10]).unwrap();
            manager.close().unwrap();
        }
        for _ in 0..3 {
            let manager = open(temp_dir.path());
            assert!(!manager.active_chunk().is_completed());
            manager.close().unwrap();
            assert!(!manager.active_chunk().is_completed());
        }

        let manager = open(temp_dir.path());
        assert_eq!(manager.chunk_count(), 2);
        let result = manager.append(&[1u8; 10]).unwrap();
        assert_eq!((result.chunk_number, result.position), (1, 30));
    }

    #[test]
    fn test_recovery_seal_keeps_modified_time() {
        let temp_dir = TempDir::new().unwrap();
        let naming = FileNamingStrategy::default();
        {
            let manager = open(temp_dir.path());
            manager.append(&[0u8; 10]).unwrap();
        }
        // Chunk 1 next to an unsealed chunk 0, as a crash during rollover leaves it
        let chunk1 = Chunk::create(&naming, temp_dir.path(), 1, 30, CAPACITY).unwrap();
        drop(chunk1);

        let aged = SystemTime::now() - std::time::Duration::from_secs(7200);
        let path = naming.file_name_for(temp_dir.path(), 0).unwrap();
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(aged)
            .unwrap();
        let before = std::fs::metadata(&path).unwrap().modified().unwrap();

        let manager = open(temp_dir.path());
        let oldest = manager.chunks()[0].clone();
        assert!(oldest.is_completed());
        assert_eq!(oldest.last_modified().unwrap(), before);
    }

    #[test]
    fn test_gap_in_chunk_numbers_is_corruption() {
        let temp_dir = TempDir::new().unwrap();
        {
            let manager = open(temp_dir.path());
            for _ in 0..7 {
                manager.append(&[0u8; 10]).unwrap();
            }
        }
        let naming = FileNamingStrategy::default();
        std::fs::remove_file(naming.file_name_for(temp_dir.path(), 1).unwrap()).unwrap();

        let err =
            ChunkManager::open("test/0", temp_dir.path(), naming, CAPACITY).unwrap_err();
        assert!(matches!(err, Error::CorruptChunk { .. }));
    }

    #[test]
    fn test_capacity_validated() {
        let temp_dir = TempDir::new().unwrap();
        let err = ChunkManager::open("tiny", temp_dir.path(), FileNamingStrategy::default(), 10)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
