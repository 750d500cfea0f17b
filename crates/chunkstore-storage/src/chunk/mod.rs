//! Chunk Files
//!
//! A chunk is one fixed-capacity, append-only segment file of a stream.
//!
//! ## File Layout
//!
//! ```text
//! ┌──────────────┬──────────────────────────────────┬──────────────┐
//! │ Header 128B  │ Data region (capacity bytes)     │ Footer 128B  │
//! │ number/start │ frame frame frame ... (zeroes)   │ written once │
//! └──────────────┴──────────────────────────────────┴──────────────┘
//! ```
//!
//! The file is preallocated at creation. The footer stays zeroed until the
//! chunk is sealed; a valid footer is what marks a chunk completed on disk.
//!
//! ## Concurrency
//!
//! - One writer at a time, serialised by an internal mutex.
//! - Readers use positional reads (`pread`) on the shared file handle and never
//!   take the writer lock. They only see bytes below `data_size`, which is
//!   published with release ordering after the write has been synced.
//! - `Writable → Completed` is one-way.
//!
//! ## Crash Safety
//!
//! - Creation writes `<name>.tmp`, syncs it, then renames it into place.
//! - Appends are synced before `data_size` advances, so a failed append leaves
//!   no visible bytes.
//! - Reopening an unsealed chunk rescans frames and stops at the first torn one.

mod header;

pub use header::{ChunkFooter, ChunkHeader, FOOTER_SIZE, HEADER_SIZE};

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use chunkstore_core::{decode_frame, peek_frame_len, ChunkInfo, MessageRecord};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::naming::FileNamingStrategy;

/// Block size used when rescanning or verifying a data region
const SCAN_BLOCK_SIZE: usize = 1024 * 1024;

/// Writer-side state, guarded by the chunk's writer mutex
struct ChunkWriter {
    /// Running CRC32 over every committed data byte
    checksum: crc32fast::Hasher,
}

/// One segment file of a stream
pub struct Chunk {
    header: ChunkHeader,
    path: PathBuf,
    file: File,
    data_size: AtomicU64,
    completed: AtomicBool,
    writer: Mutex<ChunkWriter>,
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk")
            .field("number", &self.header.chunk_number)
            .field("data_start", &self.header.data_start)
            .field("data_size", &self.data_size())
            .field("capacity", &self.header.capacity)
            .field("completed", &self.is_completed())
            .field("path", &self.path)
            .finish()
    }
}

impl Chunk {
    /// Create chunk `number` in `dir`, starting at global position `data_start`.
    pub fn create(
        naming: &FileNamingStrategy,
        dir: &Path,
        number: u64,
        data_start: u64,
        capacity: u64,
    ) -> Result<Self> {
        let temp_path = naming.temp_file_name_for(dir, number)?;
        let path = naming.file_name_for(dir, number)?;

        if path.exists() {
            return Err(Error::ChunkWrite {
                chunk: number,
                reason: format!("{} already exists", path.display()),
            });
        }

        let header = ChunkHeader {
            chunk_number: number,
            data_start,
            capacity,
            created_at: now_ms(),
        };

        let write_failed = |op: &str, e: io::Error| Error::ChunkWrite {
            chunk: number,
            reason: format!("{} {}: {}", op, temp_path.display(), e),
        };

        // A leftover .tmp is from an earlier create that failed part way
        remove_if_exists(&temp_path).map_err(|e| write_failed("remove stale", e))?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .map_err(|e| write_failed("create", e))?;

        let installed = file
            .set_len(header.file_size())
            .map_err(|e| write_failed("preallocate", e))
            .and_then(|_| {
                write_all_at(&file, &header.encode(), 0)
                    .map_err(|e| write_failed("write header", e))
            })
            .and_then(|_| file.sync_all().map_err(|e| write_failed("sync", e)))
            .and_then(|_| {
                std::fs::rename(&temp_path, &path).map_err(|e| write_failed("rename", e))
            });
        if let Err(e) = installed {
            if let Err(cleanup) = remove_if_exists(&temp_path) {
                warn!(
                    path = ?temp_path,
                    error = %cleanup,
                    "Failed to remove temporary chunk file"
                );
            }
            return Err(e);
        }
        sync_dir(dir).map_err(|e| write_failed("sync directory", e))?;

        info!(
            chunk = number,
            data_start,
            capacity,
            path = ?path,
            "Chunk created"
        );

        Ok(Self {
            header,
            path,
            file,
            data_size: AtomicU64::new(0),
            completed: AtomicBool::new(false),
            writer: Mutex::new(ChunkWriter {
                checksum: crc32fast::Hasher::new(),
            }),
        })
    }

    /// Reopen an existing chunk file.
    ///
    /// The header must name `expected_number`. A valid footer restores a
    /// completed chunk; otherwise frames are rescanned to find the data end.
    pub fn open(path: &Path, expected_number: u64) -> Result<Self> {
        let file = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::ChunkFileNotExist(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };

        let corrupt = |reason: String| Error::CorruptChunk {
            path: path.to_path_buf(),
            reason,
        };

        let file_len = file.metadata()?.len();
        if file_len < HEADER_SIZE {
            return Err(corrupt(format!("file is only {} bytes", file_len)));
        }

        let mut raw_header = vec![0u8; HEADER_SIZE as usize];
        read_exact_at(&file, &mut raw_header, 0)?;
        let header = ChunkHeader::decode(&raw_header)
            .map_err(|e| corrupt(format!("header: {}", e)))?;

        if header.chunk_number != expected_number {
            return Err(corrupt(format!(
                "header names chunk {}, file name names chunk {}",
                header.chunk_number, expected_number
            )));
        }
        if file_len < header.file_size() {
            return Err(corrupt(format!(
                "file is {} bytes, expected {}",
                file_len,
                header.file_size()
            )));
        }

        let mut raw_footer = vec![0u8; FOOTER_SIZE as usize];
        read_exact_at(&file, &mut raw_footer, header.footer_offset())?;
        let footer = match ChunkFooter::decode(&raw_footer) {
            Ok(footer) => footer,
            Err(e) => {
                warn!(
                    path = ?path,
                    error = %e,
                    "Unreadable chunk footer, rescanning data region"
                );
                None
            }
        };

        let chunk = match footer {
            Some(footer) if footer.data_size <= header.capacity => Self {
                header,
                path: path.to_path_buf(),
                file,
                data_size: AtomicU64::new(footer.data_size),
                completed: AtomicBool::new(true),
                writer: Mutex::new(ChunkWriter {
                    checksum: crc32fast::Hasher::new(),
                }),
            },
            Some(footer) => {
                return Err(corrupt(format!(
                    "footer data size {} exceeds capacity {}",
                    footer.data_size, header.capacity
                )))
            }
            None => {
                let (data_size, checksum) = scan_frames(&file, path, &header)?;
                Self {
                    header,
                    path: path.to_path_buf(),
                    file,
                    data_size: AtomicU64::new(data_size),
                    completed: AtomicBool::new(false),
                    writer: Mutex::new(ChunkWriter { checksum }),
                }
            }
        };

        debug!(
            chunk = chunk.number(),
            data_start = chunk.data_start(),
            data_end = chunk.data_end(),
            completed = chunk.is_completed(),
            "Chunk opened"
        );

        Ok(chunk)
    }

    pub fn number(&self) -> u64 {
        self.header.chunk_number
    }

    pub fn header(&self) -> &ChunkHeader {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Global position of the first byte in this chunk
    pub fn data_start(&self) -> u64 {
        self.header.data_start
    }

    /// Global position one past the last committed byte
    pub fn data_end(&self) -> u64 {
        self.header.data_start + self.data_size()
    }

    /// Committed bytes within this chunk
    pub fn data_size(&self) -> u64 {
        self.data_size.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> u64 {
        self.header.capacity
    }

    pub fn remaining(&self) -> u64 {
        self.header.capacity - self.data_size()
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Whether `position` lies in this chunk's committed range
    pub fn contains(&self, position: u64) -> bool {
        position >= self.data_start() && position < self.data_end()
    }

    /// Append `bytes` and sync them to disk.
    ///
    /// Returns the offset within the chunk where the bytes begin. Never spans
    /// chunks: if the bytes do not fit, nothing is written.
    pub fn append(&self, bytes: &[u8]) -> Result<u64> {
        let mut writer = self.writer.lock();

        if self.is_completed() {
            return Err(Error::ChunkWrite {
                chunk: self.number(),
                reason: "chunk is completed".to_string(),
            });
        }

        let offset = self.data_size.load(Ordering::Acquire);
        let remaining = self.header.capacity - offset;
        if bytes.len() as u64 > remaining {
            return Err(Error::ChunkWrite {
                chunk: self.number(),
                reason: format!("needs {} bytes, {} remaining", bytes.len(), remaining),
            });
        }

        let write_failed = |e: io::Error| Error::ChunkWrite {
            chunk: self.header.chunk_number,
            reason: e.to_string(),
        };
        write_all_at(&self.file, bytes, HEADER_SIZE + offset).map_err(write_failed)?;
        self.file.sync_data().map_err(write_failed)?;

        writer.checksum.update(bytes);
        self.data_size
            .store(offset + bytes.len() as u64, Ordering::Release);

        Ok(offset)
    }

    /// Read `len` committed bytes starting at `offset` within this chunk.
    pub fn read_at(&self, offset: u64, len: u64) -> Result<Bytes> {
        let committed = self.data_size();
        let in_range = offset
            .checked_add(len)
            .is_some_and(|end| end <= committed);
        if !in_range {
            return Err(Error::ChunkNotExist {
                position: self.header.data_start.saturating_add(offset),
                start: self.header.data_start,
                end: self.header.data_start + committed,
            });
        }

        let mut buf = vec![0u8; len as usize];
        read_exact_at(&self.file, &mut buf, HEADER_SIZE + offset)?;
        Ok(Bytes::from(buf))
    }

    /// Decode the message frame at `offset` within this chunk.
    pub fn read_record(&self, offset: u64) -> Result<MessageRecord> {
        let committed = self.data_size();
        if offset >= committed {
            return Err(Error::ChunkNotExist {
                position: self.header.data_start + offset,
                start: self.header.data_start,
                end: self.header.data_start + committed,
            });
        }

        let prefix = self.read_at(offset, 4.min(committed - offset))?;
        let frame_len = peek_frame_len(&prefix)?
            .ok_or(chunkstore_core::Error::InvalidLength(0))? as u64;
        if frame_len > committed - offset {
            return Err(chunkstore_core::Error::Truncated {
                needed: frame_len as usize,
                available: (committed - offset) as usize,
            }
            .into());
        }

        let frame = self.read_at(offset, frame_len)?;
        let decoded = decode_frame(&frame)?;

        Ok(MessageRecord::new(
            self.header.data_start + offset,
            decoded.timestamp,
            decoded.payload,
        ))
    }

    /// Seal the chunk: write the footer and mark it completed.
    ///
    /// Idempotent.
    pub fn seal(&self) -> Result<()> {
        let writer = self.writer.lock();

        if self.is_completed() {
            return Ok(());
        }

        let footer = ChunkFooter {
            data_size: self.data_size.load(Ordering::Acquire),
            data_checksum: writer.checksum.clone().finalize(),
        };

        let write_failed = |e: io::Error| Error::ChunkWrite {
            chunk: self.header.chunk_number,
            reason: format!("seal: {}", e),
        };
        write_all_at(&self.file, &footer.encode(), self.header.footer_offset())
            .map_err(write_failed)?;
        self.file.sync_data().map_err(write_failed)?;

        self.completed.store(true, Ordering::Release);

        info!(
            chunk = self.number(),
            data_start = self.data_start(),
            data_end = self.data_end(),
            "Chunk sealed"
        );

        Ok(())
    }

    /// Recompute the data-region checksum and compare it with the footer
    /// (completed chunks) or with the running checksum (active chunk).
    pub fn verify(&self) -> Result<()> {
        let (expected, data_size) = if self.is_completed() {
            let mut raw_footer = vec![0u8; FOOTER_SIZE as usize];
            read_exact_at(&self.file, &mut raw_footer, self.header.footer_offset())?;
            let footer = ChunkFooter::decode(&raw_footer)?.ok_or_else(|| Error::CorruptChunk {
                path: self.path.clone(),
                reason: "completed chunk has no footer".to_string(),
            })?;
            (footer.data_checksum, footer.data_size)
        } else {
            let writer = self.writer.lock();
            (writer.checksum.clone().finalize(), self.data_size())
        };

        let mut crc = crc32fast::Hasher::new();
        let mut buf = vec![0u8; SCAN_BLOCK_SIZE];
        let mut offset = 0u64;
        while offset < data_size {
            let len = (data_size - offset).min(SCAN_BLOCK_SIZE as u64) as usize;
            read_exact_at(&self.file, &mut buf[..len], HEADER_SIZE + offset)?;
            crc.update(&buf[..len]);
            offset += len as u64;
        }

        let actual = crc.finalize();
        if actual != expected {
            return Err(Error::CorruptChunk {
                path: self.path.clone(),
                reason: format!(
                    "data checksum {:#010x}, expected {:#010x}",
                    actual, expected
                ),
            });
        }
        Ok(())
    }

    /// Modification time of the chunk file
    pub fn last_modified(&self) -> Result<SystemTime> {
        match std::fs::metadata(&self.path) {
            Ok(metadata) => Ok(metadata.modified()?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(Error::ChunkFileNotExist(self.path.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Set the file's modification time, e.g. back to its value before a
    /// recovery seal touched it.
    pub fn set_last_modified(&self, time: SystemTime) -> Result<()> {
        self.file.set_modified(time).map_err(|e| Error::ChunkWrite {
            chunk: self.header.chunk_number,
            reason: format!("set modified time: {}", e),
        })
    }

    pub fn info(&self) -> ChunkInfo {
        let last_modified_ms = self
            .last_modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64);

        ChunkInfo {
            number: self.number(),
            file_name: self.file_name(),
            data_start: self.data_start(),
            data_end: self.data_end(),
            capacity: self.capacity(),
            completed: self.is_completed(),
            last_modified_ms,
        }
    }
}

/// Walk the frames of an unsealed chunk and return the committed size and
/// the running checksum over it. Stops at zero-filled space or the first
/// frame that fails to decode.
fn scan_frames(
    file: &File,
    path: &Path,
    header: &ChunkHeader,
) -> Result<(u64, crc32fast::Hasher)> {
    let mut checksum = crc32fast::Hasher::new();
    let mut offset = 0u64;
    let mut len_buf = [0u8; 4];

    while header.capacity - offset >= 4 {
        read_exact_at(file, &mut len_buf, HEADER_SIZE + offset)?;
        let frame_len = match peek_frame_len(&len_buf) {
            Ok(Some(len)) => len as u64,
            Ok(None) => break,
            Err(e) => {
                warn!(path = ?path, offset, error = %e, "Discarding torn chunk tail");
                break;
            }
        };
        if frame_len > header.capacity - offset {
            warn!(
                path = ?path,
                offset,
                frame_len,
                "Frame runs past chunk capacity, discarding tail"
            );
            break;
        }

        let mut frame = vec![0u8; frame_len as usize];
        read_exact_at(file, &mut frame, HEADER_SIZE + offset)?;
        if let Err(e) = decode_frame(&frame) {
            warn!(path = ?path, offset, error = %e, "Discarding torn chunk tail");
            break;
        }

        checksum.update(&frame);
        offset += frame_len;
    }

    Ok((offset, checksum))
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(windows)]
fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_write(buf, offset) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
            Ok(n) => {
                buf = &buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
