//! Chunk File Naming
//!
//! Maps chunk numbers to file names and rediscovers chunk files on disk.
//!
//! ## Naming Scheme
//!
//! ```text
//! <prefix><9-digit zero-padded index>        committed chunk   chunk-000000012
//! <prefix><9-digit zero-padded index>.tmp    under creation    chunk-000000013.tmp
//! ```
//!
//! The index width is fixed, so lexicographic order of file names equals
//! numeric order of chunk numbers. Recovery relies on this: it sorts names and
//! reopens chunks in that order without reading any other index.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Width of the zero-padded index in chunk file names
pub const INDEX_WIDTH: usize = 9;

/// Largest index that fits in [`INDEX_WIDTH`] digits
pub const MAX_INDEX: u64 = 999_999_999;

/// Suffix of chunk files whose header is not yet durable
pub const TEMP_SUFFIX: &str = ".tmp";

/// Prefix + fixed-width index naming for chunk files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNamingStrategy {
    prefix: String,
}

impl FileNamingStrategy {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// File name (without directory) for chunk `index`.
    pub fn file_name(&self, index: u64) -> Result<String> {
        if index > MAX_INDEX {
            return Err(Error::InvalidArgument(format!(
                "chunk index {} exceeds {} digits",
                index, INDEX_WIDTH
            )));
        }
        Ok(format!(
            "{}{:0width$}",
            self.prefix,
            index,
            width = INDEX_WIDTH
        ))
    }

    /// Full path of chunk `index` inside `dir`.
    pub fn file_name_for(&self, dir: &Path, index: u64) -> Result<PathBuf> {
        Ok(dir.join(self.file_name(index)?))
    }

    /// Path a chunk is created under before it is renamed into place.
    pub fn temp_file_name_for(&self, dir: &Path, index: u64) -> Result<PathBuf> {
        Ok(dir.join(format!("{}{}", self.file_name(index)?, TEMP_SUFFIX)))
    }

    /// Chunk number encoded in a committed chunk file name.
    pub fn parse_index(&self, file_name: &str) -> Option<u64> {
        let digits = file_name.strip_prefix(self.prefix.as_str())?;
        if digits.len() != INDEX_WIDTH || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    fn is_temp_name(&self, file_name: &str) -> bool {
        file_name
            .strip_suffix(TEMP_SUFFIX)
            .is_some_and(|stem| self.parse_index(stem).is_some())
    }

    /// All committed chunk files in `dir`, ascending by name (= by index).
    ///
    /// A missing directory yields an empty list.
    pub fn chunk_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        self.scan(dir, |name| self.parse_index(name).is_some())
    }

    /// Leftover `.tmp` files from chunk creations interrupted by a crash.
    pub fn temp_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        self.scan(dir, |name| self.is_temp_name(name))
    }

    fn scan(&self, dir: &Path, keep: impl Fn(&str) -> bool) -> Result<Vec<PathBuf>> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if keep(name) {
                files.push(entry.path());
            }
        }

        files.sort();
        Ok(files)
    }
}

impl Default for FileNamingStrategy {
    fn default() -> Self {
        Self::new("chunk-")
    }
}
