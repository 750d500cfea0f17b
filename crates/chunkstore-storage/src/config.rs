//! Storage Configuration
//!
//! This module defines configuration for chunk storage and retention.
//!
//! ## StorageConfig
//!
//! - **data_dir**: Root directory; each stream lives in `<data_dir>/<topic>/<queue_id>/`
//! - **chunk_capacity**: Data bytes per chunk file before rolling (default: 256MB)
//! - **file_prefix**: Chunk file name prefix (default: `chunk-`)
//! - **retention**: Which chunks the collector may delete, and how often it runs
//!
//! ## RetentionConfig
//!
//! - **policy**: `by_count` (keep at most N consumed chunks) or `by_time`
//!   (delete consumed chunks older than N hours)
//! - **collect_interval**: Collector period (default: 10s)
//! - **ignore_unconsumed**: Delete regardless of consumer progress. Broker-wide,
//!   for deployments that do not track consumer offsets.
//!
//! ## Usage
//!
//! ```ignore
//! use chunkstore_storage::{RetentionPolicy, StorageConfig};
//!
//! // From a TOML file, then environment overrides
//! let mut config = StorageConfig::load("chunkstore.toml")?;
//! config.apply_env_overrides()?;
//! config.validate()?;
//!
//! // In code
//! let config = StorageConfig {
//!     data_dir: "./data/queues".into(),
//!     chunk_capacity: 1024 * 1024, // 1MB for faster testing
//!     ..Default::default()
//! };
//! ```
//!
//! ```toml
//! data_dir = "/var/lib/chunkstore"
//! chunk_capacity = 268435456
//!
//! [retention]
//! collect_interval = 10000
//! ignore_unconsumed = false
//!
//! [retention.policy]
//! type = "by_count"
//! max_chunk_count = 100
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use chunkstore_core::FRAME_OVERHEAD;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for all streams
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Data region size of each chunk in bytes (default: 256MB)
    #[serde(default = "default_chunk_capacity")]
    pub chunk_capacity: u64,

    /// Prefix of chunk file names (default: "chunk-")
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    /// Retention settings
    #[serde(default)]
    pub retention: RetentionConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            chunk_capacity: default_chunk_capacity(),
            file_prefix: default_file_prefix(),
            retention: RetentionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Deletion policy
    #[serde(default)]
    pub policy: RetentionPolicy,

    /// How often the collector runs (milliseconds on the wire, default: 10s)
    #[serde(with = "duration_ms", default = "default_collect_interval")]
    pub collect_interval: Duration,

    /// Skip the consumer progress check in every policy
    #[serde(default)]
    pub ignore_unconsumed: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            policy: RetentionPolicy::default(),
            collect_interval: default_collect_interval(),
            ignore_unconsumed: false,
        }
    }
}

/// Which chunks are eligible for deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Keep at most `max_chunk_count` consumed, completed chunks
    ByCount { max_chunk_count: u32 },

    /// Delete consumed, completed chunks last written `max_storage_hours` ago or earlier
    ByTime { max_storage_hours: u32 },
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        RetentionPolicy::ByTime {
            max_storage_hours: 24 * 7,
        }
    }
}

impl RetentionPolicy {
    pub fn validate(&self) -> Result<()> {
        match *self {
            RetentionPolicy::ByCount { max_chunk_count: 0 } => Err(Error::InvalidArgument(
                "max_chunk_count must be > 0".to_string(),
            )),
            RetentionPolicy::ByTime {
                max_storage_hours: 0,
            } => Err(Error::InvalidArgument(
                "max_storage_hours must be > 0".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data/chunks")
}

fn default_chunk_capacity() -> u64 {
    256 * 1024 * 1024 // 256MB
}

fn default_file_prefix() -> String {
    "chunk-".to_string()
}

fn default_collect_interval() -> Duration {
    Duration::from_secs(10)
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

impl StorageConfig {
    /// Smallest capacity that still holds one empty message
    pub const MIN_CHUNK_CAPACITY: u64 = FRAME_OVERHEAD as u64;

    /// Parse a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))
    }

    /// Override fields from `CHUNKSTORE_*` environment variables.
    ///
    /// `CHUNKSTORE_MAX_CHUNK_COUNT` and `CHUNKSTORE_MAX_STORAGE_HOURS` each
    /// select their policy; setting both is rejected.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dir) = var("CHUNKSTORE_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(capacity) = var("CHUNKSTORE_CHUNK_CAPACITY") {
            self.chunk_capacity = parse_var("CHUNKSTORE_CHUNK_CAPACITY", &capacity)?;
        }

        let by_count = var("CHUNKSTORE_MAX_CHUNK_COUNT");
        let by_time = var("CHUNKSTORE_MAX_STORAGE_HOURS");
        match (by_count, by_time) {
            (Some(_), Some(_)) => {
                return Err(Error::Config(
                    "CHUNKSTORE_MAX_CHUNK_COUNT and CHUNKSTORE_MAX_STORAGE_HOURS are exclusive"
                        .to_string(),
                ))
            }
            (Some(count), None) => {
                self.retention.policy = RetentionPolicy::ByCount {
                    max_chunk_count: parse_var("CHUNKSTORE_MAX_CHUNK_COUNT", &count)?,
                };
            }
            (None, Some(hours)) => {
                self.retention.policy = RetentionPolicy::ByTime {
                    max_storage_hours: parse_var("CHUNKSTORE_MAX_STORAGE_HOURS", &hours)?,
                };
            }
            (None, None) => {}
        }

        if let Some(ms) = var("CHUNKSTORE_COLLECT_INTERVAL_MS") {
            self.retention.collect_interval =
                Duration::from_millis(parse_var("CHUNKSTORE_COLLECT_INTERVAL_MS", &ms)?);
        }
        if let Some(flag) = var("CHUNKSTORE_IGNORE_UNCONSUMED") {
            self.retention.ignore_unconsumed = parse_var("CHUNKSTORE_IGNORE_UNCONSUMED", &flag)?;
        }

        Ok(())
    }

    /// Reject settings that would fail later, at first use.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_capacity < Self::MIN_CHUNK_CAPACITY {
            return Err(Error::Config(format!(
                "chunk_capacity must be >= {} bytes, got {}",
                Self::MIN_CHUNK_CAPACITY,
                self.chunk_capacity
            )));
        }
        if self.chunk_capacity > u32::MAX as u64 {
            return Err(Error::Config(format!(
                "chunk_capacity must be <= {} bytes, got {}",
                u32::MAX,
                self.chunk_capacity
            )));
        }
        if self.file_prefix.is_empty()
            || self
                .file_prefix
                .contains(|c: char| c == '/' || c == '\\' || c == '.')
        {
            return Err(Error::Config(format!(
                "file_prefix must be non-empty without path separators or dots, got {:?}",
                self.file_prefix
            )));
        }
        if self.retention.collect_interval.is_zero() {
            return Err(Error::Config("collect_interval must be > 0".to_string()));
        }
        self.retention.policy.validate()
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} has an invalid value: {:?}", key, value)))
}
