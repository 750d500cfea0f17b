//! Chunk Store
//!
//! `ChunkStore` is the broker-level entry point: it owns one `ChunkManager` per
//! stream and maps stream ids to directories.
//!
//! ## Directory Layout
//!
//! ```text
//! <data_dir>/
//!     orders/
//!         0/  chunk-000000000  chunk-000000001  ...
//!         1/  chunk-000000000
//!     events/
//!         0/  chunk-000000004  chunk-000000005
//! ```
//!
//! ## Thread Safety
//!
//! The stream map sits behind a `RwLock`. Lookups of open streams take the
//! read lock only; opening a stream takes the write lock and re-checks the map
//! so two callers never open the same directory twice.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::StorageConfig;
use crate::error::{Error, Result};
use crate::manager::{AppendResult, ChunkManager};
use crate::naming::FileNamingStrategy;

/// Identifies one stream: a queue of a topic
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId {
    pub topic: String,
    pub queue_id: u32,
}

impl StreamId {
    pub fn new(topic: impl Into<String>, queue_id: u32) -> Self {
        Self {
            topic: topic.into(),
            queue_id,
        }
    }

    fn validate(&self) -> Result<()> {
        let topic = self.topic.as_str();
        if topic.is_empty()
            || topic == "."
            || topic == ".."
            || topic.contains(['/', '\\', '\0'])
        {
            return Err(Error::InvalidArgument(format!(
                "topic name {:?} cannot be used as a directory",
                topic
            )));
        }
        Ok(())
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.topic, self.queue_id)
    }
}

type StreamMap = RwLock<HashMap<StreamId, Arc<ChunkManager>>>;

/// Registry of all streams under one data directory
pub struct ChunkStore {
    config: StorageConfig,
    naming: FileNamingStrategy,
    streams: StreamMap,
}

impl ChunkStore {
    /// Create a store over `config.data_dir`. No streams are opened yet.
    pub fn new(config: StorageConfig) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_dir)?;

        Ok(Self {
            naming: FileNamingStrategy::new(config.file_prefix.clone()),
            config,
            streams: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Directory holding the chunks of `stream`
    pub fn stream_dir(&self, stream: &StreamId) -> PathBuf {
        self.config
            .data_dir
            .join(&stream.topic)
            .join(stream.queue_id.to_string())
    }

    /// The manager for `stream`, opening (and recovering) it on first use.
    pub fn get_or_open(&self, stream: &StreamId) -> Result<Arc<ChunkManager>> {
        // Fast path
        if let Some(manager) = self.streams.read().get(stream) {
            return Ok(Arc::clone(manager));
        }

        stream.validate()?;
        let mut streams = self.streams.write();

        // Double-check in case another caller opened it while we waited
        if let Some(manager) = streams.get(stream) {
            return Ok(Arc::clone(manager));
        }

        debug!(stream = %stream, "Opening stream");

        let manager = Arc::new(ChunkManager::open(
            stream.to_string(),
            self.stream_dir(stream),
            self.naming.clone(),
            self.config.chunk_capacity,
        )?);
        streams.insert(stream.clone(), Arc::clone(&manager));

        Ok(manager)
    }

    /// The manager for `stream` if it is already open.
    pub fn get(&self, stream: &StreamId) -> Option<Arc<ChunkManager>> {
        self.streams.read().get(stream).cloned()
    }

    /// Open every stream found under the data directory.
    ///
    /// Directories that do not look like `<topic>/<queue_id>` are skipped.
    /// Returns the number of streams opened.
    pub fn recover_all(&self) -> Result<usize> {
        let mut found = Vec::new();

        for topic_entry in std::fs::read_dir(&self.config.data_dir)? {
            let topic_entry = topic_entry?;
            if !topic_entry.file_type()?.is_dir() {
                continue;
            }
            let Some(topic) = topic_entry.file_name().to_str().map(str::to_string) else {
                continue;
            };

            for queue_entry in std::fs::read_dir(topic_entry.path())? {
                let queue_entry = queue_entry?;
                if !queue_entry.file_type()?.is_dir() {
                    continue;
                }
                let queue_name = queue_entry.file_name();
                match queue_name.to_str().and_then(|n| n.parse::<u32>().ok()) {
                    Some(queue_id) => found.push(StreamId::new(topic.clone(), queue_id)),
                    None => warn!(
                        path = ?queue_entry.path(),
                        "Skipping directory that is not a queue id"
                    ),
                }
            }
        }

        found.sort();
        for stream in &found {
            self.get_or_open(stream)?;
        }

        info!(
            data_dir = ?self.config.data_dir,
            streams = found.len(),
            "Recovered streams"
        );

        Ok(found.len())
    }

    /// Append a payload to `stream`, opening it if needed.
    pub fn append(&self, stream: &StreamId, payload: &[u8]) -> Result<AppendResult> {
        self.get_or_open(stream)?.append(payload)
    }

    /// All open streams, sorted by id.
    pub fn streams(&self) -> Vec<(StreamId, Arc<ChunkManager>)> {
        let mut streams: Vec<_> = self
            .streams
            .read()
            .iter()
            .map(|(id, manager)| (id.clone(), Arc::clone(manager)))
            .collect();
        streams.sort_by(|a, b| a.0.cmp(&b.0));
        streams
    }

    pub fn stream_count(&self) -> usize {
        self.streams.read().len()
    }

    /// Close every open stream. Keeps going past failures and returns the
    /// first one.
    pub fn close_all(&self) -> Result<()> {
        let mut first_error = None;
        let mut closed = 0usize;

        for (stream, manager) in self.streams() {
            match manager.close() {
                Ok(()) => closed += 1,
                Err(e) => {
                    error!(stream = %stream, error = %e, "Failed to close stream");
                    first_error.get_or_insert(e);
                }
            }
        }

        info!(closed, "Chunk store shut down");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
