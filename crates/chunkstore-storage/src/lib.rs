//! Chunkstore Storage Engine
//!
//! This crate implements the on-disk message log of a queue broker: each stream
//! (a topic queue) is an append-only sequence of fixed-capacity chunk files,
//! addressed by a global byte position, and trimmed from the front by a
//! retention collector once consumers are done with the data.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────┐    append / read_at    ┌──────────────────────┐
//! │   Broker    │ ─────────────────────► │     ChunkStore       │
//! └─────────────┘                        │  topic/queue → mgr   │
//!                                        └──────────┬───────────┘
//!                                                   │
//!                                        ┌──────────▼───────────┐
//!                                        │    ChunkManager      │
//!                                        │ resolve / roll / rm  │
//!                                        └──────────┬───────────┘
//!                                                   │
//!                          ┌────────────┬───────────┴┬────────────┐
//!                          │ chunk-…000 │ chunk-…001 │ chunk-…002 │
//!                          │ completed  │ completed  │ active     │
//!                          └────────────┴────────────┴────────────┘
//!                                 ▲
//!                                 │ remove oldest
//!                        ┌────────┴──────────┐   ┌──────────────────────┐
//!                        │ RetentionCollector│◄──│ DeleteMessageStrategy│
//!                        │  (tokio interval) │   │  by_count / by_time  │
//!                        └────────┬──────────┘   └──────────────────────┘
//!                                 │ min consumed position
//!                        ┌────────▼──────────────┐
//!                        │ConsumedPositionSource │
//!                        └───────────────────────┘
//! ```
//!
//! ## Main Components
//!
//! - [`FileNamingStrategy`]: `<prefix><9-digit index>` file names; directory
//!   scans that recover chunk order from names alone
//! - [`Chunk`]: one preallocated file with a header, a data region of message
//!   frames, and a footer written when the chunk is sealed
//! - [`ChunkManager`]: ordered chunks of one stream; single-writer appends with
//!   rollover, lock-free reads of committed bytes, crash recovery
//! - [`ChunkStore`]: all streams under one data directory
//! - [`DeleteMessageStrategy`]: which chunks retention may delete
//! - [`RetentionCollector`]: periodic deletion driver
//! - [`metrics`]: Prometheus counters for appends, rollover and retention
//!
//! ## Usage Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use chunkstore_storage::{
//!     build_strategy, ChunkStore, ConsumerOffsets, RetentionCollector, StorageConfig, StreamId,
//! };
//!
//! let config = StorageConfig::default();
//! let store = Arc::new(ChunkStore::new(config.clone())?);
//! store.recover_all()?;
//!
//! let stream = StreamId::new("orders", 0);
//! let result = store.append(&stream, b"hello")?;
//!
//! let offsets = Arc::new(ConsumerOffsets::new());
//! offsets.commit("billing", &stream, result.position + result.size);
//!
//! let collector = Arc::new(RetentionCollector::new(
//!     Arc::clone(&store),
//!     build_strategy(&config.retention)?,
//!     offsets,
//!     config.retention.collect_interval,
//! ));
//! let handle = collector.spawn();
//! // ...
//! handle.shutdown().await;
//! store.close_all()?;
//! ```

pub mod chunk;
pub mod collector;
pub mod config;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod naming;
pub mod offsets;
pub mod retention;
pub mod store;

pub use chunk::Chunk;
pub use collector::{CollectorHandle, RetentionCollector, RetentionReport};
pub use config::{RetentionConfig, RetentionPolicy, StorageConfig};
pub use error::{Error, Result};
pub use manager::{AppendResult, ChunkManager};
pub use naming::FileNamingStrategy;
pub use offsets::{ConsumedPositionSource, ConsumerOffsets};
pub use retention::{
    build_strategy, DeleteMessageByCount, DeleteMessageByTime, DeleteMessageStrategy,
};
pub use store::{ChunkStore, StreamId};

pub use chunkstore_core::{ChunkInfo, MessageRecord};
