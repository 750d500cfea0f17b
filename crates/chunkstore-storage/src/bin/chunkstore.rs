//! Chunkstore Binary
//!
//! Opens every stream under the data directory, prints the chunk inventory, and
//! runs the retention collector until Ctrl-C. On shutdown the Prometheus
//! counters are printed in the text exposition format.
//!
//! # Environment Variables
//!
//! - `CHUNKSTORE_CONFIG`: Path to a TOML config file (optional)
//! - `CHUNKSTORE_DATA_DIR`: Data directory (default: ./data/chunks)
//! - `CHUNKSTORE_CHUNK_CAPACITY`: Bytes per chunk (default: 268435456)
//! - `CHUNKSTORE_MAX_CHUNK_COUNT`: Select the by-count policy with this limit
//! - `CHUNKSTORE_MAX_STORAGE_HOURS`: Select the by-time policy with this limit
//! - `CHUNKSTORE_COLLECT_INTERVAL_MS`: Collector period (default: 10000)
//! - `CHUNKSTORE_IGNORE_UNCONSUMED`: `true` to delete regardless of consumers
//! - `RUST_LOG`: Log level (default: info)
//!
//! # Example
//!
//! ```bash
//! export CHUNKSTORE_DATA_DIR=/var/lib/chunkstore
//! export CHUNKSTORE_MAX_CHUNK_COUNT=50
//! cargo run --bin chunkstore
//! ```

use std::sync::Arc;

use chunkstore_storage::{
    build_strategy, metrics, ChunkInfo, ChunkStore, ConsumerOffsets, RetentionCollector,
    StorageConfig,
};
use serde::Serialize;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Serialize)]
struct StreamInventory {
    stream: String,
    start_position: u64,
    end_position: u64,
    chunks: Vec<ChunkInfo>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logging
    let log_level = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info".to_string())
        .parse()
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Chunkstore starting");
    metrics::init();

    let mut config = match std::env::var("CHUNKSTORE_CONFIG") {
        Ok(path) => {
            info!(path = %path, "Loading configuration file");
            StorageConfig::load(&path)?
        }
        Err(_) => StorageConfig::default(),
    };
    config.apply_env_overrides()?;
    config.validate()?;

    info!(
        data_dir = ?config.data_dir,
        chunk_capacity = config.chunk_capacity,
        policy = ?config.retention.policy,
        collect_interval_ms = config.retention.collect_interval.as_millis() as u64,
        ignore_unconsumed = config.retention.ignore_unconsumed,
        "Configuration"
    );

    let store = Arc::new(ChunkStore::new(config.clone())?);
    store.recover_all()?;

    let inventory: Vec<StreamInventory> = store
        .streams()
        .into_iter()
        .map(|(id, manager)| StreamInventory {
            stream: id.to_string(),
            start_position: manager.start_position(),
            end_position: manager.end_position(),
            chunks: manager.chunk_infos(),
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&inventory)?);

    // No session layer here: without committed offsets only
    // ignore_unconsumed lets retention delete anything.
    let offsets = Arc::new(ConsumerOffsets::new());
    let collector = Arc::new(RetentionCollector::new(
        Arc::clone(&store),
        build_strategy(&config.retention)?,
        offsets,
        config.retention.collect_interval,
    ));
    let handle = collector.spawn();

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    handle.shutdown().await;
    if let Err(e) = store.close_all() {
        error!(error = %e, "Failed to close all streams");
        return Err(e.into());
    }

    match metrics::encode_text() {
        Ok(text) => println!("{}", text),
        Err(e) => error!(error = %e, "Failed to encode metrics"),
    }

    info!("Chunkstore stopped");
    Ok(())
}
