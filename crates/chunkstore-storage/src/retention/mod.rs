//! Retention Policies
//!
//! A `DeleteMessageStrategy` decides which chunks of a stream may be deleted,
//! given the lowest position every consumer group has acknowledged. It never
//! deletes anything itself; the [`RetentionCollector`](crate::RetentionCollector)
//! removes what it returns.
//!
//! ## Eligibility
//!
//! A chunk is a candidate when it is:
//! - completed, and not the active chunk
//! - fully consumed (`data_end <= max_consumed_position`), unless
//!   `ignore_unconsumed` is set
//!
//! Candidates are always a prefix of the stream's chunk list, oldest first.
//! Deleting from the front keeps the remaining log contiguous.
//!
//! ## Policies
//!
//! - [`DeleteMessageByCount`]: keep at most `max_chunk_count` candidates
//! - [`DeleteMessageByTime`]: drop candidates older than `max_storage_hours`

mod by_count;
mod by_time;

pub use by_count::DeleteMessageByCount;
pub use by_time::DeleteMessageByTime;

use std::sync::Arc;

use crate::chunk::Chunk;
use crate::config::{RetentionConfig, RetentionPolicy};
use crate::error::Result;
use crate::manager::ChunkManager;

/// Chooses chunks that retention may delete
pub trait DeleteMessageStrategy: Send + Sync {
    /// Short policy name for logs
    fn name(&self) -> &'static str;

    /// Deletable chunks of `manager`, oldest first.
    ///
    /// Pure with respect to the manager: reads the chunk list, mutates nothing.
    fn allow_delete_chunks(
        &self,
        manager: &ChunkManager,
        max_consumed_position: u64,
    ) -> Vec<Arc<Chunk>>;
}

/// Build the strategy selected by `config`.
pub fn build_strategy(config: &RetentionConfig) -> Result<Arc<dyn DeleteMessageStrategy>> {
    let strategy: Arc<dyn DeleteMessageStrategy> = match config.policy {
        RetentionPolicy::ByCount { max_chunk_count } => Arc::new(DeleteMessageByCount::new(
            max_chunk_count,
            config.ignore_unconsumed,
        )?),
        RetentionPolicy::ByTime { max_storage_hours } => Arc::new(DeleteMessageByTime::new(
            max_storage_hours,
            config.ignore_unconsumed,
        )?),
    };
    Ok(strategy)
}

/// Completed, non-active chunks that consumers are done with, oldest first.
pub(crate) fn consumed_prefix(
    manager: &ChunkManager,
    max_consumed_position: u64,
    ignore_unconsumed: bool,
) -> Vec<Arc<Chunk>> {
    manager
        .sealed_prefix()
        .into_iter()
        .take_while(|chunk| ignore_unconsumed || chunk.data_end() <= max_consumed_position)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::time::Duration;

    #[test]
    fn test_build_strategy_by_policy() {
        let config = RetentionConfig {
            policy: RetentionPolicy::ByCount { max_chunk_count: 3 },
            collect_interval: Duration::from_secs(1),
            ignore_unconsumed: false,
        };
        assert_eq!(build_strategy(&config).unwrap().name(), "by_count");

        let config = RetentionConfig {
            policy: RetentionPolicy::ByTime {
                max_storage_hours: 24,
            },
            ..config
        };
        assert_eq!(build_strategy(&config).unwrap().name(), "by_time");
    }

    #[test]
    fn test_build_strategy_rejects_zero_limits() {
        let config = RetentionConfig {
            policy: RetentionPolicy::ByCount { max_chunk_count: 0 },
            ..Default::default()
        };
        assert!(matches!(
            build_strategy(&config),
            Err(Error::InvalidArgument(_))
        ));
    }
}
