use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use super::{consumed_prefix, DeleteMessageStrategy};
use crate::chunk::Chunk;
use crate::config::RetentionPolicy;
use crate::error::Result;
use crate::manager::ChunkManager;

/// Consumed chunks last written `max_storage_hours` ago or earlier are deletable.
#[derive(Debug, Clone)]
pub struct DeleteMessageByTime {
    max_storage_hours: u32,
    ignore_unconsumed: bool,
}

impl DeleteMessageByTime {
    pub fn new(max_storage_hours: u32, ignore_unconsumed: bool) -> Result<Self> {
        RetentionPolicy::ByTime { max_storage_hours }.validate()?;
        Ok(Self {
            max_storage_hours,
            ignore_unconsumed,
        })
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_storage_hours as u64 * 3600)
    }

    fn is_expired(&self, chunk: &Chunk, now: SystemTime) -> bool {
        match chunk.last_modified() {
            // A modification time in the future counts as age zero
            Ok(modified) => now.duration_since(modified).unwrap_or_default() >= self.max_age(),
            Err(e) => {
                warn!(
                    chunk = chunk.number(),
                    error = %e,
                    "Cannot read chunk modification time"
                );
                false
            }
        }
    }
}

impl DeleteMessageStrategy for DeleteMessageByTime {
    fn name(&self) -> &'static str {
        "by_time"
    }

    fn allow_delete_chunks(
        &self,
        manager: &ChunkManager,
        max_consumed_position: u64,
    ) -> Vec<Arc<Chunk>> {
        let now = SystemTime::now();
        let deletable: Vec<_> =
            consumed_prefix(manager, max_consumed_position, self.ignore_unconsumed)
                .into_iter()
                .take_while(|chunk| self.is_expired(chunk, now))
                .collect();

        if !deletable.is_empty() {
            debug!(
                stream = %manager.name(),
                deletable = deletable.len(),
                max_storage_hours = self.max_storage_hours,
                "Chunks past retention time"
            );
        }
        deletable
    }
}
