use std::sync::Arc;

use tracing::debug;

use super::{consumed_prefix, DeleteMessageStrategy};
use crate::chunk::Chunk;
use crate::config::RetentionPolicy;
use crate::error::Result;
use crate::manager::ChunkManager;

/// Keep at most `max_chunk_count` consumed chunks; older ones are deletable.
///
/// Bounds disk use to roughly `max_chunk_count × chunk_capacity` per stream,
/// whatever the chunks' age.
#[derive(Debug, Clone)]
pub struct DeleteMessageByCount {
    max_chunk_count: u32,
    ignore_unconsumed: bool,
}

impl DeleteMessageByCount {
    pub fn new(max_chunk_count: u32, ignore_unconsumed: bool) -> Result<Self> {
        RetentionPolicy::ByCount { max_chunk_count }.validate()?;
        Ok(Self {
            max_chunk_count,
            ignore_unconsumed,
        })
    }

    pub fn max_chunk_count(&self) -> u32 {
        self.max_chunk_count
    }
}

impl DeleteMessageStrategy for DeleteMessageByCount {
    fn name(&self) -> &'static str {
        "by_count"
    }

    fn allow_delete_chunks(
        &self,
        manager: &ChunkManager,
        max_consumed_position: u64,
    ) -> Vec<Arc<Chunk>> {
        let mut candidates =
            consumed_prefix(manager, max_consumed_position, self.ignore_unconsumed);
        let keep = self.max_chunk_count as usize;

        if candidates.len() <= keep {
            return Vec::new();
        }

        candidates.truncate(candidates.len() - keep);
        debug!(
            stream = %manager.name(),
            deletable = candidates.len(),
            max_chunk_count = self.max_chunk_count,
            "Chunks over count limit"
        );
        candidates
    }
}
