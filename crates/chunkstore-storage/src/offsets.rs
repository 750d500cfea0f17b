//! Consumer Positions
//!
//! Retention must never delete bytes a consumer group has not acknowledged yet.
//! The collector learns the safe bound through [`ConsumedPositionSource`]; the
//! broker's session layer implements it over its committed offsets.
//!
//! [`ConsumerOffsets`] is an in-memory implementation used by the binary and by
//! tests.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::Result;
use crate::store::StreamId;

/// Supplies the lowest position acknowledged by any consumer group of a stream
#[async_trait]
pub trait ConsumedPositionSource: Send + Sync {
    /// Minimum committed position over all groups consuming `stream`.
    ///
    /// `None` when no group consumes the stream.
    async fn min_consumed_position(&self, stream: &StreamId) -> Result<Option<u64>>;
}

/// Committed positions per (stream, consumer group), held in memory
#[derive(Debug, Default)]
pub struct ConsumerOffsets {
    offsets: RwLock<HashMap<StreamId, HashMap<String, u64>>>,
}

impl ConsumerOffsets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `group` has consumed `stream` up to `position`.
    ///
    /// Commits never move a group backwards.
    pub fn commit(&self, group: &str, stream: &StreamId, position: u64) {
        let mut offsets = self.offsets.write();
        let committed = offsets
            .entry(stream.clone())
            .or_default()
            .entry(group.to_string())
            .or_insert(position);
        *committed = (*committed).max(position);

        debug!(
            group = %group,
            stream = %stream,
            position = *committed,
            "Committed consumer position"
        );
    }

    /// Forget `group` on every stream.
    pub fn remove_group(&self, group: &str) {
        let mut offsets = self.offsets.write();
        for groups in offsets.values_mut() {
            groups.remove(group);
        }
        offsets.retain(|_, groups| !groups.is_empty());
    }

    pub fn committed(&self, group: &str, stream: &StreamId) -> Option<u64> {
        self.offsets
            .read()
            .get(stream)
            .and_then(|groups| groups.get(group))
            .copied()
    }
}

#[async_trait]
impl ConsumedPositionSource for ConsumerOffsets {
    async fn min_consumed_position(&self, stream: &StreamId) -> Result<Option<u64>> {
        Ok(self
            .offsets
            .read()
            .get(stream)
            .and_then(|groups| groups.values().min().copied()))
    }
}
