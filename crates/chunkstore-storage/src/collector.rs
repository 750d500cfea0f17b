//! Retention Collector
//!
//! Periodically asks the configured [`DeleteMessageStrategy`] which chunks of
//! each stream may go, and removes them.
//!
//! ## One Pass
//!
//! ```text
//! for each open stream:
//!     max_consumed = min committed position over consumer groups
//!                    (stream start position if no group consumes it)
//!     for chunk in strategy.allow_delete_chunks(stream, max_consumed):
//!         stream.remove(chunk)     ← failures are logged, pass continues
//! ```
//!
//! Removal is monotonic: a chunk detached from its stream is never re-added,
//! even if deleting its file fails. A second pass with no new consumption
//! therefore deletes nothing.
//!
//! Strategy evaluation and file deletion touch the filesystem synchronously,
//! so each stream's removals run on the blocking thread pool.
//!
//! ## Background Task
//!
//! [`RetentionCollector::spawn`] runs passes on a `tokio::time::interval` and
//! returns a [`CollectorHandle`]. `shutdown()` stops the loop between passes
//! and waits for the task, so a pass is never cut off mid-removal.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::manager::ChunkManager;
use crate::metrics;
use crate::offsets::ConsumedPositionSource;
use crate::retention::DeleteMessageStrategy;
use crate::store::{ChunkStore, StreamId};

/// Outcome of one collector pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub streams_scanned: usize,
    pub chunks_deleted: usize,
    pub failures: usize,
}

/// Drives retention for every stream of a [`ChunkStore`]
pub struct RetentionCollector {
    store: Arc<ChunkStore>,
    strategy: Arc<dyn DeleteMessageStrategy>,
    offsets: Arc<dyn ConsumedPositionSource>,
    interval: Duration,
}

impl RetentionCollector {
    pub fn new(
        store: Arc<ChunkStore>,
        strategy: Arc<dyn DeleteMessageStrategy>,
        offsets: Arc<dyn ConsumedPositionSource>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            strategy,
            offsets,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run a single pass over all open streams.
    pub async fn run_once(&self) -> RetentionReport {
        let mut report = RetentionReport::default();

        for (stream, manager) in self.store.streams() {
            report.streams_scanned += 1;

            let max_consumed = match self.max_consumed_position(&stream, &manager).await {
                Ok(position) => position,
                Err(e) => {
                    error!(
                        stream = %stream,
                        error = %e,
                        "Failed to read consumer positions, skipping stream"
                    );
                    metrics::RETENTION_FAILURES_TOTAL
                        .with_label_values(&[manager.name()])
                        .inc();
                    report.failures += 1;
                    continue;
                }
            };

            let strategy = Arc::clone(&self.strategy);
            let label = manager.name().to_string();
            let task_stream = stream.clone();
            let collected = tokio::task::spawn_blocking(move || {
                collect_stream(&task_stream, &manager, strategy.as_ref(), max_consumed)
            })
            .await;

            let (deleted, failed) = match collected {
                Ok(counts) => counts,
                Err(e) => {
                    error!(stream = %stream, error = %e, "Retention task for stream failed");
                    (0, 1)
                }
            };
            metrics::RETENTION_FAILURES_TOTAL
                .with_label_values(&[&label])
                .inc_by(failed as u64);
            report.chunks_deleted += deleted;
            report.failures += failed;
        }

        metrics::RETENTION_PASSES_TOTAL.inc();

        if report.chunks_deleted > 0 || report.failures > 0 {
            info!(
                policy = self.strategy.name(),
                streams = report.streams_scanned,
                deleted = report.chunks_deleted,
                failures = report.failures,
                "Retention pass completed"
            );
        } else {
            debug!(
                policy = self.strategy.name(),
                streams = report.streams_scanned,
                "Retention pass found nothing to delete"
            );
        }

        report
    }

    async fn max_consumed_position(
        &self,
        stream: &StreamId,
        manager: &ChunkManager,
    ) -> Result<u64> {
        let position = self.offsets.min_consumed_position(stream).await?;
        // Nothing is consumed until some group commits
        Ok(position.unwrap_or_else(|| manager.start_position()))
    }

    /// Run passes every `interval` until the returned handle is shut down.
    pub fn spawn(self: Arc<Self>) -> CollectorHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(
                policy = self.strategy.name(),
                interval_ms = self.interval.as_millis() as u64,
                "Retention collector started"
            );

            let mut passes: u64 = 0;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_once().await;
                        passes += 1;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            info!(passes, "Retention collector stopped");
        });

        CollectorHandle {
            shutdown_tx,
            task: Some(task),
        }
    }
}

/// Delete what `strategy` allows from one stream.
///
/// Returns `(deleted, failed)`. Blocking: call from the blocking pool.
fn collect_stream(
    stream: &StreamId,
    manager: &ChunkManager,
    strategy: &dyn DeleteMessageStrategy,
    max_consumed: u64,
) -> (usize, usize) {
    let mut deleted = 0;
    let mut failed = 0;

    for chunk in strategy.allow_delete_chunks(manager, max_consumed) {
        match manager.remove(&chunk) {
            Ok(()) => deleted += 1,
            Err(e) => {
                failed += 1;
                warn!(
                    stream = %stream,
                    chunk = chunk.number(),
                    error = %e,
                    "Failed to delete chunk"
                );
            }
        }
    }

    (deleted, failed)
}

/// Handle to a running collector task
pub struct CollectorHandle {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl CollectorHandle {
    /// Stop the collector after its current pass and wait for it to exit.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "Retention collector task failed");
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }
}
