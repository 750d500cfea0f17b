//! Prometheus Metrics
//!
//! Counters for the append path, chunk rollover and retention. All series are
//! labelled by stream (`<topic>/<queue>`).
//!
//! Metrics are recorded unconditionally; [`init`] registers them with
//! [`REGISTRY`] so [`encode_text`] can render them.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Once;
use tracing::warn;

static INIT: Once = Once::new();

lazy_static! {
    /// Global Prometheus metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Append Metrics
    // ============================================================================

    /// Messages appended
    pub static ref APPENDED_MESSAGES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("chunkstore_appended_messages_total", "Total messages appended"),
        &["stream"]
    ).expect("metric can be created");

    /// Framed bytes appended
    pub static ref APPENDED_BYTES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("chunkstore_appended_bytes_total", "Total framed bytes appended"),
        &["stream"]
    ).expect("metric can be created");

    /// Chunks sealed and replaced by a successor
    pub static ref CHUNKS_ROLLED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("chunkstore_chunks_rolled_total", "Total chunk rollovers"),
        &["stream"]
    ).expect("metric can be created");

    // ============================================================================
    // Retention Metrics
    // ============================================================================

    /// Chunks deleted by retention
    pub static ref CHUNKS_DELETED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("chunkstore_chunks_deleted_total", "Total chunks deleted"),
        &["stream"]
    ).expect("metric can be created");

    /// Chunk deletions that failed
    pub static ref RETENTION_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("chunkstore_retention_failures_total", "Total failed chunk deletions"),
        &["stream"]
    ).expect("metric can be created");

    /// Completed collector passes
    pub static ref RETENTION_PASSES_TOTAL: IntCounter = IntCounter::new(
        "chunkstore_retention_passes_total",
        "Total retention collector passes"
    ).expect("metric can be created");
}

/// Register every metric with [`REGISTRY`].
/// Can be called multiple times safely (idempotent)
pub fn init() {
    INIT.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(APPENDED_MESSAGES_TOTAL.clone()),
            Box::new(APPENDED_BYTES_TOTAL.clone()),
            Box::new(CHUNKS_ROLLED_TOTAL.clone()),
            Box::new(CHUNKS_DELETED_TOTAL.clone()),
            Box::new(RETENTION_FAILURES_TOTAL.clone()),
            Box::new(RETENTION_PASSES_TOTAL.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                warn!(error = %e, "Failed to register metric");
            }
        }
    });
}

/// Render the registry in the Prometheus text format.
pub fn encode_text() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        init();
        init();
    }

    #[test]
    fn test_encode_text_lists_registered_series() {
        init();
        APPENDED_MESSAGES_TOTAL
            .with_label_values(&["metrics-test/0"])
            .inc();

        let text = encode_text().unwrap();
        assert!(text.contains("chunkstore_appended_messages_total"));
        assert!(text.contains("metrics-test/0"));
    }
}
