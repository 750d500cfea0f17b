//! Retention Integration Tests
//!
//! Drive the collector through a `ChunkStore` with real chunk files and check
//! the deletion boundaries of both policies.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chunkstore_storage::{
    build_strategy, ChunkStore, ConsumerOffsets, RetentionCollector, RetentionConfig,
    RetentionPolicy, StorageConfig, StreamId,
};
use tempfile::TempDir;

/// 10-byte payloads frame to exactly one 30-byte chunk each
const CHUNK_CAPACITY: u64 = 30;
const PAYLOAD: [u8; 10] = [7; 10];
const HOUR: Duration = Duration::from_secs(3600);

fn config(dir: &Path, policy: RetentionPolicy, ignore_unconsumed: bool) -> StorageConfig {
    StorageConfig {
        data_dir: dir.to_path_buf(),
        chunk_capacity: CHUNK_CAPACITY,
        retention: RetentionConfig {
            policy,
            collect_interval: Duration::from_millis(20),
            ignore_unconsumed,
        },
        ..Default::default()
    }
}

struct Fixture {
    store: Arc<ChunkStore>,
    offsets: Arc<ConsumerOffsets>,
    collector: Arc<RetentionCollector>,
    stream: StreamId,
}

/// A store with one stream holding `completed` full chunks plus an empty active chunk
fn fixture(dir: &Path, policy: RetentionPolicy, ignore_unconsumed: bool, completed: u64) -> Fixture {
    let config = config(dir, policy, ignore_unconsumed);
    let store = Arc::new(ChunkStore::new(config.clone()).unwrap());
    let stream = StreamId::new("orders", 0);
    for _ in 0..completed {
        store.append(&stream, &PAYLOAD).unwrap();
    }

    let offsets = Arc::new(ConsumerOffsets::new());
    let collector = Arc::new(RetentionCollector::new(
        Arc::clone(&store),
        build_strategy(&config.retention).unwrap(),
        Arc::clone(&offsets) as Arc<dyn chunkstore_storage::ConsumedPositionSource>,
        config.retention.collect_interval,
    ));

    Fixture {
        store,
        offsets,
        collector,
        stream,
    }
}

fn remaining_chunks(fixture: &Fixture) -> Vec<u64> {
    fixture
        .store
        .get(&fixture.stream)
        .unwrap()
        .chunks()
        .iter()
        .map(|c| c.number())
        .collect()
}

fn set_age(path: &Path, age: Duration) {
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - age).unwrap();
}

#[tokio::test]
async fn test_by_count_deletes_two_oldest_of_five() {
    let temp_dir = TempDir::new().unwrap();
    let f = fixture(
        temp_dir.path(),
        RetentionPolicy::ByCount { max_chunk_count: 3 },
        false,
        5,
    );
    f.offsets.commit("billing", &f.stream, 5 * CHUNK_CAPACITY);

    let report = f.collector.run_once().await;
    assert_eq!(report.chunks_deleted, 2);
    assert_eq!(remaining_chunks(&f), vec![2, 3, 4, 5]);
    assert!(!temp_dir.path().join("orders/0/chunk-000000000").exists());
    assert!(!temp_dir.path().join("orders/0/chunk-000000001").exists());
    assert!(temp_dir.path().join("orders/0/chunk-000000002").exists());
}

#[tokio::test]
async fn test_by_count_at_limit_deletes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let f = fixture(
        temp_dir.path(),
        RetentionPolicy::ByCount { max_chunk_count: 3 },
        false,
        3,
    );
    f.offsets.commit("billing", &f.stream, 3 * CHUNK_CAPACITY);

    assert_eq!(f.collector.run_once().await.chunks_deleted, 0);
    assert_eq!(remaining_chunks(&f), vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn test_by_time_boundary() {
    let temp_dir = TempDir::new().unwrap();
    let f = fixture(
        temp_dir.path(),
        RetentionPolicy::ByTime {
            max_storage_hours: 24,
        },
        false,
        2,
    );
    f.offsets.commit("billing", &f.stream, 2 * CHUNK_CAPACITY);

    let manager = f.store.get(&f.stream).unwrap();
    let chunks = manager.chunks();
    set_age(chunks[0].path(), 23 * HOUR);
    set_age(chunks[1].path(), 23 * HOUR);

    assert_eq!(f.collector.run_once().await.chunks_deleted, 0);

    set_age(chunks[0].path(), 25 * HOUR);
    let report = f.collector.run_once().await;
    assert_eq!(report.chunks_deleted, 1);
    assert_eq!(remaining_chunks(&f), vec![1, 2]);
}

#[tokio::test]
async fn test_unconsumed_chunks_never_deleted() {
    let temp_dir = TempDir::new().unwrap();
    let f = fixture(
        temp_dir.path(),
        RetentionPolicy::ByCount { max_chunk_count: 1 },
        false,
        5,
    );

    // Slowest group is partway through chunk 1
    f.offsets.commit("fast", &f.stream, 5 * CHUNK_CAPACITY);
    f.offsets.commit("slow", &f.stream, CHUNK_CAPACITY + 10);

    assert_eq!(f.collector.run_once().await.chunks_deleted, 0);

    f.offsets.commit("slow", &f.stream, 4 * CHUNK_CAPACITY);
    assert_eq!(f.collector.run_once().await.chunks_deleted, 3);
    assert_eq!(remaining_chunks(&f), vec![3, 4, 5]);
}

#[tokio::test]
async fn test_ignore_unconsumed_deletes_without_consumers() {
    let temp_dir = TempDir::new().unwrap();
    let f = fixture(
        temp_dir.path(),
        RetentionPolicy::ByCount { max_chunk_count: 2 },
        true,
        5,
    );

    assert_eq!(f.collector.run_once().await.chunks_deleted, 3);
    assert_eq!(remaining_chunks(&f), vec![3, 4, 5]);
}

#[tokio::test]
async fn test_second_pass_is_a_no_op() {
    let temp_dir = TempDir::new().unwrap();
    let f = fixture(
        temp_dir.path(),
        RetentionPolicy::ByCount { max_chunk_count: 2 },
        false,
        6,
    );
    f.offsets.commit("billing", &f.stream, 6 * CHUNK_CAPACITY);

    let first = f.collector.run_once().await;
    let second = f.collector.run_once().await;
    assert_eq!(first.chunks_deleted, 4);
    assert_eq!(second.chunks_deleted, 0);
    assert_eq!(second.failures, 0);
}

#[tokio::test]
async fn test_reads_of_deleted_positions_fail() {
    let temp_dir = TempDir::new().unwrap();
    let f = fixture(
        temp_dir.path(),
        RetentionPolicy::ByCount { max_chunk_count: 1 },
        true,
        3,
    );
    f.collector.run_once().await;

    let manager = f.store.get(&f.stream).unwrap();
    let err = manager.read_message(0).unwrap_err();
    assert!(err.is_position_unavailable());
    assert_eq!(manager.start_position(), 2 * CHUNK_CAPACITY);
    assert_eq!(
        manager.read_message(2 * CHUNK_CAPACITY).unwrap().payload.as_ref(),
        &PAYLOAD
    );
}

#[tokio::test]
async fn test_background_collector_runs_until_shutdown() {
    let temp_dir = TempDir::new().unwrap();
    let f = fixture(
        temp_dir.path(),
        RetentionPolicy::ByCount { max_chunk_count: 1 },
        false,
        4,
    );
    let handle = Arc::clone(&f.collector).spawn();

    // Nothing consumed yet
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(remaining_chunks(&f).len(), 5);

    f.offsets.commit("billing", &f.stream, 4 * CHUNK_CAPACITY);
    for _ in 0..100 {
        if remaining_chunks(&f).len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(remaining_chunks(&f), vec![3, 4]);

    handle.shutdown().await;

    // New consumable chunks are left alone once stopped
    f.store.append(&f.stream, &PAYLOAD).unwrap();
    f.offsets.commit("billing", &f.stream, 5 * CHUNK_CAPACITY);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(remaining_chunks(&f), vec![3, 4, 5]);
}
