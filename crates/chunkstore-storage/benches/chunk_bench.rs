//! Chunk Performance Benchmarks
//!
//! ## What We Benchmark
//!
//! ### 1. Append (`bench_append`)
//! - Messages/second through `ChunkManager::append`, including rollover
//! - Every append is synced before it returns, so this measures the disk's
//!   sync latency as much as the engine
//!
//! ### 2. Sequential Read (`bench_read_messages`)
//! - Messages/second decoding a stream from the start, across chunk boundaries
//!
//! ### 3. Position Lookup (`bench_resolve`)
//! - Binary search over the chunk list at several depths
//!
//! ## Running Benchmarks
//!
//! ```bash
//! cargo bench -p chunkstore-storage
//! cargo bench -p chunkstore-storage --bench chunk_bench read_messages
//! ```

use chunkstore_storage::{ChunkManager, FileNamingStrategy};
use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};
use tempfile::TempDir;

const CHUNK_CAPACITY: u64 = 1024 * 1024;

fn open_manager(dir: &TempDir) -> ChunkManager {
    ChunkManager::open("bench/0", dir.path(), FileNamingStrategy::default(), CHUNK_CAPACITY)
        .unwrap()
}

fn filled_manager(dir: &TempDir, count: u64, payload_size: usize) -> ChunkManager {
    let manager = open_manager(dir);
    let payload = vec![b'x'; payload_size];
    for _ in 0..count {
        manager.append(&payload).unwrap();
    }
    manager
}

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");
    group.sample_size(10);

    for payload_size in [128usize, 4096] {
        let count = 200u64;
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(
            BenchmarkId::new("payload_bytes", payload_size),
            &payload_size,
            |b, &size| {
                let payload = vec![b'x'; size];
                b.iter_batched(
                    || TempDir::new().unwrap(),
                    |dir| {
                        let manager = open_manager(&dir);
                        for _ in 0..count {
                            black_box(manager.append(&payload).unwrap());
                        }
                    },
                    BatchSize::PerIteration,
                );
            },
        );
    }

    group.finish();
}

fn bench_read_messages(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_messages");

    for count in [1000u64, 10_000] {
        let dir = TempDir::new().unwrap();
        let manager = filled_manager(&dir, count, 1024);

        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::new("messages", count), &manager, |b, manager| {
            b.iter(|| {
                let records = manager.read_messages(0, count as usize).unwrap();
                black_box(records.len());
            });
        });
    }

    group.finish();
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");

    let dir = TempDir::new().unwrap();
    let manager = filled_manager(&dir, 20_000, 1024);
    let end = manager.end_position();

    for percent in [0u64, 50, 90] {
        let position = end * percent / 100;
        group.bench_with_input(BenchmarkId::new("percent", percent), &position, |b, &pos| {
            b.iter(|| black_box(manager.resolve(pos).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_append, bench_read_messages, bench_resolve);
criterion_main!(benches);
