//! Append messages to a stream, roll through several chunks, and read them back
//!
//! Run with:
//! ```bash
//! cargo run -p chunkstore-storage --example append_and_read
//! ```

use chunkstore_storage::{ChunkStore, StorageConfig, StreamId};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let data_dir = std::env::temp_dir().join("chunkstore_demo");
    let _ = std::fs::remove_dir_all(&data_dir);

    let store = ChunkStore::new(StorageConfig {
        data_dir: data_dir.clone(),
        chunk_capacity: 4096, // small chunks so the demo rolls
        ..Default::default()
    })?;

    let stream = StreamId::new("orders", 0);
    let mut first = None;
    for i in 0..100 {
        let payload = format!(r#"{{"order_id": {}, "amount": {}.99}}"#, i, i * 3);
        let result = store.append(&stream, payload.as_bytes())?;
        first.get_or_insert(result.position);
    }

    let manager = store.get_or_open(&stream)?;
    println!(
        "Stream {} spans positions {}..{}",
        stream,
        manager.start_position(),
        manager.end_position()
    );
    for info in manager.chunk_infos() {
        println!(
            "  {}  [{}, {})  completed={}",
            info.file_name, info.data_start, info.data_end, info.completed
        );
    }

    let records = manager.read_messages(first.unwrap_or(0), 3)?;
    for record in records {
        println!(
            "  @{} {}",
            record.position,
            String::from_utf8_lossy(&record.payload)
        );
    }

    store.close_all()?;
    println!("Data left in {}", data_dir.display());
    Ok(())
}
