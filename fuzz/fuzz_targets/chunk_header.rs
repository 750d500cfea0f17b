#![no_main]

use chunkstore_storage::chunk::{ChunkFooter, ChunkHeader};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Header and footer decoding must reject garbage without panicking.
    if let Ok(header) = ChunkHeader::decode(data) {
        assert_eq!(ChunkHeader::decode(&header.encode()), Ok(header));
    }
    if let Ok(Some(footer)) = ChunkFooter::decode(data) {
        assert_eq!(ChunkFooter::decode(&footer.encode()), Ok(Some(footer)));
    }
});
