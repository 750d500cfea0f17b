#![no_main]

use chunkstore_core::{decode_frame, encode_frame, peek_frame_len};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Frame decoding runs on bytes read back from disk after a crash.
    // Tests handling of:
    // - Torn frames (truncated body or trailing length)
    // - Lengths that point past the buffer
    // - Bit flips caught by the CRC

    if let Ok(Some(len)) = peek_frame_len(data) {
        if let Ok(frame) = decode_frame(data) {
            assert_eq!(frame.frame_len, len);
            assert!(frame.frame_len <= data.len());

            // A frame that decodes must re-encode to the same bytes
            let encoded = encode_frame(frame.timestamp, &frame.payload);
            assert_eq!(&encoded[..], &data[..frame.frame_len]);
        }
    } else {
        let _ = decode_frame(data);
    }
});
