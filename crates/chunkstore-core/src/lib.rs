//! chunkstore core types
//!
//! Value types shared by the chunk storage engine and its callers:
//! the message frame codec, the decoded `MessageRecord`, and the `ChunkInfo`
//! diagnostics snapshot.

pub mod chunk;
pub mod error;
pub mod record;

pub use chunk::ChunkInfo;
pub use error::{Error, Result};
pub use record::{
    decode_frame, encode_frame, frame_len, peek_frame_len, DecodedFrame, MessageRecord,
    FRAME_OVERHEAD, MAX_PAYLOAD_SIZE,
};
