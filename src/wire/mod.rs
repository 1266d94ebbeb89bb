//! Wire codec for chat event streams.

pub mod decoder;
pub mod encoder;
pub mod sse;

pub use decoder::{decode_frames, FrameDecoder, RawFrame};
pub use encoder::{encode_event, encode_stream};
pub use sse::{SseBuffer, SseFrame};
