//! Streaming: event-stream decoding, fragment accumulation, reasoning tags and the
//! caller's handle.

pub mod accumulator;
pub mod handle;
pub mod reasoning;
pub mod sse;

pub use accumulator::{PacketUpdate, StreamAdapter, process_packets};
pub use handle::GenStream;
pub use reasoning::{ReasoningTagAdapter, ReasoningTags, TagSplitter, split_reasoning};
pub use sse::{DecodeOptions, PacketStream, decode_stream};
