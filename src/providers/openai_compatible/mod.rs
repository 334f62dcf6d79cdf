//! OpenAI-compatible chat completions adapter.

pub mod client;
pub mod rate_limits;
pub mod request;
pub mod response;
pub mod streaming;
pub mod types;

pub use client::{OpenAiCompatibleClient, error_shapes};
pub use rate_limits::parse_rate_limits;
pub use streaming::OpenAiStreamAdapter;
pub use types::{ChatRequest, ChatResponse, ChatStreamChunk, ModelInfo};
