//! # genwire - generation transport core for LLM clients
//!
//! genwire holds the provider-independent half of a multi-provider LLM client:
//! the part that moves a generation request over HTTP and turns the answer,
//! synchronous or streamed, into one normalized result.
//!
//! ## Layers
//!
//! - **Retrying transport** ([`retry`]): replays requests on transient failures,
//!   honoring `Retry-After`.
//! - **Stream decoder** ([`streaming::sse`]): event-stream lines to typed packets.
//! - **Fragment accumulator** ([`streaming::accumulator`]): packets to fragments,
//!   folded into a [`types::GenResult`].
//! - **Dispatcher** ([`execution::Dispatcher`]): one call end to end, including
//!   error classification.
//! - **Reasoning tags** ([`streaming::reasoning`]): inline `<think>` spans moved into
//!   thinking, in both modes.
//! - **Continuable errors** ([`execution::continuable`]): options a provider ignores
//!   are returned next to the result instead of failing the call.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use genwire::prelude::*;
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), LlmError> {
//!     let config = ProviderConfig::new("openai", "https://api.openai.com/v1")
//!         .api_key_from_env("OPENAI_API_KEY")?
//!         .with_model("gpt-4o-mini")
//!         .with_auth_help_url("https://platform.openai.com/api-keys");
//!     let client = OpenAiCompatibleClient::new(config)?;
//!
//!     let cancel = CancellationToken::new();
//!     let messages = [Message::user("Say hello")];
//!     let mut stream = client
//!         .gen_stream(&cancel, &messages, &GenOptions::new().with_top_k(5))
//!         .await?;
//!     while let Some(fragment) = stream.next().await {
//!         print!("{}", fragment.text);
//!     }
//!     let output = stream.finish().await?;
//!     if let Some(ignored) = output.warning() {
//!         eprintln!("{ignored}");
//!     }
//!     println!("\n{}", output.result.usage);
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod defaults;
pub mod encoding;
pub mod error;
pub mod execution;
pub mod providers;
pub mod retry;
pub mod streaming;
pub mod types;

pub use config::{HttpConfig, ProviderConfig};
pub use error::{ErrorCategory, LlmError, TransportError, TransportErrorKind, UnsupportedFeatures};

/// Common imports.
pub mod prelude {
    pub use crate::config::{HttpConfig, ProviderConfig};
    pub use crate::error::{ErrorCategory, LlmError, UnsupportedFeatures};
    pub use crate::execution::{Dispatcher, ErrorShapes, GenRequest, Prepared, RequestIssues};
    pub use crate::providers::openai_compatible::OpenAiCompatibleClient;
    pub use crate::streaming::{GenStream, PacketUpdate, ReasoningTags, StreamAdapter};
    pub use crate::types::{
        ContentItem, FinishReason, Fragment, GenOptions, GenOutput, GenResult, Message, Role,
        RateLimit, RateLimitKind, ToolCall, ToolDef, Usage,
    };
    pub use tokio_util::sync::CancellationToken;
}
