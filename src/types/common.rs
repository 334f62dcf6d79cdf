//! Shared value types: roles, usage counters and finish reasons.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Conversation role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    #[default]
    Assistant,
    Tool,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Prompt tokens
    pub input_tokens: u64,
    /// Generated tokens
    pub output_tokens: u64,
    /// Tokens spent on reasoning (included in `output_tokens` by most providers)
    pub reasoning_tokens: u64,
    /// Prompt tokens served from the provider's cache
    pub cached_tokens: u64,
}

impl Usage {
    pub const fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            reasoning_tokens: 0,
            cached_tokens: 0,
        }
    }

    pub const fn with_reasoning_tokens(mut self, tokens: u64) -> Self {
        self.reasoning_tokens = tokens;
        self
    }

    pub const fn with_cached_tokens(mut self, tokens: u64) -> Self {
        self.cached_tokens = tokens;
        self
    }

    pub const fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "in: {} (cached {}), out: {}",
            self.input_tokens, self.cached_tokens, self.output_tokens
        )
    }
}

/// What a rate limit counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitKind {
    Requests,
    Tokens,
}

/// One rate limit window as reported by the provider's response headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub kind: RateLimitKind,
    pub limit: u64,
    pub remaining: u64,
    /// When the window resets, if the provider said.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset: Option<DateTime<Utc>>,
}

/// Reason why the model stopped generating tokens.
///
/// Provider-specific values are mapped by the adapters:
/// - OpenAI: `stop`, `length`, `tool_calls`, `content_filter`
/// - Anthropic: `end_turn`, `max_tokens`, `tool_use`, `stop_sequence`
/// - Gemini: `STOP`, `MAX_TOKENS`, `SAFETY`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The model completed its turn.
    Stop,
    /// The output hit the token limit.
    Length,
    /// The model requested one or more tool calls.
    ToolCalls,
    /// The output was blocked by a content filter.
    ContentFilter,
    /// A caller-provided stop sequence was produced.
    StopSequence,
    /// The provider reported a generation error.
    Error,
    /// A provider-specific reason, kept verbatim.
    Other(String),
    /// The provider never sent a finish reason (e.g. the stream was cut).
    #[default]
    Unknown,
}

impl FinishReason {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}
