//! Error type definitions.

use std::fmt;
use thiserror::Error;

/// Structured classification of a failed HTTP round trip.
///
/// The retry classifier works on these kinds only. Message text is never inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The redirect limit was exhausted.
    TooManyRedirects,
    /// The URL uses a scheme other than http/https.
    UnsupportedScheme,
    /// A header name or value could not be encoded.
    InvalidHeader,
    /// The request could not be built (malformed URL, body, ...).
    InvalidRequest,
    /// The server certificate is not trusted.
    UntrustedCertificate,
    /// The connection could not be established.
    Connect,
    /// The request or a body read timed out.
    Timeout,
    /// Reading the response body failed.
    Body,
    /// Any other network failure.
    Network,
}

impl TransportErrorKind {
    /// Permanent kinds never succeed on replay.
    pub const fn is_permanent(self) -> bool {
        matches!(
            self,
            Self::TooManyRedirects
                | Self::UnsupportedScheme
                | Self::InvalidHeader
                | Self::InvalidRequest
                | Self::UntrustedCertificate
        )
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TooManyRedirects => "too many redirects",
            Self::UnsupportedScheme => "unsupported URL scheme",
            Self::InvalidHeader => "invalid header",
            Self::InvalidRequest => "invalid request",
            Self::UntrustedCertificate => "certificate is not trusted",
            Self::Connect => "connection failed",
            Self::Timeout => "timed out",
            Self::Body => "body read failed",
            Self::Network => "network error",
        };
        f.write_str(s)
    }
}

/// A failed HTTP round trip with the original cause preserved.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

/// Options the target provider or model cannot honor.
///
/// Returned next to a valid result: the call succeeded but these options were ignored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported options: {}", .names.join(", "))]
pub struct UnsupportedFeatures {
    pub names: Vec<String>,
}

impl UnsupportedFeatures {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// Whether `name` is one of the ignored options.
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }
}

/// Error category, used to group errors for handling decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Authentication,
    RateLimit,
    Client,
    Server,
    Parsing,
    Validation,
    Unsupported,
    Configuration,
    Cancelled,
    Internal,
}

/// The error returned by every call of the transport core.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The HTTP round trip itself failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The server reported an error, decoded from one of the provider's error shapes.
    #[error("API error ({code}): {message}")]
    ApiError {
        code: u16,
        message: String,
        details: Option<serde_json::Value>,
    },

    /// A response body or stream line could not be decoded.
    #[error("parse error: {0}")]
    ParseError(String),

    /// A response decoded only after ignoring fields the schema does not know.
    #[error("unexpected fields in {type_name}: {}", .fields.join(", "))]
    UnknownFields {
        type_name: &'static str,
        fields: Vec<String>,
    },

    /// The event stream was malformed or interrupted.
    #[error("stream error: {0}")]
    StreamError(String),

    /// Request construction failed; carries every hard error and every ignored option.
    #[error("invalid request: {}", join_issues(.errors, .unsupported))]
    InvalidRequest {
        errors: Vec<String>,
        unsupported: Vec<String>,
    },

    /// Options were ignored; only surfaced as an error when the caller asks for strictness.
    #[error(transparent)]
    Unsupported(#[from] UnsupportedFeatures),

    #[error("configuration error: {0}")]
    ConfigurationError(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    InternalError(String),
}

fn join_issues(errors: &[String], unsupported: &[String]) -> String {
    let mut parts: Vec<String> = errors.to_vec();
    if !unsupported.is_empty() {
        parts.push(format!("unsupported options: {}", unsupported.join(", ")));
    }
    parts.join("; ")
}

impl LlmError {
    pub fn api_error(code: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn api_error_with_details(
        code: u16,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self::ApiError {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn transport(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self::Transport(TransportError::new(kind, message))
    }

    /// HTTP status attached to the error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ApiError { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Transport kind attached to the error, if any.
    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            Self::Transport(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Whether replaying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => !e.kind.is_permanent(),
            Self::ApiError { code, .. } => is_retryable_status(*code),
            _ => false,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport(_) => ErrorCategory::Network,
            Self::ApiError { code, .. } => match *code {
                401 | 403 => ErrorCategory::Authentication,
                429 => ErrorCategory::RateLimit,
                400..=499 => ErrorCategory::Client,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Internal,
            },
            Self::ParseError(_) | Self::UnknownFields { .. } | Self::StreamError(_) => {
                ErrorCategory::Parsing
            }
            Self::InvalidRequest { .. } => ErrorCategory::Validation,
            Self::Unsupported(_) => ErrorCategory::Unsupported,
            Self::ConfigurationError(_) => ErrorCategory::Configuration,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::InternalError(_) => ErrorCategory::Internal,
        }
    }
}

/// Statuses worth replaying: rate limiting and gateway failures.
pub const fn is_retryable_status(code: u16) -> bool {
    matches!(code, 429 | 502 | 503 | 504)
}
