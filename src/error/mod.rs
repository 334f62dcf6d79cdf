//! Error Handling Module
//!
//! Core error types for the transport core:
//! - `LlmError`, the single error returned by every call
//! - `TransportError` and its structured `TransportErrorKind`
//! - `UnsupportedFeatures`, the continuable (non-fatal) warning
//!
//! # Example
//!
//! ```rust,ignore
//! use genwire::error::{ErrorCategory, LlmError};
//!
//! let error = LlmError::api_error(503, "overloaded");
//! assert_eq!(error.category(), ErrorCategory::Server);
//! assert!(error.is_retryable());
//! ```

pub mod types;

pub use types::*;
