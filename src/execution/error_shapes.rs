//! Provider error payloads.
//!
//! A provider declares the JSON shapes its server uses to report errors, in the
//! order they should be tried. The first shape that decodes and yields a
//! message wins.

use crate::encoding::decode_json;
use crate::error::LlmError;
use serde::de::DeserializeOwned;
use std::fmt;

/// A JSON error payload a provider may return.
pub trait ErrorShape: DeserializeOwned {
    /// The human readable message, or `None` when the payload carried nothing useful.
    fn message(&self) -> Option<String>;

    /// A status carried inside the payload itself, for errors sent in a 200 stream.
    fn status_hint(&self) -> Option<u16> {
        None
    }
}

/// An error payload decoded through one of the registered shapes.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedError {
    pub message: String,
    pub status_hint: Option<u16>,
    pub details: serde_json::Value,
}

impl DecodedError {
    /// Whether the server is telling us to slow down.
    pub fn indicates_rate_limit(&self) -> bool {
        if self.status_hint == Some(429) {
            return true;
        }
        let lower = self.message.to_ascii_lowercase();
        ["rate limit", "rate_limit", "ratelimit", "too many requests"]
            .iter()
            .any(|needle| lower.contains(needle))
    }

    pub fn into_api_error(self, code: u16) -> LlmError {
        LlmError::api_error_with_details(code, self.message, self.details)
    }
}

type ShapeDecoder = fn(&[u8]) -> Option<DecodedError>;

/// The ordered set of error shapes of one provider.
#[derive(Clone, Default)]
pub struct ErrorShapes {
    decoders: Vec<(&'static str, ShapeDecoder)>,
}

impl ErrorShapes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` after the shapes already present.
    pub fn with<T: ErrorShape>(mut self) -> Self {
        self.decoders
            .push((std::any::type_name::<T>(), decode_shape::<T>));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Try every shape in order.
    pub fn decode(&self, body: &[u8]) -> Option<DecodedError> {
        self.decoders.iter().find_map(|(_, decode)| decode(body))
    }
}

impl fmt::Debug for ErrorShapes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.decoders.iter().map(|(name, _)| name))
            .finish()
    }
}

// Error payloads are decoded leniently: a server adding a field to its error
// object must not hide the error itself.
fn decode_shape<T: ErrorShape>(body: &[u8]) -> Option<DecodedError> {
    let shape: T = decode_json(body, true).ok()?;
    let message = shape.message().filter(|m| !m.is_empty())?;
    Some(DecodedError {
        message,
        status_hint: shape.status_hint(),
        details: serde_json::from_slice(body).unwrap_or(serde_json::Value::Null),
    })
}
