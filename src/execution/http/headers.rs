//! HTTP header building.

use crate::error::{LlmError, TransportErrorKind};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;

/// Builder for outbound request headers.
#[derive(Debug, Default)]
pub struct HttpHeaderBuilder {
    headers: HeaderMap,
}

impl HttpHeaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add Bearer token authorization
    pub fn with_bearer_auth(mut self, token: &str) -> Result<Self, LlmError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| LlmError::ConfigurationError(format!("invalid API key format: {e}")))?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(self)
    }

    pub fn with_json_content_type(mut self) -> Self {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self
    }

    /// Ask for an event stream instead of a JSON document.
    pub fn with_event_stream_accept(mut self) -> Self {
        self.headers
            .insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        self
    }

    /// Add a custom header
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, LlmError> {
        let (name, value) = parse_header(name, value)?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Add every header of `custom`, overriding earlier values.
    pub fn with_custom_headers(mut self, custom: &HashMap<String, String>) -> Result<Self, LlmError> {
        for (name, value) in custom {
            let (name, value) = parse_header(name, value)?;
            self.headers.insert(name, value);
        }
        Ok(self)
    }

    pub fn build(self) -> HeaderMap {
        self.headers
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), LlmError> {
    let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
        LlmError::transport(
            TransportErrorKind::InvalidHeader,
            format!("invalid header name {name:?}: {e}"),
        )
    })?;
    let header_value = HeaderValue::from_str(value).map_err(|e| {
        LlmError::transport(
            TransportErrorKind::InvalidHeader,
            format!("invalid value for header {name:?}: {e}"),
        )
    })?;
    Ok((header_name, header_value))
}
