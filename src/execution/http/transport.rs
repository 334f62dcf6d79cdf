//! HTTP transport abstraction.
//!
//! Every outbound call goes through [`HttpTransport`]. The reqwest-backed
//! implementation sits at the bottom; retry and logging are layered on top as
//! wrappers implementing the same trait, and tests inject their own.

use crate::error::{LlmError, TransportErrorKind};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use reqwest::Method;
use reqwest::header::HeaderMap;
use std::fmt;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// A fallible stream of body chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, LlmError>> + Send>>;

/// Request body.
pub enum RequestBody {
    Empty,
    /// A body that can be sent any number of times.
    Buffered(Bytes),
    /// A one-shot body; it must be buffered before the request can be replayed.
    Streaming(ByteStream),
}

impl RequestBody {
    pub fn is_replayable(&self) -> bool {
        !matches!(self, Self::Streaming(_))
    }

    /// Collect a streaming body into memory. Replayable bodies are returned as is.
    pub async fn buffer(self) -> Result<Self, LlmError> {
        match self {
            Self::Streaming(stream) => Ok(Self::Buffered(collect(stream).await?)),
            other => Ok(other),
        }
    }

    /// Clone a replayable body. `None` for streaming bodies.
    pub fn try_clone(&self) -> Option<Self> {
        match self {
            Self::Empty => Some(Self::Empty),
            Self::Buffered(b) => Some(Self::Buffered(b.clone())),
            Self::Streaming(_) => None,
        }
    }

    /// Size in bytes, when known up front.
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::Empty => Some(0),
            Self::Buffered(b) => Some(b.len()),
            Self::Streaming(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Buffered(b) => write!(f, "Buffered({} bytes)", b.len()),
            Self::Streaming(_) => f.write_str("Streaming"),
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        Self::Buffered(bytes)
    }
}

/// A single outbound HTTP call.
#[derive(Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: RequestBody,
    /// Cancelling aborts the send, body reads and retry waits.
    pub cancel: CancellationToken,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Clone a request whose body is replayable.
    pub fn try_clone(&self) -> Option<Self> {
        Some(Self {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body.try_clone()?,
            cancel: self.cancel.clone(),
        })
    }
}

/// The response head plus a lazily read body.
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: ByteStream,
}

impl HttpResponse {
    /// A response with an in-memory body.
    pub fn from_bytes(status: u16, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self {
            status,
            headers,
            body: Box::pin(futures::stream::iter([Ok(body)])),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// A header value as text, if present and valid.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Read the whole body.
    pub async fn bytes(self) -> Result<Bytes, LlmError> {
        collect(self.body).await
    }

    /// Read and discard the rest of the body so the connection can be reused.
    pub async fn drain(mut self) -> usize {
        let mut drained = 0;
        while let Some(chunk) = self.body.next().await {
            match chunk {
                Ok(chunk) => drained += chunk.len(),
                Err(_) => break,
            }
        }
        drained
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Pluggable HTTP round tripper.
///
/// Implementations must not interpret the status code: a non-2xx response is
/// still `Ok`. `Err` is reserved for failures where no response was received.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn round_trip(&self, request: HttpRequest) -> Result<HttpResponse, LlmError>;
}

#[async_trait]
impl<T: HttpTransport + ?Sized> HttpTransport for std::sync::Arc<T> {
    async fn round_trip(&self, request: HttpRequest) -> Result<HttpResponse, LlmError> {
        (**self).round_trip(request).await
    }
}

async fn collect(mut stream: ByteStream) -> Result<Bytes, LlmError> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| match e {
            LlmError::Transport(_) | LlmError::Cancelled => e,
            other => LlmError::transport(TransportErrorKind::Body, other.to_string()),
        })?;
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn streaming_body_buffers_into_a_replayable_one() {
        let chunks: Vec<Result<Bytes, LlmError>> =
            vec![Ok(Bytes::from_static(b"{\"a\":")), Ok(Bytes::from_static(b"1}"))];
        let body = RequestBody::Streaming(Box::pin(futures::stream::iter(chunks)));
        assert!(!body.is_replayable());

        let body = body.buffer().await.unwrap();
        assert!(body.is_replayable());
        assert_eq!(body.len(), Some(7));
        assert!(body.try_clone().is_some());
    }

    #[tokio::test]
    async fn drain_consumes_the_whole_body() {
        let resp = HttpResponse::from_bytes(503, HeaderMap::new(), "overloaded");
        assert!(!resp.is_success());
        assert_eq!(resp.drain().await, 10);
    }
}
