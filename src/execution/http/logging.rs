//! Request/response logging.

use super::transport::{HttpRequest, HttpResponse, HttpTransport};
use crate::error::LlmError;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use std::time::Instant;
use tracing::Instrument;

/// Wraps a transport and logs every round trip under a `http` span carrying a
/// fresh request id.
#[derive(Debug, Clone)]
pub struct LoggingTransport<T> {
    inner: T,
}

impl<T> LoggingTransport<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[async_trait]
impl<T: HttpTransport> HttpTransport for LoggingTransport<T> {
    async fn round_trip(&self, request: HttpRequest) -> Result<HttpResponse, LlmError> {
        let request_id = uuid::Uuid::new_v4();
        let span = tracing::debug_span!(
            "http",
            %request_id,
            method = %request.method,
            url = %request.url,
        );
        let body_len = request.body.len();
        let start = Instant::now();

        let outcome = async {
            tracing::debug!(body_len = ?body_len, "sending request");
            self.inner.round_trip(request).await
        }
        .instrument(span.clone())
        .await;

        let duration_ms = start.elapsed().as_millis() as u64;
        span.in_scope(|| match outcome {
            Ok(resp) => {
                let content_type = resp.header(CONTENT_TYPE.as_str()).unwrap_or("").to_string();
                tracing::debug!(status = resp.status, duration_ms, %content_type, "received response");
                Ok(count_body(resp, request_id))
            }
            Err(err) => {
                tracing::debug!(duration_ms, error = %err, "request failed");
                Err(err)
            }
        })
    }
}

// Log the body size once the caller has consumed it.
fn count_body(resp: HttpResponse, request_id: uuid::Uuid) -> HttpResponse {
    let HttpResponse {
        status,
        headers,
        mut body,
    } = resp;
    let counted = async_stream::stream! {
        let mut total = 0usize;
        let start = Instant::now();
        while let Some(chunk) = body.next().await {
            if let Ok(chunk) = &chunk {
                total += chunk.len();
            }
            let failed = chunk.is_err();
            yield chunk;
            if failed {
                tracing::debug!(%request_id, bytes = total, "response body aborted");
                return;
            }
        }
        tracing::debug!(
            %request_id,
            bytes = total,
            read_ms = start.elapsed().as_millis() as u64,
            "response body consumed"
        );
    };
    HttpResponse {
        status,
        headers,
        body: Box::pin(counted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;
    use reqwest::header::{HeaderMap, HeaderValue};
    use tracing_test::traced_test;

    struct Fixed;

    #[async_trait]
    impl HttpTransport for Fixed {
        async fn round_trip(&self, _request: HttpRequest) -> Result<HttpResponse, LlmError> {
            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            Ok(HttpResponse::from_bytes(200, headers, "{\"ok\":true}"))
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn logs_status_and_body_size() {
        let transport = LoggingTransport::new(Fixed);
        let resp = transport
            .round_trip(HttpRequest::new(Method::POST, "http://localhost/v1/chat"))
            .await
            .unwrap();
        assert_eq!(resp.status, 200);
        let body = resp.bytes().await.unwrap();
        assert_eq!(body.len(), 11);

        assert!(logs_contain("received response"));
        assert!(logs_contain("status=200"));
        assert!(logs_contain("request_id="));
        assert!(logs_contain("bytes=11"));
    }
}
