//! Transport wrapper that replays failed requests.

use super::policy::{RetryDecision, RetryPolicy};
use crate::error::LlmError;
use crate::execution::http::{HttpRequest, HttpResponse, HttpTransport, RequestBody};
use async_trait::async_trait;

/// Replays requests according to a [`RetryPolicy`].
///
/// The request body is buffered before the first attempt so every replay sends
/// the same bytes. When the budget runs out the last response or error is
/// returned as is, so callers still see the server's final answer.
#[derive(Debug, Clone)]
pub struct RetryingTransport<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T> RetryingTransport<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[async_trait]
impl<T: HttpTransport> HttpTransport for RetryingTransport<T> {
    async fn round_trip(&self, mut request: HttpRequest) -> Result<HttpResponse, LlmError> {
        if !request.body.is_replayable() {
            let body = std::mem::replace(&mut request.body, RequestBody::Empty);
            request.body = body.buffer().await?;
        }
        let cancel = request.cancel.clone();

        let mut attempt = 0;
        loop {
            let replay = request
                .try_clone()
                .ok_or_else(|| LlmError::InternalError("request body is not replayable".into()))?;
            let outcome = self.inner.round_trip(replay).await;

            let backoff = match self.policy.decide(
                attempt,
                cancel.is_cancelled(),
                &outcome,
                chrono::Utc::now(),
            ) {
                RetryDecision::Stop => return outcome,
                RetryDecision::Retry { backoff } => backoff,
            };
            match outcome {
                Ok(resp) => {
                    tracing::debug!(attempt, status = resp.status, ?backoff, url = %request.url, "retrying request");
                    resp.drain().await;
                }
                Err(err) => {
                    tracing::debug!(attempt, error = %err, ?backoff, url = %request.url, "retrying request");
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LlmError::Cancelled),
                _ = tokio::time::sleep(backoff) => {}
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportErrorKind;
    use bytes::Bytes;
    use reqwest::Method;
    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    type Scripted = Box<dyn Fn() -> Result<HttpResponse, LlmError> + Send>;

    /// Plays back a fixed list of outcomes, repeating the last one.
    struct ScriptedTransport {
        script: Mutex<VecDeque<Scripted>>,
        calls: AtomicUsize,
        bodies: Mutex<Vec<Bytes>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Scripted>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
                bodies: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn round_trip(&self, request: HttpRequest) -> Result<HttpResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let RequestBody::Buffered(b) = &request.body {
                self.bodies.lock().unwrap().push(b.clone());
            }
            let mut script = self.script.lock().unwrap();
            let next = if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                let last = script.front().unwrap();
                return last();
            };
            next()
        }
    }

    fn status(code: u16, retry_after: Option<&'static str>) -> Scripted {
        Box::new(move || {
            let mut headers = HeaderMap::new();
            if let Some(v) = retry_after {
                headers.insert(RETRY_AFTER, HeaderValue::from_static(v));
            }
            Ok(HttpResponse::from_bytes(code, headers, format!("status {code}")))
        })
    }

    fn failure(kind: TransportErrorKind) -> Scripted {
        Box::new(move || Err(LlmError::transport(kind, "scripted")))
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_then_ok_waits_retry_after_once() {
        let inner = std::sync::Arc::new(ScriptedTransport::new(vec![
            status(429, Some("2")),
            status(200, None),
        ]));
        let transport = RetryingTransport::new(inner.clone(), RetryPolicy::new(3));

        let start = Instant::now();
        let resp = transport
            .round_trip(HttpRequest::new(Method::POST, "http://api.test/v1").with_body(Bytes::from_static(b"{}")))
            .await
            .unwrap();

        assert_eq!(resp.status, 200);
        assert_eq!(inner.calls(), 2);
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(2) && waited < Duration::from_secs(3), "{waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_returns_last_response() {
        let inner = std::sync::Arc::new(ScriptedTransport::new(vec![status(503, None)]));
        let transport = RetryingTransport::new(inner.clone(), RetryPolicy::new(3));

        let start = Instant::now();
        let resp = transport
            .round_trip(HttpRequest::new(Method::GET, "http://api.test/v1"))
            .await
            .unwrap();

        assert_eq!(resp.status, 503);
        assert_eq!(resp.bytes().await.unwrap(), "status 503");
        assert_eq!(inner.calls(), 4);
        // 1s + 2s + 4s
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(7) && waited < Duration::from_secs(8), "{waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_is_not_retried() {
        let inner = std::sync::Arc::new(ScriptedTransport::new(vec![failure(
            TransportErrorKind::TooManyRedirects,
        )]));
        let transport = RetryingTransport::new(inner.clone(), RetryPolicy::new(5));

        let err = transport
            .round_trip(HttpRequest::new(Method::GET, "http://api.test/v1"))
            .await
            .unwrap_err();
        assert_eq!(err.transport_kind(), Some(TransportErrorKind::TooManyRedirects));
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_until_success() {
        let inner = std::sync::Arc::new(ScriptedTransport::new(vec![
            failure(TransportErrorKind::Connect),
            failure(TransportErrorKind::Timeout),
            status(200, None),
        ]));
        let transport = RetryingTransport::new(inner.clone(), RetryPolicy::new(5));

        let resp = transport
            .round_trip(HttpRequest::new(Method::GET, "http://api.test/v1"))
            .await
            .unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_backoff_wait() {
        let inner = std::sync::Arc::new(ScriptedTransport::new(vec![status(503, Some("60"))]));
        let transport = RetryingTransport::new(inner.clone(), RetryPolicy::new(3));
        let request = HttpRequest::new(Method::GET, "http://api.test/v1");
        let cancel = request.cancel.clone();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        });
        let start = Instant::now();
        let err = transport.round_trip(request).await.unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(err, LlmError::Cancelled));
        assert_eq!(inner.calls(), 1);
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn already_cancelled_returns_the_outcome_without_retrying() {
        let inner = std::sync::Arc::new(ScriptedTransport::new(vec![status(503, None)]));
        let transport = RetryingTransport::new(inner.clone(), RetryPolicy::new(3));
        let request = HttpRequest::new(Method::GET, "http://api.test/v1");
        request.cancel.cancel();

        let resp = transport.round_trip(request).await.unwrap();
        assert_eq!(resp.status, 503);
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn streaming_body_is_replayed_byte_for_byte() {
        let inner = std::sync::Arc::new(ScriptedTransport::new(vec![
            status(502, Some("0")),
            status(200, None),
        ]));
        let transport = RetryingTransport::new(inner.clone(), RetryPolicy::new(1));
        let chunks: Vec<Result<Bytes, LlmError>> =
            vec![Ok(Bytes::from_static(b"{\"model\":")), Ok(Bytes::from_static(b"\"m\"}"))];
        let request = HttpRequest::new(Method::POST, "http://api.test/v1")
            .with_body(RequestBody::Streaming(Box::pin(futures::stream::iter(chunks))));

        let resp = transport.round_trip(request).await.unwrap();
        assert_eq!(resp.status, 200);
        let bodies = inner.bodies.lock().unwrap();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0], "{\"model\":\"m\"}");
        assert_eq!(bodies[0], bodies[1]);
    }
}
