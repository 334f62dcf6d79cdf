//! reqwest-backed transport.

use super::transport::{HttpRequest, HttpResponse, HttpTransport, RequestBody};
use crate::config::HttpConfig;
use crate::defaults;
use crate::error::{LlmError, TransportError, TransportErrorKind};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Url;

/// The production transport: one pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a client from the HTTP settings.
    pub fn new(config: &HttpConfig) -> Result<Self, LlmError> {
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .pool_max_idle_per_host(defaults::http::MAX_IDLE_PER_HOST)
            .user_agent(config.user_agent.as_str());
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| LlmError::ConfigurationError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Reuse an existing client and its connection pool.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn round_trip(&self, request: HttpRequest) -> Result<HttpResponse, LlmError> {
        let url = check_url(&request.url)?;
        let mut builder = self
            .client
            .request(request.method, url)
            .headers(request.headers);
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Buffered(bytes) => builder.body(bytes),
            RequestBody::Streaming(stream) => builder.body(reqwest::Body::wrap_stream(stream)),
        };

        let cancel = request.cancel;
        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
            resp = builder.send() => resp.map_err(map_reqwest_error)?,
        };

        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let mut chunks = resp.bytes_stream();
        let body = async_stream::stream! {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        yield Err(LlmError::Cancelled);
                        break;
                    }
                    next = chunks.next() => match next {
                        Some(Ok(chunk)) => yield Ok(chunk),
                        Some(Err(e)) => {
                            yield Err(map_reqwest_error(e));
                            break;
                        }
                        None => break,
                    }
                }
            }
        };
        Ok(HttpResponse {
            status,
            headers,
            body: Box::pin(body),
        })
    }
}

fn check_url(raw: &str) -> Result<Url, LlmError> {
    let url = Url::parse(raw).map_err(|e| {
        TransportError::new(TransportErrorKind::InvalidRequest, format!("invalid URL {raw:?}"))
            .with_source(e)
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(LlmError::transport(
            TransportErrorKind::UnsupportedScheme,
            format!("unsupported protocol scheme {scheme:?}"),
        )),
    }
}

/// Classify a reqwest failure by its structured kind.
pub(crate) fn map_reqwest_error(err: reqwest::Error) -> LlmError {
    let kind = if err.is_redirect() {
        TransportErrorKind::TooManyRedirects
    } else if err.is_builder() {
        TransportErrorKind::InvalidRequest
    } else if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_connect() {
        if is_certificate_failure(&err) {
            TransportErrorKind::UntrustedCertificate
        } else {
            TransportErrorKind::Connect
        }
    } else if err.is_body() || err.is_decode() {
        TransportErrorKind::Body
    } else {
        TransportErrorKind::Network
    };
    let message = err.to_string();
    TransportError::new(kind, message).with_source(err).into()
}

// rustls surfaces handshake rejections as `io::ErrorKind::InvalidData` in the
// source chain of a connect error.
fn is_certificate_failure(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut cur = err.source();
    while let Some(e) = cur {
        if let Some(io) = e.downcast_ref::<std::io::Error>()
            && io.kind() == std::io::ErrorKind::InvalidData
        {
            return true;
        }
        cur = e.source();
    }
    false
}
