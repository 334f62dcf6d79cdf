//! Request dispatch.
//!
//! The [`Dispatcher`] runs one logical call end to end: it encodes the request,
//! sends it through the retrying transport, classifies error responses and
//! decodes the body (a JSON document or an event stream).

use super::continuable::{GenRequest, Prepared, ToGenResult};
use super::error_shapes::ErrorShapes;
use super::http::{
    HttpHeaderBuilder, HttpRequest, HttpResponse, HttpTransport, LoggingTransport,
    ReqwestTransport,
};
use crate::config::ProviderConfig;
use crate::defaults;
use crate::encoding::{decode_json, encode_json, snippet};
use crate::error::LlmError;
use crate::retry::{RetryPolicy, RetryingTransport};
use crate::streaming::{
    DecodeOptions, GenStream, PacketStream, StreamAdapter, decode_stream, process_packets,
};
use crate::types::{FinishReason, GenOutput, GenResult, RateLimit};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::Method;
use reqwest::header::HeaderMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Reads a provider's rate limit headers. Gets the response headers and the time
/// the response arrived.
pub type RateLimitParser = fn(&HeaderMap, DateTime<Utc>) -> Vec<RateLimit>;

/// Shared plumbing of a provider client.
pub struct Dispatcher {
    config: ProviderConfig,
    transport: Arc<dyn HttpTransport>,
    error_shapes: ErrorShapes,
    rate_limits: Option<RateLimitParser>,
    last_response_headers: Mutex<Option<HeaderMap>>,
}

impl Dispatcher {
    /// A dispatcher over a fresh reqwest client built from `config.http`.
    pub fn new(config: ProviderConfig, error_shapes: ErrorShapes) -> Result<Self, LlmError> {
        let base = ReqwestTransport::new(&config.http)?;
        Ok(Self::with_transport(config, error_shapes, Arc::new(base)))
    }

    /// A dispatcher over `transport`, wrapped with logging and retries.
    pub fn with_transport(
        config: ProviderConfig,
        error_shapes: ErrorShapes,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let policy = RetryPolicy::new(config.retry_count);
        Self {
            transport: Arc::new(RetryingTransport::new(
                LoggingTransport::new(transport),
                policy,
            )),
            config,
            error_shapes,
            rate_limits: None,
            last_response_headers: Mutex::new(None),
        }
    }

    /// Fill [`GenResult::limits`] from the headers of every generation response.
    pub fn with_rate_limit_parser(mut self, parser: RateLimitParser) -> Self {
        self.rate_limits = Some(parser);
        self
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Headers of the most recent response, error responses included.
    pub fn last_response_headers(&self) -> Option<HeaderMap> {
        self.last_response_headers
            .lock()
            .ok()
            .and_then(|headers| headers.clone())
    }

    /// Send `body` as JSON and decode a JSON response.
    pub async fn do_request<In, Out>(
        &self,
        cancel: &CancellationToken,
        method: &Method,
        url: &str,
        body: Option<&In>,
    ) -> Result<Out, LlmError>
    where
        In: Serialize + ?Sized,
        Out: DeserializeOwned,
    {
        let resp = self.send(cancel, method, url, body, false).await?;
        self.decode_response(resp).await
    }

    /// POST `body` and decode the response as an event stream of `P` packets.
    pub async fn do_stream<In, P>(
        &self,
        cancel: &CancellationToken,
        url: &str,
        body: &In,
    ) -> Result<PacketStream<P>, LlmError>
    where
        In: Serialize + ?Sized,
        P: DeserializeOwned + Send + 'static,
    {
        let (_, packets) = self.open_stream(cancel, url, body).await?;
        Ok(packets)
    }

    async fn open_stream<In, P>(
        &self,
        cancel: &CancellationToken,
        url: &str,
        body: &In,
    ) -> Result<(HeaderMap, PacketStream<P>), LlmError>
    where
        In: Serialize + ?Sized,
        P: DeserializeOwned + Send + 'static,
    {
        let resp = self.send(cancel, &Method::POST, url, Some(body), true).await?;
        if !resp.is_success() {
            let status = resp.status;
            return Err(self.decode_error(status, resp).await);
        }
        let headers = resp.headers.clone();
        let packets = decode_stream(
            resp.body,
            DecodeOptions {
                lenient: self.config.lenient,
                error_shapes: self.error_shapes.clone(),
            },
        );
        Ok((headers, packets))
    }

    /// Run a synchronous generation call.
    pub async fn gen_sync<R, Resp>(
        &self,
        cancel: &CancellationToken,
        url: &str,
        prepared: Prepared<R>,
    ) -> Result<GenOutput, LlmError>
    where
        R: GenRequest,
        Resp: DeserializeOwned + ToGenResult,
    {
        self.config.validate()?;
        let Prepared {
            mut request,
            unsupported,
        } = prepared;
        request.set_stream(false);
        let resp = self
            .send(cancel, &Method::POST, url, Some(&request), false)
            .await?;
        let limits = self.rate_limits(&resp.headers);
        let resp: Resp = self.decode_response(resp).await?;
        let mut result = resp.to_result()?;
        result.limits = limits;
        finish_result(&mut result, self.config.normalize_tool_call_finish)?;
        Ok(GenOutput::new(result, unsupported))
    }

    /// Start a streaming generation call.
    ///
    /// The HTTP exchange is completed before returning, so rejected requests fail
    /// here. Packets are then decoded and accumulated by one background task.
    pub async fn gen_stream<R, A>(
        &self,
        cancel: &CancellationToken,
        url: &str,
        prepared: Prepared<R>,
        adapter: A,
    ) -> Result<GenStream, LlmError>
    where
        R: GenRequest,
        A: StreamAdapter,
    {
        self.config.validate()?;
        let Prepared {
            mut request,
            unsupported,
        } = prepared;
        request.set_stream(true);

        let call = cancel.child_token();
        let (headers, packets) = self
            .open_stream::<R, A::Packet>(&call, url, &request)
            .await?;
        let limits = self.rate_limits(&headers);

        let (packet_tx, packet_rx) = mpsc::channel(defaults::streaming::PACKET_BUFFER);
        let (fragment_tx, fragment_rx) = mpsc::channel(defaults::streaming::FRAGMENT_BUFFER);
        let normalize = self.config.normalize_tool_call_finish;
        let provider = self.config.provider_id.clone();

        let task = tokio::spawn(async move {
            let mut adapter = adapter;
            let mut packet_rx = packet_rx;
            let mut result = GenResult::new();
            let (produced, consumed) = tokio::join!(
                forward_packets(packets, packet_tx),
                process_packets(&mut adapter, &mut packet_rx, &fragment_tx, &mut result),
            );
            drop(fragment_tx);
            // The decoder's error explains an accumulator failure, not the reverse.
            produced?;
            consumed?;
            result.limits = limits;
            finish_result(&mut result, normalize)?;
            tracing::debug!(%provider, finish_reason = ?result.finish_reason, usage = %result.usage, "stream completed");
            Ok(GenOutput::new(result, unsupported))
        });
        Ok(GenStream::new(fragment_rx, task, call))
    }

    async fn send<In>(
        &self,
        cancel: &CancellationToken,
        method: &Method,
        url: &str,
        body: Option<&In>,
        stream: bool,
    ) -> Result<HttpResponse, LlmError>
    where
        In: Serialize + ?Sized,
    {
        let mut request = HttpRequest::new(method.clone(), url)
            .with_headers(self.headers(stream)?)
            .with_cancel(cancel.clone());
        if let Some(body) = body {
            request = request.with_body(encode_json(body)?);
        }
        let resp = self.transport.round_trip(request).await?;
        if let Ok(mut last) = self.last_response_headers.lock() {
            *last = Some(resp.headers.clone());
        }
        Ok(resp)
    }

    fn rate_limits(&self, headers: &HeaderMap) -> Vec<RateLimit> {
        match self.rate_limits {
            Some(parse) => parse(headers, Utc::now()),
            None => Vec::new(),
        }
    }

    fn headers(&self, stream: bool) -> Result<HeaderMap, LlmError> {
        let mut builder = HttpHeaderBuilder::new().with_json_content_type();
        if let Some(key) = self.config.api_key() {
            builder = builder.with_bearer_auth(key)?;
        }
        if stream {
            builder = builder.with_event_stream_accept();
        }
        Ok(builder.with_custom_headers(&self.config.http.headers)?.build())
    }

    async fn decode_response<Out: DeserializeOwned>(
        &self,
        resp: HttpResponse,
    ) -> Result<Out, LlmError> {
        let status = resp.status;
        if !resp.is_success() {
            return Err(self.decode_error(status, resp).await);
        }
        let body = resp.bytes().await?;
        match decode_json::<Out>(&body, false) {
            Ok(out) => Ok(out),
            // Some servers report errors with a success status.
            Err(err) => match self.error_shapes.decode(&body) {
                Some(api) => {
                    let code = api.status_hint.unwrap_or(status);
                    Err(api.into_api_error(code))
                }
                None if self.config.lenient => decode_json::<Out>(&body, true),
                None => Err(err),
            },
        }
    }

    /// Turn an error response into an [`LlmError::ApiError`].
    async fn decode_error(&self, status: u16, resp: HttpResponse) -> LlmError {
        let body = match resp.bytes().await {
            Ok(body) => body,
            Err(err) => return err,
        };
        let mut err = match self.error_shapes.decode(&body) {
            Some(api) => api.into_api_error(status),
            None if body.is_empty() => LlmError::api_error(status, format!("HTTP {status}")),
            None => LlmError::api_error(status, format!("HTTP {status}: {}", snippet(&body))),
        };
        if status == 401
            && let Some(url) = &self.config.auth_help_url
            && let LlmError::ApiError { message, .. } = &mut err
            && !message.contains(url.as_str())
        {
            message.push_str(&format!("; get a new API key at {url}"));
        }
        err
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("error_shapes", &self.error_shapes)
            .finish_non_exhaustive()
    }
}

async fn forward_packets<P>(
    mut packets: PacketStream<P>,
    tx: mpsc::Sender<P>,
) -> Result<(), LlmError> {
    while let Some(packet) = packets.next().await {
        if tx.send(packet?).await.is_err() {
            // The accumulator stopped early and reports its own error.
            break;
        }
    }
    Ok(())
}

fn finish_result(result: &mut GenResult, normalize_tool_calls: bool) -> Result<(), LlmError> {
    if normalize_tool_calls
        && result.finish_reason == FinishReason::Stop
        && result.has_tool_calls()
    {
        result.finish_reason = FinishReason::ToolCalls;
    }
    result.validate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Fragment, ToolCall};

    #[test]
    fn tool_call_finish_is_normalized_only_when_enabled() {
        let mut result = GenResult::new();
        result
            .accumulate(&Fragment::tool_call(ToolCall::new("1", "lookup", "{}")).with_finish_reason(FinishReason::Stop))
            .unwrap();

        let mut untouched = result.clone();
        finish_result(&mut untouched, false).unwrap();
        assert_eq!(untouched.finish_reason, FinishReason::Stop);

        finish_result(&mut result, true).unwrap();
        assert_eq!(result.finish_reason, FinishReason::ToolCalls);
    }

    #[test]
    fn invalid_result_is_never_a_success() {
        let mut result = GenResult::new();
        result.contents.push(crate::types::ContentItem::ToolCall(ToolCall::new("1", "", "{}")));
        assert!(matches!(
            finish_result(&mut result, false),
            Err(LlmError::InternalError(_))
        ));
    }
}
