//! The dispatcher driven by a minimal provider defined outside the crate.

use futures::StreamExt;
use genwire::execution::ToGenResult;
use genwire::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Serialize)]
struct EchoRequest {
    prompt: String,
    stream: bool,
}

impl GenRequest for EchoRequest {
    fn set_stream(&mut self, stream: bool) {
        self.stream = stream;
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EchoResponse {
    output: String,
}

impl ToGenResult for EchoResponse {
    fn to_result(self) -> Result<GenResult, LlmError> {
        let mut result = GenResult::new();
        result.accumulate(&Fragment::text(self.output).with_finish_reason(FinishReason::Stop))?;
        Ok(result)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EchoPacket {
    #[serde(default)]
    delta: String,
    #[serde(default)]
    tokens: Option<u64>,
}

#[derive(Default)]
struct EchoAdapter {
    packets: usize,
}

impl StreamAdapter for EchoAdapter {
    type Packet = EchoPacket;

    fn process(&mut self, packet: EchoPacket) -> Result<PacketUpdate, LlmError> {
        self.packets += 1;
        let mut update = PacketUpdate::new();
        if !packet.delta.is_empty() {
            update.push(Fragment::text(packet.delta));
        }
        if let Some(tokens) = packet.tokens {
            update = update.with_usage(Usage::new(1, tokens));
        }
        Ok(update)
    }

    fn finish(&mut self) -> Result<PacketUpdate, LlmError> {
        Ok(PacketUpdate::new().with_finish_reason(FinishReason::Other(format!(
            "{} packets",
            self.packets
        ))))
    }
}

#[derive(Debug, Deserialize)]
struct EchoError {
    failure: String,
}

impl genwire::execution::ErrorShape for EchoError {
    fn message(&self) -> Option<String> {
        Some(self.failure.clone())
    }
}

fn dispatcher(server: &MockServer) -> Dispatcher {
    let config = ProviderConfig::new("echo", server.uri()).with_model_optional(true);
    Dispatcher::new(config, ErrorShapes::new().with::<EchoError>()).unwrap()
}

fn request(prompt: &str) -> Prepared<EchoRequest> {
    Prepared::clean(EchoRequest {
        prompt: prompt.to_string(),
        stream: false,
    })
}

#[tokio::test]
async fn sync_call_through_a_custom_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/echo"))
        .and(body_partial_json(json!({"prompt": "ping", "stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"output": "pong"})))
        .mount(&server)
        .await;

    let d = dispatcher(&server);
    let out = d
        .gen_sync::<_, EchoResponse>(&CancellationToken::new(), &d.config().url("echo"), request("ping"))
        .await
        .unwrap();
    assert_eq!(out.result.text(), "pong");
    assert_eq!(out.result.finish_reason, FinishReason::Stop);
}

#[tokio::test]
async fn stream_through_a_custom_adapter() {
    let server = MockServer::start().await;
    let body = "data: {\"delta\":\"a\"}\n\n\
                event: ping\n\n\
                data: {\"delta\":\"b\",\"tokens\":2}\n\n";
    Mock::given(method("POST"))
        .and(path("/echo"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let d = dispatcher(&server);
    let mut stream = d
        .gen_stream(
            &CancellationToken::new(),
            &d.config().url("echo"),
            request("ping"),
            EchoAdapter::default(),
        )
        .await
        .unwrap();
    let mut seen = String::new();
    while let Some(fragment) = stream.next().await {
        seen.push_str(&fragment.text);
    }
    assert_eq!(seen, "ab");
    let out = stream.finish().await.unwrap();
    assert_eq!(out.result.text(), "ab");
    assert_eq!(out.result.usage.output_tokens, 2);
    assert_eq!(out.result.finish_reason, FinishReason::Other("2 packets".into()));
}

#[tokio::test]
async fn finishing_without_reading_still_builds_the_result() {
    let server = MockServer::start().await;
    let body: String = (0..64)
        .map(|i| format!("data: {{\"delta\":\"{i},\"}}\n\n"))
        .collect();
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let d = dispatcher(&server);
    let stream = d
        .gen_stream(
            &CancellationToken::new(),
            &d.config().url("echo"),
            request("count"),
            EchoAdapter::default(),
        )
        .await
        .unwrap();
    let out = stream.finish().await.unwrap();
    assert!(out.result.text().starts_with("0,1,2,"));
    assert!(out.result.text().ends_with("63,"));
}

#[tokio::test]
async fn garbage_in_the_stream_is_a_stream_error() {
    let server = MockServer::start().await;
    let body = "data: {\"delta\":\"a\"}\n\nthis is not an event\n";
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let d = dispatcher(&server);
    let stream = d
        .gen_stream(
            &CancellationToken::new(),
            &d.config().url("echo"),
            request("x"),
            EchoAdapter::default(),
        )
        .await
        .unwrap();
    let err = stream.finish().await.unwrap_err();
    assert!(matches!(err, LlmError::StreamError(_)), "{err:?}");
}

#[tokio::test]
async fn custom_error_shape_is_decoded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({"failure": "prompt too long"})))
        .mount(&server)
        .await;

    let d = dispatcher(&server);
    let err = d
        .gen_sync::<_, EchoResponse>(&CancellationToken::new(), &d.config().url("echo"), request("x"))
        .await
        .unwrap_err();
    match err {
        LlmError::ApiError { code, message, .. } => {
            assert_eq!(code, 422);
            assert_eq!(message, "prompt too long");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn missing_model_is_a_configuration_error() {
    let server = MockServer::start().await;
    let config = ProviderConfig::new("echo", server.uri());
    let d = Dispatcher::with_transport(
        config,
        ErrorShapes::new(),
        Arc::new(genwire::execution::http::ReqwestTransport::new(&HttpConfig::default()).unwrap()),
    );
    let err = d
        .gen_sync::<_, EchoResponse>(&CancellationToken::new(), &d.config().url("echo"), request("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, LlmError::ConfigurationError(_)), "{err:?}");
    assert!(server.received_requests().await.unwrap().is_empty());
}
