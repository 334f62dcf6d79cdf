//! Client for servers speaking the OpenAI chat completions API.

use super::rate_limits::parse_rate_limits;
use super::request::is_reasoning_model;
use super::streaming::OpenAiStreamAdapter;
use super::types::{
    ChatRequest, ChatResponse, DetailErrorResponse, ErrorResponse, ModelInfo, ModelsResponse,
};
use crate::config::ProviderConfig;
use crate::error::LlmError;
use crate::execution::http::HttpTransport;
use crate::execution::{Dispatcher, ErrorShapes};
use crate::streaming::{GenStream, ReasoningTagAdapter, ReasoningTags, split_reasoning};
use crate::types::{GenOptions, GenOutput, Message};
use reqwest::Method;
use reqwest::header::HeaderMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
const OPENAI_KEYS_URL: &str = "https://platform.openai.com/api-keys";

/// Error bodies understood by this client, tried in order.
pub fn error_shapes() -> ErrorShapes {
    ErrorShapes::new()
        .with::<ErrorResponse>()
        .with::<DetailErrorResponse>()
}

/// Chat completions client.
///
/// Works against api.openai.com and the many servers that copy its API
/// (vLLM, llama.cpp, DeepSeek, Groq, ...).
pub struct OpenAiCompatibleClient {
    dispatcher: Dispatcher,
    reasoning_tags: Option<ReasoningTags>,
}

impl OpenAiCompatibleClient {
    pub fn new(config: ProviderConfig) -> Result<Self, LlmError> {
        Ok(Self {
            dispatcher: Dispatcher::new(config, error_shapes())?
                .with_rate_limit_parser(parse_rate_limits),
            reasoning_tags: None,
        })
    }

    /// A client sending its requests through `transport`.
    pub fn with_transport(config: ProviderConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            dispatcher: Dispatcher::with_transport(config, error_shapes(), transport)
                .with_rate_limit_parser(parse_rate_limits),
            reasoning_tags: None,
        }
    }

    /// Split reasoning the model writes inline between `tags` out of the text.
    pub fn with_reasoning_tags(mut self, tags: ReasoningTags) -> Self {
        self.reasoning_tags = Some(tags);
        self
    }

    /// Configuration for api.openai.com, reading the key from `OPENAI_API_KEY`.
    pub fn openai_config(model: impl Into<String>) -> Result<ProviderConfig, LlmError> {
        ProviderConfig::new("openai", OPENAI_BASE_URL)
            .with_model(model)
            .with_auth_help_url(OPENAI_KEYS_URL)
            .api_key_from_env(OPENAI_API_KEY_ENV)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn model(&self) -> &str {
        &self.dispatcher.config().model
    }

    pub fn supports_temperature(&self) -> bool {
        !is_reasoning_model(self.model())
    }

    /// Headers of the last response. Parsed limits are on [`GenResult::limits`].
    ///
    /// [`GenResult::limits`]: crate::types::GenResult::limits
    pub fn last_response_headers(&self) -> Option<HeaderMap> {
        self.dispatcher.last_response_headers()
    }

    pub async fn gen_sync(
        &self,
        cancel: &CancellationToken,
        messages: &[Message],
        options: &GenOptions,
    ) -> Result<GenOutput, LlmError> {
        let prepared = ChatRequest::build(self.model(), messages, options)?;
        let mut output = self
            .dispatcher
            .gen_sync::<_, ChatResponse>(cancel, &self.chat_url(), prepared)
            .await?;
        if let Some(tags) = &self.reasoning_tags {
            split_reasoning(&mut output.result, tags)?;
        }
        Ok(output)
    }

    pub async fn gen_stream(
        &self,
        cancel: &CancellationToken,
        messages: &[Message],
        options: &GenOptions,
    ) -> Result<GenStream, LlmError> {
        let prepared = ChatRequest::build(self.model(), messages, options)?;
        let url = self.chat_url();
        match &self.reasoning_tags {
            Some(tags) => {
                let adapter = ReasoningTagAdapter::new(OpenAiStreamAdapter::new(), tags.clone());
                self.dispatcher.gen_stream(cancel, &url, prepared, adapter).await
            }
            None => {
                self.dispatcher
                    .gen_stream(cancel, &url, prepared, OpenAiStreamAdapter::new())
                    .await
            }
        }
    }

    pub async fn list_models(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<ModelInfo>, LlmError> {
        let url = self.dispatcher.config().url("models");
        let resp: ModelsResponse = self
            .dispatcher
            .do_request::<(), _>(cancel, &Method::GET, &url, None)
            .await?;
        Ok(resp.data)
    }

    fn chat_url(&self) -> String {
        self.dispatcher.config().url("chat/completions")
    }
}

impl std::fmt::Debug for OpenAiCompatibleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let config = self.dispatcher.config();
        f.debug_struct("OpenAiCompatibleClient")
            .field("provider_id", &config.provider_id)
            .field("base_url", &config.base_url)
            .field("model", &config.model)
            .finish()
    }
}
