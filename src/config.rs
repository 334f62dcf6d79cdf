//! Provider and HTTP configuration.

use crate::defaults;
use crate::error::LlmError;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::time::Duration;

/// HTTP client settings.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Total time allowed per call, body included. `None` disables it.
    pub timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    pub user_agent: String,
    /// Sent with every request.
    pub headers: HashMap<String, String>,
    pub max_redirects: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Some(defaults::http::REQUEST_TIMEOUT),
            connect_timeout: Some(defaults::http::CONNECT_TIMEOUT),
            user_agent: defaults::http::USER_AGENT.to_string(),
            headers: HashMap::new(),
            max_redirects: defaults::http::MAX_REDIRECTS,
        }
    }
}

impl HttpConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }
}

/// Everything a dispatcher needs to talk to one provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Short provider name used in logs.
    pub provider_id: String,
    pub base_url: String,
    pub api_key: Option<SecretString>,
    /// Default model for generation requests.
    pub model: String,
    /// Whether requests may omit the model.
    pub model_optional: bool,
    /// Where users get a new key; appended to 401 errors.
    pub auth_help_url: Option<String>,
    /// Ignore unknown response fields instead of failing.
    pub lenient: bool,
    pub retry_count: u32,
    /// Report `ToolCalls` instead of `Stop` when the reply contains tool calls.
    pub normalize_tool_call_finish: bool,
    pub http: HttpConfig,
}

impl ProviderConfig {
    pub fn new(provider_id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            base_url: base_url.into(),
            api_key: None,
            model: String::new(),
            model_optional: false,
            auth_help_url: None,
            lenient: false,
            retry_count: defaults::retry::RETRY_COUNT,
            normalize_tool_call_finish: false,
            http: HttpConfig::default(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(api_key.into()));
        self
    }

    /// Read the API key from the environment variable `var`.
    pub fn api_key_from_env(mut self, var: &str) -> Result<Self, LlmError> {
        match std::env::var(var) {
            Ok(key) if !key.trim().is_empty() => {
                self.api_key = Some(SecretString::from(key.trim().to_string()));
                Ok(self)
            }
            _ => Err(LlmError::ConfigurationError(match &self.auth_help_url {
                Some(url) => format!(
                    "api key is required; set environment variable {var} to it, and get a key at {url}"
                ),
                None => format!("api key is required; set environment variable {var} to it"),
            })),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_model_optional(mut self, optional: bool) -> Self {
        self.model_optional = optional;
        self
    }

    pub fn with_auth_help_url(mut self, url: impl Into<String>) -> Self {
        self.auth_help_url = Some(url.into());
        self
    }

    pub fn with_lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_tool_call_finish_normalization(mut self, enabled: bool) -> Self {
        self.normalize_tool_call_finish = enabled;
        self
    }

    pub fn with_http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    /// The API key, if one is configured.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_ref().map(|k| k.expose_secret())
    }

    /// Join `path` onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Check the settings a generation call depends on.
    pub fn validate(&self) -> Result<(), LlmError> {
        if self.base_url.is_empty() {
            return Err(LlmError::ConfigurationError("a base URL is required".into()));
        }
        if !self.model_optional && self.model.is_empty() {
            return Err(LlmError::ConfigurationError("a model is required".into()));
        }
        Ok(())
    }
}
