//! Mapping of provider-neutral inputs onto a chat completions request.

use super::types::{
    ChatFunction, ChatFunctionCall, ChatMessage, ChatRequest, ChatTool, ChatToolCall,
    StreamOptions,
};
use crate::error::LlmError;
use crate::execution::{GenRequest, Prepared, RequestIssues};
use crate::types::{GenOptions, Message, Role};

const MAX_STOP_SEQUENCES: usize = 4;
const MAX_TOP_LOGPROBS: u32 = 20;

impl ChatRequest {
    /// Build a request for `model`.
    ///
    /// Options the model cannot honor are reported as unsupported; values out of
    /// range and malformed messages are hard errors.
    pub fn build(
        model: &str,
        messages: &[Message],
        options: &GenOptions,
    ) -> Result<Prepared<Self>, LlmError> {
        let mut issues = RequestIssues::new();
        let mut req = Self {
            model: model.to_string(),
            ..Default::default()
        };

        if messages.is_empty() {
            issues.invalid("at least one message is required");
        }
        for (i, msg) in messages.iter().enumerate() {
            match to_chat_message(msg) {
                Ok(m) => req.messages.push(m),
                Err(e) => issues.invalid(format!("message {i}: {e}")),
            }
        }

        if let Some(t) = options.temperature {
            if !(0.0..=2.0).contains(&t) {
                issues.invalid(format!("temperature must be within [0, 2], got {t}"));
            } else if is_reasoning_model(model) {
                issues.unsupported("temperature");
            } else {
                req.temperature = Some(t);
            }
        }
        if let Some(p) = options.top_p {
            if !(0.0..=1.0).contains(&p) {
                issues.invalid(format!("top_p must be within [0, 1], got {p}"));
            } else {
                req.top_p = Some(p);
            }
        }
        if options.top_k.is_some() {
            issues.unsupported("top_k");
        }
        if let Some(max) = options.max_tokens {
            if max == 0 {
                issues.invalid("max_tokens must be positive");
            } else {
                req.max_tokens = Some(max);
            }
        }
        if let Some(seed) = options.seed {
            if is_search_model(model) {
                issues.unsupported("seed");
            } else {
                req.seed = Some(seed);
            }
        }
        if options.stop.len() > MAX_STOP_SEQUENCES {
            issues.invalid(format!(
                "at most {MAX_STOP_SEQUENCES} stop sequences are allowed, got {}",
                options.stop.len()
            ));
        } else {
            req.stop = options.stop.clone();
        }
        for tool in &options.tools {
            if tool.name.is_empty() {
                issues.invalid("tool name must not be empty");
                continue;
            }
            req.tools.push(ChatTool {
                kind: "function".to_string(),
                function: ChatFunction {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.parameters.clone(),
                },
            });
        }
        if let Some(n) = options.top_logprobs {
            if n > MAX_TOP_LOGPROBS {
                issues.invalid(format!(
                    "top_logprobs must be at most {MAX_TOP_LOGPROBS}, got {n}"
                ));
            } else {
                req.logprobs = Some(true);
                req.top_logprobs = Some(n);
            }
        }

        issues.into_prepared(req)
    }
}

impl GenRequest for ChatRequest {
    fn set_stream(&mut self, stream: bool) {
        self.stream = stream;
        self.stream_options = stream.then_some(StreamOptions {
            include_usage: true,
        });
    }
}

fn to_chat_message(msg: &Message) -> Result<ChatMessage, String> {
    let mut out = ChatMessage {
        role: msg.role.as_str().to_string(),
        content: (!msg.content.is_empty()).then(|| msg.content.clone()),
        ..Default::default()
    };
    match msg.role {
        Role::System | Role::User => {
            if msg.content.is_empty() {
                return Err(format!("{} message has no content", msg.role.as_str()));
            }
            if !msg.tool_calls.is_empty() {
                return Err(format!("{} message carries tool calls", msg.role.as_str()));
            }
        }
        Role::Assistant => {
            if msg.content.is_empty() && msg.tool_calls.is_empty() {
                return Err("assistant message is empty".to_string());
            }
            out.tool_calls = msg
                .tool_calls
                .iter()
                .map(|call| ChatToolCall {
                    index: None,
                    id: call.id.clone(),
                    kind: "function".to_string(),
                    function: ChatFunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                })
                .collect();
        }
        Role::Tool => {
            let id = msg
                .tool_call_id
                .as_deref()
                .filter(|id| !id.is_empty())
                .ok_or("tool message needs a tool_call_id")?;
            out.tool_call_id = Some(id.to_string());
            // The API requires a content field on tool replies, even an empty one.
            out.content = Some(msg.content.clone());
        }
    }
    Ok(out)
}

/// Reasoning models reject sampling temperature.
pub fn is_reasoning_model(model: &str) -> bool {
    model == "o1"
        || ["o1-", "o3", "o4-"]
            .iter()
            .any(|prefix| model.starts_with(prefix))
        || is_search_model(model)
}

/// Search preview models reject `seed`.
pub fn is_search_model(model: &str) -> bool {
    model.starts_with("gpt-4o-") && model.contains("-search")
}
