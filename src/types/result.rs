//! Accumulated generation results.

use super::common::{FinishReason, RateLimit, Role, Usage};
use super::fragment::{Fragment, ToolCall};
use crate::error::{LlmError, UnsupportedFeatures};
use serde::{Deserialize, Serialize};

/// One item of the assistant reply, in the order the provider produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    Text { text: String },
    Thinking { thinking: String },
    ToolCall(ToolCall),
}

/// The outcome of one generation call.
///
/// Built append-only: streamed fragments are folded in with [`GenResult::accumulate`],
/// synchronous responses are converted by the provider adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenResult {
    pub role: Role,
    pub contents: Vec<ContentItem>,
    pub usage: Usage,
    pub finish_reason: FinishReason,
    /// Rate limits read from the response headers, when the provider reports them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub limits: Vec<RateLimit>,
}

impl GenResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one fragment into the result.
    ///
    /// Text and thinking deltas extend the last item when it has the same kind,
    /// otherwise they open a new item. Tool calls are always their own item, so text
    /// arriving after a tool call never rewrites it.
    pub fn accumulate(&mut self, fragment: &Fragment) -> Result<(), LlmError> {
        self.role = Role::Assistant;
        if !fragment.thinking.is_empty() {
            match self.contents.last_mut() {
                Some(ContentItem::Thinking { thinking }) => thinking.push_str(&fragment.thinking),
                _ => self.contents.push(ContentItem::Thinking {
                    thinking: fragment.thinking.clone(),
                }),
            }
        }
        if !fragment.text.is_empty() {
            match self.contents.last_mut() {
                Some(ContentItem::Text { text }) => text.push_str(&fragment.text),
                _ => self.contents.push(ContentItem::Text {
                    text: fragment.text.clone(),
                }),
            }
        }
        if let Some(call) = fragment.tool_call.as_ref().filter(|c| !c.is_zero()) {
            call.validate()?;
            self.contents.push(ContentItem::ToolCall(call.clone()));
        }
        if let Some(reason) = &fragment.finish_reason {
            self.finish_reason = reason.clone();
        }
        Ok(())
    }

    /// Concatenation of every text item.
    pub fn text(&self) -> String {
        self.contents
            .iter()
            .filter_map(|c| match c {
                ContentItem::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Concatenation of every thinking item.
    pub fn thinking(&self) -> String {
        self.contents
            .iter()
            .filter_map(|c| match c {
                ContentItem::Thinking { thinking } => Some(thinking.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.contents.iter().filter_map(|c| match c {
            ContentItem::ToolCall(call) => Some(call),
            _ => None,
        })
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls().next().is_some()
    }

    /// Split the result back into the fragments that would rebuild it.
    pub fn to_fragments(&self) -> Vec<Fragment> {
        self.contents
            .iter()
            .map(|c| match c {
                ContentItem::Text { text } => Fragment::text(text.clone()),
                ContentItem::Thinking { thinking } => Fragment::thinking(thinking.clone()),
                ContentItem::ToolCall(call) => Fragment::tool_call(call.clone()),
            })
            .collect()
    }

    /// Catch provider adapter bugs before a result is returned as a success.
    pub fn validate(&self) -> Result<(), LlmError> {
        if self.role != Role::Assistant {
            return Err(LlmError::InternalError(format!(
                "unexpected result role {:?}",
                self.role
            )));
        }
        for item in &self.contents {
            match item {
                ContentItem::Text { text } if text.is_empty() => {
                    return Err(LlmError::InternalError("empty text item".to_string()));
                }
                ContentItem::Thinking { thinking } if thinking.is_empty() => {
                    return Err(LlmError::InternalError("empty thinking item".to_string()));
                }
                ContentItem::ToolCall(call) => call.validate()?,
                _ => {}
            }
        }
        Ok(())
    }
}

/// A successful generation call.
///
/// `unsupported` is set when the request carried options the provider ignored:
/// the result is valid, but the caller asked for something it did not get.
#[must_use = "the result may carry ignored options that should be reported"]
#[derive(Debug, Clone, PartialEq)]
pub struct GenOutput {
    pub result: GenResult,
    pub unsupported: Option<UnsupportedFeatures>,
}

impl GenOutput {
    pub fn new(result: GenResult, unsupported: Option<UnsupportedFeatures>) -> Self {
        Self {
            result,
            unsupported,
        }
    }

    /// The non-fatal warning, if any option was ignored.
    pub fn warning(&self) -> Option<&UnsupportedFeatures> {
        self.unsupported.as_ref()
    }

    /// Treat ignored options as a failure.
    pub fn into_strict(self) -> Result<GenResult, LlmError> {
        match self.unsupported {
            Some(unsupported) => Err(LlmError::Unsupported(unsupported)),
            None => Ok(self.result),
        }
    }

    pub fn into_parts(self) -> (GenResult, Option<UnsupportedFeatures>) {
        (self.result, self.unsupported)
    }
}
