//! Incremental response fragments.

use super::common::FinishReason;
use crate::error::LlmError;
use serde::{Deserialize, Serialize};

/// A completed tool call requested by the model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Opaque identifier assigned by the provider. Some providers do not send one.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    /// Arguments as raw JSON text, exactly as the model produced them.
    #[serde(default)]
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.id.is_empty() && self.name.is_empty() && self.arguments.is_empty()
    }

    pub fn validate(&self) -> Result<(), LlmError> {
        if self.name.is_empty() {
            return Err(LlmError::InternalError(format!(
                "tool call {:?} is missing a name",
                self.id
            )));
        }
        Ok(())
    }
}

/// One incremental unit of a generation response.
///
/// Fields are mutually optional. A fragment with no field set is a zero
/// fragment and is never emitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub thinking: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

impl Fragment {
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            text: delta.into(),
            ..Default::default()
        }
    }

    pub fn thinking(delta: impl Into<String>) -> Self {
        Self {
            thinking: delta.into(),
            ..Default::default()
        }
    }

    pub fn tool_call(call: ToolCall) -> Self {
        Self {
            tool_call: Some(call),
            ..Default::default()
        }
    }

    pub fn with_finish_reason(mut self, reason: FinishReason) -> Self {
        self.finish_reason = Some(reason);
        self
    }

    pub fn is_zero(&self) -> bool {
        self.text.is_empty()
            && self.thinking.is_empty()
            && self.tool_call.as_ref().is_none_or(ToolCall::is_zero)
            && self.finish_reason.is_none()
    }

    /// Catch adapter bugs before a fragment reaches the caller.
    pub fn validate(&self) -> Result<(), LlmError> {
        if self.is_zero() {
            return Err(LlmError::InternalError("empty fragment".to_string()));
        }
        if let Some(call) = self.tool_call.as_ref().filter(|c| !c.is_zero()) {
            call.validate()?;
        }
        Ok(())
    }
}
