//! Conversion of a complete chat completions response.

use super::types::{ChatResponse, map_finish_reason};
use crate::error::LlmError;
use crate::execution::ToGenResult;
use crate::types::{Fragment, GenResult, ToolCall};

impl ToGenResult for ChatResponse {
    fn to_result(self) -> Result<GenResult, LlmError> {
        let n = self.choices.len();
        let Some(choice) = self.choices.into_iter().next().filter(|_| n == 1) else {
            return Err(LlmError::ParseError(format!(
                "expected exactly 1 choice, got {n}"
            )));
        };
        let msg = choice.message;
        if !msg.role.is_empty() && msg.role != "assistant" {
            return Err(LlmError::ParseError(format!(
                "unexpected message role {:?}",
                msg.role
            )));
        }
        if let Some(refusal) = msg.refusal.filter(|r| !r.is_empty()) {
            return Err(LlmError::api_error(200, format!("refused: {refusal}")));
        }

        let mut result = GenResult::new();
        if let Some(thinking) = msg.reasoning_content.filter(|t| !t.is_empty()) {
            result.accumulate(&Fragment::thinking(thinking))?;
        }
        if let Some(text) = msg.content.filter(|t| !t.is_empty()) {
            result.accumulate(&Fragment::text(text))?;
        }
        for call in msg.tool_calls.unwrap_or_default() {
            result.accumulate(&Fragment::tool_call(ToolCall::new(
                call.id,
                call.function.name,
                call.function.arguments,
            )))?;
        }
        if let Some(reason) = choice.finish_reason.as_deref().filter(|r| !r.is_empty()) {
            result.finish_reason = map_finish_reason(reason);
        }
        if let Some(usage) = self.usage {
            result.usage = usage.to_usage();
        }
        Ok(result)
    }
}
