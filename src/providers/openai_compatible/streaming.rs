//! Chunk processing for streamed chat completions.

use super::types::{ChatStreamChunk, ChatToolCall, map_finish_reason};
use crate::error::LlmError;
use crate::streaming::{PacketUpdate, StreamAdapter};
use crate::types::{Fragment, ToolCall};

/// Turns `chat.completion.chunk` packets into fragments.
///
/// A tool call arrives as one delta carrying its id and name followed by
/// argument deltas that carry no id or the same id. The call is held back until a delta starts another
/// call, a chunk without tool deltas arrives, or the stream ends.
#[derive(Debug, Default)]
pub struct OpenAiStreamAdapter {
    pending: Option<ToolCall>,
}

impl OpenAiStreamAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn tool_delta(
        &mut self,
        delta: ChatToolCall,
        update: &mut PacketUpdate,
    ) -> Result<(), LlmError> {
        let name = delta.function.name;
        let arguments = delta.function.arguments;
        // Some servers repeat the call id on every argument delta.
        let continues = self
            .pending
            .as_ref()
            .is_some_and(|call| call.id == delta.id);
        if !delta.id.is_empty() && !continues {
            if let Some(done) = self.pending.replace(ToolCall::new(delta.id, name, arguments)) {
                update.push(Fragment::tool_call(done));
            }
            return Ok(());
        }
        match self.pending.as_mut() {
            Some(call) => {
                if call.name.is_empty() {
                    call.name = name;
                }
                call.arguments.push_str(&arguments);
            }
            // Some servers never send ids; a named delta still starts a call.
            None if !name.is_empty() => self.pending = Some(ToolCall::new("", name, arguments)),
            None => {
                return Err(LlmError::StreamError(
                    "tool call arguments arrived before the call started".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl StreamAdapter for OpenAiStreamAdapter {
    type Packet = ChatStreamChunk;

    fn process(&mut self, chunk: ChatStreamChunk) -> Result<PacketUpdate, LlmError> {
        let mut update = PacketUpdate::new();
        // The final usage chunk has no choices.
        if let Some(usage) = chunk.usage.as_ref().filter(|u| !u.is_empty()) {
            update.usage = Some(usage.to_usage());
        }
        if chunk.choices.len() > 1 {
            return Err(LlmError::StreamError(format!(
                "expected 1 choice per chunk, got {}",
                chunk.choices.len()
            )));
        }
        let Some(choice) = chunk.choices.into_iter().next() else {
            return Ok(update);
        };

        if let Some(reason) = choice.finish_reason.as_deref().filter(|r| !r.is_empty()) {
            update.finish_reason = Some(map_finish_reason(reason));
        }
        let delta = choice.delta;
        match delta.role.as_deref() {
            None | Some("") | Some("assistant") => {}
            Some(role) => {
                return Err(LlmError::StreamError(format!("unexpected role {role:?}")));
            }
        }
        if let Some(refusal) = delta.refusal.filter(|r| !r.is_empty()) {
            return Err(LlmError::api_error(200, format!("refused: {refusal}")));
        }

        let mut calls = delta.tool_calls.unwrap_or_default();
        if calls.len() > 1 {
            return Err(LlmError::StreamError(format!(
                "expected at most 1 tool call delta per chunk, got {}",
                calls.len()
            )));
        }
        match calls.pop() {
            Some(call) => self.tool_delta(call, &mut update)?,
            None => {
                if let Some(done) = self.pending.take() {
                    update.push(Fragment::tool_call(done));
                }
            }
        }

        let content = Fragment {
            text: delta.content.unwrap_or_default(),
            thinking: delta.reasoning_content.unwrap_or_default(),
            ..Default::default()
        };
        if !content.is_zero() {
            update.push(content);
        }
        Ok(update)
    }

    fn finish(&mut self) -> Result<PacketUpdate, LlmError> {
        Ok(match self.pending.take() {
            Some(call) => PacketUpdate::fragment(Fragment::tool_call(call)),
            None => PacketUpdate::new(),
        })
    }
}
