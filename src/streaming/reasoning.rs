//! Reasoning embedded in the text between tags such as `<think>...</think>`.
//!
//! Some models served over plain chat APIs write their reasoning into the text
//! instead of a separate field. [`ReasoningTagAdapter`] wraps a provider's
//! adapter and moves the tagged span into thinking fragments as the stream
//! arrives; [`split_reasoning`] does the same to a finished result.

use super::accumulator::{PacketUpdate, StreamAdapter};
use crate::error::LlmError;
use crate::types::{Fragment, GenResult};

/// Tags delimiting the reasoning span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasoningTags {
    /// May be empty for models whose template already opened the span.
    pub start: String,
    pub end: String,
}

impl ReasoningTags {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// `<think>` and `</think>`.
    pub fn think() -> Self {
        Self::new("<think>", "</think>")
    }
}

impl Default for ReasoningTags {
    fn default() -> Self {
        Self::think()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Nothing but whitespace seen.
    Start,
    /// Inside the span; leading whitespace still to skip.
    StartTagSeen,
    Thinking,
    /// Past the end tag; leading whitespace still to skip.
    EndTagSeen,
    Text,
}

/// Incremental tag splitter.
///
/// Tags may be cut anywhere by the transport. A suffix that could be the start of
/// a tag is held back until the next text arrives or [`TagSplitter::finish`].
/// Text that does not open with the start tag passes through untouched.
#[derive(Debug, Clone)]
pub struct TagSplitter {
    tags: ReasoningTags,
    state: State,
    carry: String,
}

impl TagSplitter {
    pub fn new(tags: ReasoningTags) -> Self {
        let state = if tags.start.is_empty() {
            State::StartTagSeen
        } else {
            State::Start
        };
        Self {
            tags,
            state,
            carry: String::new(),
        }
    }

    /// Split one fragment. Tool calls and finish reasons pass through after the
    /// text they followed.
    pub fn push(&mut self, fragment: Fragment) -> Result<Vec<Fragment>, LlmError> {
        if !fragment.thinking.is_empty() {
            return Err(LlmError::StreamError(
                "reasoning arrived as its own field while splitting reasoning tags".to_string(),
            ));
        }
        let Fragment {
            text,
            tool_call,
            finish_reason,
            ..
        } = fragment;
        let mut out = Vec::new();
        self.feed(&text, &mut out);
        if tool_call.is_some() || finish_reason.is_some() {
            out.push(Fragment {
                tool_call,
                finish_reason,
                ..Default::default()
            });
        }
        Ok(out)
    }

    /// Release whatever was held back.
    pub fn finish(&mut self) -> Vec<Fragment> {
        let rest = std::mem::take(&mut self.carry);
        if rest.is_empty() {
            return Vec::new();
        }
        match self.state {
            State::StartTagSeen | State::Thinking => vec![Fragment::thinking(rest)],
            State::Start | State::EndTagSeen | State::Text => vec![Fragment::text(rest)],
        }
    }

    fn feed(&mut self, text: &str, out: &mut Vec<Fragment>) {
        self.carry.push_str(text);
        loop {
            match self.state {
                State::Start => {
                    if !self.skip_whitespace() {
                        return;
                    }
                    if self.carry.starts_with(self.tags.start.as_str()) {
                        self.carry.drain(..self.tags.start.len());
                        self.state = State::StartTagSeen;
                    } else if self.tags.start.starts_with(self.carry.as_str()) {
                        return;
                    } else {
                        self.state = State::Text;
                    }
                }
                State::StartTagSeen => {
                    if !self.skip_whitespace() {
                        return;
                    }
                    self.state = State::Thinking;
                }
                State::Thinking => {
                    if let Some(pos) = self.carry.find(self.tags.end.as_str()) {
                        let rest = self.carry.split_off(pos + self.tags.end.len());
                        self.carry.truncate(pos);
                        emit(out, Fragment::thinking(std::mem::replace(&mut self.carry, rest)));
                        self.state = State::EndTagSeen;
                        continue;
                    }
                    let split = self.carry.len() - partial_tag_suffix(&self.carry, &self.tags.end);
                    let rest = self.carry.split_off(split);
                    emit(out, Fragment::thinking(std::mem::replace(&mut self.carry, rest)));
                    return;
                }
                State::EndTagSeen => {
                    if !self.skip_whitespace() {
                        return;
                    }
                    self.state = State::Text;
                }
                State::Text => {
                    emit(out, Fragment::text(std::mem::take(&mut self.carry)));
                    return;
                }
            }
        }
    }

    /// Drop leading whitespace; false when nothing else is buffered.
    fn skip_whitespace(&mut self) -> bool {
        let trimmed = self.carry.len() - self.carry.trim_start().len();
        self.carry.drain(..trimmed);
        !self.carry.is_empty()
    }
}

fn emit(out: &mut Vec<Fragment>, fragment: Fragment) {
    if !fragment.is_zero() {
        out.push(fragment);
    }
}

/// Length of the longest suffix of `s` that is a proper prefix of `tag`.
fn partial_tag_suffix(s: &str, tag: &str) -> usize {
    let max = tag.len().saturating_sub(1).min(s.len());
    (1..=max)
        .rev()
        .find(|&n| tag.is_char_boundary(n) && s.ends_with(&tag[..n]))
        .unwrap_or(0)
}

/// Wraps a provider adapter and splits tagged reasoning out of its text.
#[derive(Debug)]
pub struct ReasoningTagAdapter<A> {
    inner: A,
    splitter: TagSplitter,
}

impl<A: StreamAdapter> ReasoningTagAdapter<A> {
    pub fn new(inner: A, tags: ReasoningTags) -> Self {
        Self {
            inner,
            splitter: TagSplitter::new(tags),
        }
    }

    fn split(&mut self, mut update: PacketUpdate) -> Result<PacketUpdate, LlmError> {
        for fragment in std::mem::take(&mut update.fragments) {
            update.fragments.extend(self.splitter.push(fragment)?);
        }
        Ok(update)
    }
}

impl<A: StreamAdapter> StreamAdapter for ReasoningTagAdapter<A> {
    type Packet = A::Packet;

    fn process(&mut self, packet: A::Packet) -> Result<PacketUpdate, LlmError> {
        let update = self.inner.process(packet)?;
        self.split(update)
    }

    fn finish(&mut self) -> Result<PacketUpdate, LlmError> {
        let update = self.inner.finish()?;
        let mut update = self.split(update)?;
        update.fragments.extend(self.splitter.finish());
        Ok(update)
    }
}

/// Move tagged reasoning out of a finished result's text.
///
/// Gives the same result as streaming the call through [`ReasoningTagAdapter`].
pub fn split_reasoning(result: &mut GenResult, tags: &ReasoningTags) -> Result<(), LlmError> {
    let mut splitter = TagSplitter::new(tags.clone());
    let mut rebuilt = GenResult {
        usage: result.usage,
        finish_reason: result.finish_reason.clone(),
        limits: std::mem::take(&mut result.limits),
        ..GenResult::new()
    };
    for fragment in result.to_fragments() {
        for part in splitter.push(fragment)? {
            rebuilt.accumulate(&part)?;
        }
    }
    for part in splitter.finish() {
        rebuilt.accumulate(&part)?;
    }
    rebuilt.role = result.role;
    *result = rebuilt;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentItem, FinishReason, ToolCall, Usage};

    fn run(chunks: &[&str]) -> Vec<Fragment> {
        let mut splitter = TagSplitter::new(ReasoningTags::think());
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(splitter.push(Fragment::text(*chunk)).unwrap());
        }
        out.extend(splitter.finish());
        out
    }

    fn fold(fragments: &[Fragment]) -> GenResult {
        let mut result = GenResult::new();
        for f in fragments {
            result.accumulate(f).unwrap();
        }
        result
    }

    #[test]
    fn tagged_span_becomes_thinking() {
        let result = fold(&run(&["<think>\nplan it\n</think>\n\nHello"]));
        assert_eq!(result.thinking(), "plan it\n");
        assert_eq!(result.text(), "Hello");
    }

    #[test]
    fn tags_cut_across_chunks() {
        let out = run(&["  <th", "ink>a", "b</th", "in", "k>", " ", "done"]);
        assert_eq!(
            out,
            vec![
                Fragment::thinking("a"),
                Fragment::thinking("b"),
                Fragment::text("done"),
            ]
        );
    }

    #[test]
    fn untagged_text_passes_through() {
        let result = fold(&run(&["Hi <think>not a tag</think>"]));
        assert_eq!(result.text(), "Hi <think>not a tag</think>");
        assert!(result.thinking().is_empty());
    }

    #[test]
    fn unterminated_span_is_all_thinking() {
        let result = fold(&run(&["<think>still going", " </thi"]));
        assert_eq!(result.thinking(), "still going </thi");
        assert!(result.text().is_empty());
    }

    #[test]
    fn empty_start_tag_opens_in_the_span() {
        let mut splitter = TagSplitter::new(ReasoningTags::new("", "</think>"));
        let mut out = splitter.push(Fragment::text("why</think>because")).unwrap();
        out.extend(splitter.finish());
        assert_eq!(out, vec![Fragment::thinking("why"), Fragment::text("because")]);
    }

    #[test]
    fn separate_reasoning_field_is_rejected() {
        let mut splitter = TagSplitter::new(ReasoningTags::think());
        assert!(matches!(
            splitter.push(Fragment::thinking("x")),
            Err(LlmError::StreamError(_))
        ));
    }

    #[test]
    fn tool_calls_and_finish_reason_pass_through() {
        let call = ToolCall::new("1", "lookup", "{}");
        let out = run_fragments(vec![
            Fragment::text("<think>x</think>y"),
            Fragment::tool_call(call.clone()).with_finish_reason(FinishReason::ToolCalls),
        ]);
        assert_eq!(
            out,
            vec![
                Fragment::thinking("x"),
                Fragment::text("y"),
                Fragment::tool_call(call).with_finish_reason(FinishReason::ToolCalls),
            ]
        );
    }

    fn run_fragments(fragments: Vec<Fragment>) -> Vec<Fragment> {
        let mut splitter = TagSplitter::new(ReasoningTags::think());
        let mut out = Vec::new();
        for f in fragments {
            out.extend(splitter.push(f).unwrap());
        }
        out.extend(splitter.finish());
        out
    }

    #[test]
    fn sync_split_keeps_usage_and_finish_reason() {
        let mut result = fold(&[
            Fragment::text("<think>a</think>b").with_finish_reason(FinishReason::Stop),
        ]);
        result.usage = Usage::new(3, 4);
        split_reasoning(&mut result, &ReasoningTags::think()).unwrap();
        assert_eq!(
            result.contents,
            vec![
                ContentItem::Thinking {
                    thinking: "a".to_string()
                },
                ContentItem::Text {
                    text: "b".to_string()
                },
            ]
        );
        assert_eq!(result.usage, Usage::new(3, 4));
        assert_eq!(result.finish_reason, FinishReason::Stop);
    }

    struct TextChunks;

    impl StreamAdapter for TextChunks {
        type Packet = String;

        fn process(&mut self, packet: String) -> Result<PacketUpdate, LlmError> {
            Ok(PacketUpdate::fragment(Fragment::text(packet)))
        }
    }

    #[test]
    fn wrapped_adapter_matches_sync_split() {
        let chunks = ["<thi", "nk>weigh ", "options</think", ">", "Answer", " <"];
        let mut adapter = ReasoningTagAdapter::new(TextChunks, ReasoningTags::think());
        let mut streamed = GenResult::new();
        for chunk in chunks {
            for f in adapter.process(chunk.to_string()).unwrap().fragments {
                streamed.accumulate(&f).unwrap();
            }
        }
        for f in adapter.finish().unwrap().fragments {
            streamed.accumulate(&f).unwrap();
        }

        let mut sync = fold(&[Fragment::text(chunks.concat())]);
        split_reasoning(&mut sync, &ReasoningTags::think()).unwrap();
        assert_eq!(streamed, sync);
        assert_eq!(streamed.thinking(), "weigh options");
        assert_eq!(streamed.text(), "Answer <");
    }
}
