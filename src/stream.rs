//! Streaming utilities: SSE parsing and response aggregation.
//!
//! A streamed chat completion arrives as a sequence of small chunks. Each one
//! may carry a slice of reasoning text, a slice of answer text, and pieces of
//! tool calls:
//!
//! ```text
//! Chunk 1: { reasoning_content: "The user wants" }
//! Chunk 2: { reasoning_content: " the time" }
//! Chunk 3: { tool_calls: [{ index: 0, id: "call_abc", function: { name: "get_datetime" } }] }
//! Chunk 4: { tool_calls: [{ index: 0, function: { arguments: "{" } }] }
//! Chunk 5: { tool_calls: [{ index: 0, function: { arguments: "}" } }] }
//! ```
//!
//! [`parse_sse_stream`] turns the raw HTTP body into a stream of
//! [`OpenAIChunk`]s, and [`StreamAggregator`] folds those chunks into an
//! [`AggregationState`] once the stream is exhausted:
//!
//! ```text
//! Raw HTTP body (SSE)
//!     │ parse_sse_stream()
//!     ▼
//! Stream<OpenAIChunk>
//!     │ StreamAggregator::process_delta()   (one call per chunk)
//!     ▼
//! StreamAggregator::finish() → AggregationState
//! ```
//!
//! The aggregator never parses argument text. It stays an opaque string until
//! the agent dispatches the call, so JSON split at any byte position is fine.

use crate::types::{AssistantMessage, OpenAIChunk, OpenAIDelta, ToolInvocation};
use crate::{Error, Result};
use eventsource_stream::{EventStreamError, Eventsource};
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;

/// Stream of parsed chunks from the remote service.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<OpenAIChunk>> + Send>>;

/// Highest tool-call index the aggregator will allocate a slot for.
///
/// Indices come from the server; anything above this is treated as a
/// malformed delta and ignored.
pub const MAX_TOOL_CALL_INDEX: usize = 256;

/// Final result of folding one response stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationState {
    pub reasoning: String,
    pub answer: String,
    /// Completed tool calls in ascending index order
    pub tool_calls: Vec<ToolInvocation>,
}

impl AggregationState {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Assistant message for the transcript; empty parts are left out.
    pub fn into_message(self) -> AssistantMessage {
        AssistantMessage::from_parts(self.answer, self.reasoning, self.tool_calls)
    }
}

/// Accumulates streaming deltas into reasoning text, answer text and tool calls.
///
/// # Tool call slots
///
/// Partial tool calls live in a vector addressed by the server-provided
/// index. The vector grows on demand, so deltas for indices `[2, 0, 1]` land in
/// slots 2, 0 and 1 and [`finish`](Self::finish) yields them as 0, 1, 2.
///
/// ```text
/// first delta for index 1:  slot[1] = { id: "call_b", name: "calculate", arguments: "" }
/// later deltas for index 1: slot[1].arguments += "{\"expr"
///                           slot[1].arguments += "ession\":\"2+2\"}"
/// ```
///
/// An id or name is recorded the first time it shows up for a slot and never
/// overwritten afterwards. Only argument text accumulates.
#[derive(Debug, Default)]
pub struct StreamAggregator {
    reasoning: String,
    answer: String,
    tool_calls: Vec<Option<PartialToolCall>>,
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

impl StreamAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one chunk in. Only the first choice is considered; chunks with
    /// no choices contribute nothing.
    pub fn process_chunk(&mut self, chunk: OpenAIChunk) {
        if let Some(choice) = chunk.choices.into_iter().next() {
            self.process_delta(choice.delta);
        }
    }

    /// Folds one delta in. Absent fields are empty contributions.
    pub fn process_delta(&mut self, delta: OpenAIDelta) {
        if let Some(reasoning) = delta.reasoning_content {
            self.reasoning.push_str(&reasoning);
        }

        if let Some(content) = delta.content {
            self.answer.push_str(&content);
        }

        for tool_call in delta.tool_calls.unwrap_or_default() {
            let index = tool_call.index as usize;
            if index > MAX_TOOL_CALL_INDEX {
                log::warn!("ignoring tool call delta with out-of-range index {}", index);
                continue;
            }

            if self.tool_calls.len() <= index {
                self.tool_calls.resize_with(index + 1, || None);
            }

            let slot = self.tool_calls[index].get_or_insert_with(PartialToolCall::default);

            if slot.id.is_none() {
                slot.id = tool_call.id.filter(|id| !id.is_empty());
            }

            if let Some(function) = tool_call.function {
                if slot.name.is_none() {
                    slot.name = function.name.filter(|name| !name.is_empty());
                }
                if let Some(args) = function.arguments {
                    slot.arguments.push_str(&args);
                }
            }
        }
    }

    /// Reasoning text accumulated so far.
    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    /// Answer text accumulated so far.
    pub fn answer(&self) -> &str {
        &self.answer
    }

    /// Number of tool call slots seen so far.
    pub fn pending_tool_calls(&self) -> usize {
        self.tool_calls.iter().flatten().count()
    }

    /// Consumes the aggregator once the fragment source is exhausted.
    ///
    /// A call whose id never arrived gets `call_<index>` so its tool message
    /// can still reference it.
    pub fn finish(self) -> AggregationState {
        let tool_calls = self
            .tool_calls
            .into_iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.map(|partial| (index, partial)))
            .map(|(index, partial)| {
                if partial.name.is_none() {
                    log::warn!("tool call at index {} finished without a name", index);
                }
                ToolInvocation {
                    id: partial.id.unwrap_or_else(|| format!("call_{index}")),
                    name: partial.name.unwrap_or_default(),
                    arguments: partial.arguments,
                }
            })
            .collect();

        AggregationState {
            reasoning: self.reasoning,
            answer: self.answer,
            tool_calls,
        }
    }
}

/// Parses a Server-Sent Events body into a stream of [`OpenAIChunk`]s.
///
/// ```text
/// data: {"id":"c1","choices":[{"delta":{"content":"Hel"}}]}
///
/// data: {"id":"c1","choices":[{"delta":{"content":"lo"}}]}
///
/// data: [DONE]
/// ```
///
/// Event framing (including events split across network reads) is handled by
/// `eventsource-stream`. The stream ends at the `[DONE]` sentinel or when the
/// body ends. An event carrying an `{"error": ...}` object is surfaced as
/// [`Error::Api`]; an event whose JSON cannot be decoded is logged and skipped.
pub fn parse_sse_stream<S, B, E>(body: S) -> ChunkStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let stream = body
        .eventsource()
        .take_while(|event| {
            let done = matches!(event, Ok(ev) if ev.data.trim() == "[DONE]");
            futures::future::ready(!done)
        })
        .filter_map(|event| async move {
            let event = match event {
                Ok(ev) => ev,
                Err(EventStreamError::Transport(e)) => {
                    return Some(Err(Error::stream(format!("transport error: {e}"))));
                }
                Err(e) => return Some(Err(Error::stream(format!("malformed event stream: {e}")))),
            };

            let data = event.data.trim();
            if data.is_empty() {
                return None;
            }

            decode_event(data)
        });

    Box::pin(stream)
}

fn decode_event(data: &str) -> Option<Result<OpenAIChunk>> {
    let value: serde_json::Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("skipping undecodable stream event: {}", e);
            return None;
        }
    };

    if let Some(err) = value.get("error") {
        let message = err
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        return Some(Err(Error::api(message)));
    }

    match serde_json::from_value::<OpenAIChunk>(value) {
        Ok(chunk) => Some(Ok(chunk)),
        Err(e) => {
            log::warn!("skipping stream event with unexpected shape: {}", e);
            None
        }
    }
}
