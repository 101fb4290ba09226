//! The tool-calling agent: turn controller and agent loop.
//!
//! One **turn** is a single request/response exchange with the model:
//!
//! ```text
//! transcript ──▶ ChatBackend::chat ──▶ chunks ──▶ StreamAggregator
//!                                                      │ finish()
//!                                                      ▼
//!                               assistant message appended to transcript
//!                                                      │
//!                         no tool calls ◀──────────────┴──────────▶ tool calls
//!                              │                                        │
//!                   Complete(answer)              for each call, in index order:
//!                                                   parse arguments
//!                                                   look up tool, invoke
//!                                                   append tool message
//!                                                        │
//!                                                   Incomplete
//! ```
//!
//! The **agent loop** repeats turns until one is complete or the round budget
//! runs out. Running out is a soft stop: the loop returns the text of the last
//! transcript message instead of failing.
//!
//! Everything recoverable is turned into data as early as possible. Bad
//! argument JSON, unknown tool names, tool errors and tool panics all become
//! `{"error": ...}` tool messages the model can read on the next round. Only
//! backend failures and interrupts end a turn with `Err`.
//!
//! # Example
//!
//! ```rust,no_run
//! use local_agent::{Agent, AgentOptions, builtin_tools};
//!
//! # async fn example() -> local_agent::Result<()> {
//! let options = AgentOptions::builder()
//!     .model("glm-4.7")
//!     .base_url("http://localhost:1234/v1")
//!     .tools(builtin_tools())
//!     .build()?;
//!
//! let agent = Agent::new(options)?;
//! let mut transcript = agent.new_transcript();
//! let answer = agent.run(&mut transcript, "What time is it?").await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```

use crate::client::{ChatBackend, HttpBackend};
use crate::events::{Observers, TurnEvent};
use crate::stream::StreamAggregator;
use crate::tools::ToolResult;
use crate::types::{AgentOptions, Message, OpenAIRequest, ToolInvocation};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// How a single turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model answered without asking for tools
    Complete(String),
    /// Tool results were appended; another round is needed
    Incomplete,
}

/// Anything that can run one turn against a transcript.
///
/// [`Agent`] is the real implementation; the loop only depends on this trait,
/// so it can be driven by a stub.
#[async_trait]
pub trait TurnRunner: Send + Sync {
    async fn run_turn(&self, transcript: &mut Vec<Message>) -> Result<TurnOutcome>;

    /// Called once when [`run_agent_loop`] gives up after `iterations` rounds.
    fn on_max_iterations(&self, _iterations: u32) {}
}

/// Runs turns until one completes or `max_iterations` rounds have run.
///
/// On exhaustion the text of the most recent transcript message is returned
/// (empty if it has none). Errors from a turn end the loop immediately.
pub async fn run_agent_loop<R>(
    runner: &R,
    transcript: &mut Vec<Message>,
    max_iterations: u32,
) -> Result<String>
where
    R: TurnRunner + ?Sized,
{
    for round in 1..=max_iterations {
        log::debug!("agent round {}/{}", round, max_iterations);
        if let TurnOutcome::Complete(answer) = runner.run_turn(transcript).await? {
            return Ok(answer);
        }
    }

    log::warn!(
        "reached max iterations ({}) without a final answer",
        max_iterations
    );
    runner.on_max_iterations(max_iterations);

    Ok(transcript
        .last()
        .and_then(Message::text)
        .unwrap_or_default()
        .to_string())
}

/// Text placed in tool messages for calls skipped by an interrupt.
const INTERRUPTED_TOOL_MESSAGE: &str = "Interrupted by user before this tool ran";

/// Text placed in the tool message of a call cancelled mid-run.
const CANCELLED_TOOL_MESSAGE: &str = "Interrupted by user while this tool was running";

/// Cloneable handle that stops the running turn, e.g. from a Ctrl-C task.
///
/// Interrupting cancels the current token, which wakes the turn wherever it
/// is waiting: on the backend, on the next stream fragment, or on a tool.
/// [`Agent::run`] swaps in a fresh token once a previous one has fired.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle {
    token: Arc<Mutex<CancellationToken>>,
}

impl InterruptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interrupt(&self) {
        self.lock().cancel();
    }

    pub fn is_interrupted(&self) -> bool {
        self.lock().is_cancelled()
    }

    fn reset(&self) {
        let mut token = self.lock();
        if token.is_cancelled() {
            *token = CancellationToken::new();
        }
    }

    fn token(&self) -> CancellationToken {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, CancellationToken> {
        self.token.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Tool-calling agent bound to one backend and one option set.
///
/// The transcript is owned by the caller and passed in per call, so one agent
/// can serve several independent conversations one after another.
pub struct Agent {
    backend: Arc<dyn ChatBackend>,
    options: AgentOptions,
    observers: Observers,

    /// Cleared when [`Agent::run`] starts.
    interrupt: InterruptHandle,
}

impl Agent {
    /// Creates an agent talking to `options.base_url` over HTTP.
    pub fn new(options: AgentOptions) -> Result<Self> {
        let backend = HttpBackend::new(&options)?;
        Ok(Self::with_backend(options, Arc::new(backend)))
    }

    /// Creates an agent on top of any [`ChatBackend`].
    pub fn with_backend(options: AgentOptions, backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            backend,
            options,
            observers: Observers::new(),
            interrupt: InterruptHandle::new(),
        }
    }

    pub fn with_observers(mut self, observers: Observers) -> Self {
        self.observers = observers;
        self
    }

    pub fn options(&self) -> &AgentOptions {
        &self.options
    }

    /// A fresh transcript holding only the system prompt.
    pub fn new_transcript(&self) -> Vec<Message> {
        vec![Message::system(self.options.system_prompt.clone())]
    }

    /// Stops the running turn as soon as it next waits.
    pub fn interrupt(&self) {
        self.interrupt.interrupt();
    }

    /// Handle behind [`Agent::interrupt`], for signal handlers.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Appends `user_input` and runs the agent loop with the configured round
    /// budget.
    pub async fn run(&self, transcript: &mut Vec<Message>, user_input: &str) -> Result<String> {
        self.interrupt.reset();
        transcript.push(Message::user(user_input));
        run_agent_loop(self, transcript, self.options.max_iterations).await
    }

    /// Performs one exchange with the backend and resolves its tool calls.
    ///
    /// Appends exactly one assistant message, followed by one tool message
    /// per requested call in index order. Nothing is appended if the backend
    /// fails or the turn is interrupted while streaming.
    ///
    /// An interrupt during tool execution cancels the running tool and still
    /// answers every call, then returns [`Error::Interrupted`].
    pub async fn run_turn(&self, transcript: &mut Vec<Message>) -> Result<TurnOutcome> {
        let cancel = self.interrupt.token();
        let request = OpenAIRequest::from_options(&self.options, transcript);
        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Interrupted),
            stream = self.backend.chat(&request) => stream?,
        };

        let mut aggregator = StreamAggregator::new();
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Interrupted),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else {
                break;
            };
            let Some(choice) = chunk?.choices.into_iter().next() else {
                continue;
            };

            let delta = choice.delta;
            if let Some(text) = delta.reasoning_content.as_deref().filter(|t| !t.is_empty()) {
                self.observers.emit(TurnEvent::ReasoningDelta(text.to_string()));
            }
            if let Some(text) = delta.content.as_deref().filter(|t| !t.is_empty()) {
                self.observers.emit(TurnEvent::AnswerDelta(text.to_string()));
            }
            aggregator.process_delta(delta);
        }

        let message = aggregator.finish().into_message();
        let calls = message.tool_calls().to_vec();
        let answer = message.content.clone().unwrap_or_default();
        transcript.push(Message::assistant(message));

        if calls.is_empty() {
            return Ok(TurnOutcome::Complete(answer));
        }

        log::debug!("model requested {} tool call(s)", calls.len());

        for (position, call) in calls.iter().enumerate() {
            if cancel.is_cancelled() {
                answer_skipped(transcript, &calls[position..], INTERRUPTED_TOOL_MESSAGE);
                return Err(Error::Interrupted);
            }

            let content = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                content = self.dispatch(call) => Some(content),
            };
            match content {
                Some(content) => transcript.push(Message::tool(&call.id, content)),
                None => {
                    log::debug!("tool '{}' ({}) cancelled", call.name, call.id);
                    answer_skipped(transcript, std::slice::from_ref(call), CANCELLED_TOOL_MESSAGE);
                    answer_skipped(transcript, &calls[position + 1..], INTERRUPTED_TOOL_MESSAGE);
                    return Err(Error::Interrupted);
                }
            }
        }

        // The last tool may have been interrupted after it finished
        if cancel.is_cancelled() {
            return Err(Error::Interrupted);
        }

        Ok(TurnOutcome::Incomplete)
    }

    /// Resolves one tool call to the text of its tool message.
    async fn dispatch(&self, call: &ToolInvocation) -> String {
        let arguments = match parse_arguments(&call.arguments) {
            Ok(arguments) => arguments,
            Err(detail) => {
                let error = format!("Invalid arguments JSON: {}", detail);
                log::warn!("tool call '{}' ({}): {}", call.name, call.id, error);
                self.observers.emit(TurnEvent::ToolArgumentsInvalid {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    error: error.clone(),
                });
                return ToolResult::Error(error).to_content();
            }
        };

        self.observers.emit(TurnEvent::ToolCallStarted {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: arguments.clone(),
        });

        let result = match self.options.tools.get(&call.name) {
            Some(tool) => tool.invoke(arguments).await,
            None => ToolResult::error(format!("Unknown function: {}", call.name)),
        };

        if let ToolResult::Error(error) = &result {
            log::debug!("tool '{}' failed: {}", call.name, error);
        }

        let content = result.to_content();
        self.observers.emit(TurnEvent::ToolCallFinished {
            id: call.id.clone(),
            name: call.name.clone(),
            result,
        });
        content
    }
}

#[async_trait]
impl TurnRunner for Agent {
    async fn run_turn(&self, transcript: &mut Vec<Message>) -> Result<TurnOutcome> {
        Agent::run_turn(self, transcript).await
    }

    fn on_max_iterations(&self, iterations: u32) {
        self.observers
            .emit(TurnEvent::MaxIterationsReached { iterations });
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("options", &self.options)
            .field("observers", &self.observers)
            .field("interrupted", &self.interrupt.is_interrupted())
            .finish()
    }
}

/// Answers calls that will not run, so every assistant tool call keeps a
/// matching tool message.
fn answer_skipped(transcript: &mut Vec<Message>, calls: &[ToolInvocation], reason: &str) {
    for call in calls {
        let content = ToolResult::error(reason).to_content();
        transcript.push(Message::tool(&call.id, content));
    }
}

/// Parses streamed argument text into a JSON object.
///
/// Blank text means no arguments. Anything that is not an object is rejected,
/// since tools take named arguments.
fn parse_arguments(text: &str) -> std::result::Result<Value, String> {
    if text.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }

    let value: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
    if !value.is_object() {
        return Err(format!("expected a JSON object, got {}", json_kind(&value)));
    }
    Ok(value)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
