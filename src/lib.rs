//! # local-agent
//!
//! A streaming, tool-calling chat agent for OpenAI-compatible model servers
//! (LM Studio, Ollama, llama.cpp, vLLM, Zhipu GLM and friends). The model can
//! read and write local files, list directories, run shell commands, evaluate
//! arithmetic and check the clock while it works on a request.
//!
//! ## How a request is handled
//!
//! ```text
//! user input
//!     │
//!     ▼
//! ┌──────────────── agent loop (max_iterations rounds) ────────────────┐
//! │  turn:  POST /chat/completions (stream, thinking, tool_stream)    │
//! │         SSE chunks ─▶ StreamAggregator ─▶ assistant message       │
//! │         tool calls? ─▶ ToolRegistry ─▶ tool messages ─▶ next round│
//! └────────────────────────────────────────────────────────────────────┘
//!     │
//!     ▼
//! final answer (or the last message text when the budget runs out)
//! ```
//!
//! Reasoning text, answer text and tool calls arrive in small fragments.
//! The aggregator reassembles them, keyed by the server's tool-call index, so
//! tool calls always run in index order no matter how their fragments
//! interleave.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use local_agent::{Agent, AgentOptions, SYSTEM_PROMPT, builtin_tools};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = AgentOptions::builder()
//!         .system_prompt(SYSTEM_PROMPT)
//!         .model("qwen3:8b")
//!         .base_url("http://localhost:11434/v1")
//!         .tools(builtin_tools())
//!         .build()?;
//!
//!     let agent = Agent::new(options)?;
//!     let mut transcript = agent.new_transcript();
//!     let answer = agent
//!         .run(&mut transcript, "How many files are in the current directory?")
//!         .await?;
//!     println!("{answer}");
//!     Ok(())
//! }
//! ```
//!
//! ## Custom tools
//!
//! ```rust,no_run
//! use local_agent::{ToolRegistry, builtin_tools, tool};
//! use serde_json::json;
//!
//! let shout = tool("shout", "Upper-case the given text")
//!     .param("text", "string")
//!     .build(|args| async move {
//!         let text = args["text"].as_str().unwrap_or_default();
//!         Ok(json!({"text": text.to_uppercase()}))
//!     });
//!
//! let registry: ToolRegistry = builtin_tools().with_tool(shout);
//! ```
//!
//! ## Failure model
//!
//! Bad tool arguments, unknown tool names and failing tools never end a turn.
//! They are written to the transcript as `{"error": "..."}` tool messages so
//! the model can react. Backend failures surface as [`Error`].

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

/// The turn controller and agent loop.
mod agent;

/// `ChatBackend` trait and the HTTP implementation.
mod client;

/// Provider shortcuts and environment-based endpoint resolution.
mod config;

/// Error enum and `Result` alias shared by the whole crate.
mod error;

/// Observer events emitted while a turn runs.
mod events;

/// SSE parsing and streaming response aggregation.
mod stream;

/// Tool values, registry and schema helpers.
mod tools;

/// Transcript messages, options and OpenAI wire types.
mod types;

/// The six built-in local tools and the default system prompt.
pub mod builtin;

/// Restricted arithmetic parser and evaluator behind the `calculate` tool.
pub mod calc;

// ============================================================================
// PUBLIC EXPORTS
// ============================================================================

// --- Agent ---

pub use agent::{Agent, InterruptHandle, TurnOutcome, TurnRunner, run_agent_loop};

// --- Remote backend ---

pub use client::{ChatBackend, HttpBackend};

// --- Provider Configuration ---

pub use config::{
    API_KEY_ENV, BASE_URL_ENV, FALLBACK_API_KEY_ENV, MODEL_ENV, Provider, get_api_key,
    get_base_url, get_model,
};

// --- Error Handling ---

pub use error::{Error, Result};

// --- Events ---

pub use events::{EventHandler, Observers, TurnEvent};

// --- Streaming ---

pub use stream::{AggregationState, ChunkStream, MAX_TOOL_CALL_INDEX, StreamAggregator, parse_sse_stream};

// --- Tool System ---

pub use builtin::{SYSTEM_PROMPT, builtin_tools};
pub use tools::{Tool, ToolBuilder, ToolRegistry, ToolResult, tool};

// --- Core Types ---

pub use types::{
    AgentOptions, AgentOptionsBuilder, AssistantMessage, Message, MessageRole, OpenAIChoice,
    OpenAIChunk, OpenAICompletion, OpenAIDelta, OpenAIFunctionDelta, OpenAIRequest,
    OpenAIToolCallDelta, ThinkingConfig, ToolInvocation,
};

// ============================================================================
// CONVENIENCE PRELUDE
// ============================================================================

/// The types most programs need: `use local_agent::prelude::*;`
pub mod prelude {
    pub use crate::{
        Agent, AgentOptions, AgentOptionsBuilder, ChatBackend, Error, Message, Observers,
        Result, SYSTEM_PROMPT, Tool, ToolRegistry, ToolResult, TurnEvent, builtin_tools, tool,
    };
}
