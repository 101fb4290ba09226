//! Turn events for observing an agent while it works.
//!
//! The agent reports progress through [`TurnEvent`]s: text deltas as they
//! stream in, tool calls as they are dispatched and resolved, and the soft
//! stop when the round budget runs out. Observers are plain callbacks; they
//! cannot change what the agent does, they only watch.
//!
//! # Execution Model
//!
//! - Observers run synchronously on the task driving the turn, in the order
//!   they were registered.
//! - Every observer sees every event.
//! - A slow observer slows the turn down, so heavy work belongs on a channel.
//!
//! ```rust,no_run
//! use local_agent::{Observers, TurnEvent};
//!
//! let observers = Observers::new().on_event(|event| match event {
//!     TurnEvent::AnswerDelta(text) => print!("{text}"),
//!     TurnEvent::ToolCallStarted { name, .. } => println!("\n-> {name}"),
//!     _ => {}
//! });
//! ```

use crate::tools::ToolResult;
use serde_json::Value;
use std::sync::Arc;

/// Something that happened while a turn was running.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// A slice of reasoning text arrived
    ReasoningDelta(String),

    /// A slice of answer text arrived
    AnswerDelta(String),

    /// A tool is about to run with these parsed arguments
    ToolCallStarted {
        id: String,
        name: String,
        arguments: Value,
    },

    /// A tool call resolved. Unknown tools show up here as errors too.
    ToolCallFinished {
        id: String,
        name: String,
        result: ToolResult,
    },

    /// Argument text could not be parsed; the tool was not run
    ToolArgumentsInvalid {
        id: String,
        name: String,
        error: String,
    },

    /// The round budget ran out before a final answer
    MaxIterationsReached { iterations: u32 },
}

/// Observer callback.
pub type EventHandler = Arc<dyn Fn(&TurnEvent) + Send + Sync>;

/// Registered observers, notified in registration order.
#[derive(Clone, Default)]
pub struct Observers {
    handlers: Vec<EventHandler>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback for every event.
    pub fn on_event<F>(mut self, handler: F) -> Self
    where
        F: Fn(&TurnEvent) + Send + Sync + 'static,
    {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub(crate) fn emit(&self, event: TurnEvent) {
        for handler in &self.handlers {
            handler(&event);
        }
    }
}

// Handlers are closures, so only their count is shown
impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
