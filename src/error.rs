//! Error types for the local agent
//!
//! Only backend failures, bad configuration and interrupts reach the caller
//! of [`crate::Agent::run`]. Tool failures are reported to the model instead;
//! [`Error::tool_message`] is the text it sees.

use crate::calc::CalcError;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Connection or transport failure talking to the model server
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Missing or invalid [`crate::AgentOptions`] field
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Non-2xx status or an error event from the model server
    #[error("API error: {0}")]
    Api(String),

    /// The SSE body broke off or could not be read
    #[error("Streaming error: {0}")]
    Stream(String),

    /// A tool ran and failed; the message is written for the model
    #[error("Tool execution error: {0}")]
    Tool(String),

    /// Tool arguments did not match the tool's schema
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// `calculate` rejected or could not evaluate its expression
    #[error("Calculation failed: {0}")]
    Calc(#[from] CalcError),

    /// The running turn was cancelled through the interrupt handle
    #[error("Turn interrupted")]
    Interrupted,
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn api(msg: impl Into<String>) -> Self {
        Error::Api(msg.into())
    }

    pub fn stream(msg: impl Into<String>) -> Self {
        Error::Stream(msg.into())
    }

    pub fn tool(msg: impl Into<String>) -> Self {
        Error::Tool(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Text placed in a tool result payload when a tool fails.
    ///
    /// Tool, input and calculator errors already read as a message for the
    /// model, so the category prefix is dropped for those.
    pub fn tool_message(&self) -> String {
        match self {
            Error::Tool(msg) | Error::InvalidInput(msg) => msg.clone(),
            Error::Calc(e) => e.to_string(),
            other => other.to_string(),
        }
    }
}
