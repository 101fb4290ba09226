//! Core types for the local agent
//!
//! Transcript messages serialize straight into the OpenAI chat-completions
//! shape, so the transcript the agent appends to is the one sent back to the
//! server on the next round.

use crate::tools::ToolRegistry;
use serde::{Deserialize, Serialize};

/// Options for configuring the agent
#[derive(Clone)]
pub struct AgentOptions {
    /// System prompt placed as the first transcript entry by callers
    pub system_prompt: String,

    /// Model name (e.g., "glm-5", "qwen3:8b")
    pub model: String,

    /// OpenAI-compatible endpoint URL
    pub base_url: String,

    /// API key (most local servers don't need this)
    pub api_key: String,

    /// Maximum tokens to generate (None uses provider default)
    pub max_tokens: Option<u32>,

    /// Sampling temperature (0.0 to 2.0)
    pub temperature: f32,

    /// Connect timeout in seconds
    pub timeout: u64,

    /// Tools available to the agent
    pub tools: ToolRegistry,

    /// Maximum request/response rounds within one user turn
    pub max_iterations: u32,

    /// Ask the server for extended reasoning output
    pub thinking: bool,

    /// Stream the response as incremental fragments
    pub stream: bool,

    /// Stream tool-call arguments as they are generated
    pub tool_stream: bool,
}

impl std::fmt::Debug for AgentOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentOptions")
            .field("system_prompt", &self.system_prompt)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &"***")
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .field("tools", &format!("{} tools", self.tools.len()))
            .field("max_iterations", &self.max_iterations)
            .field("thinking", &self.thinking)
            .field("stream", &self.stream)
            .field("tool_stream", &self.tool_stream)
            .finish()
    }
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            model: String::new(),
            base_url: String::new(),
            api_key: "not-needed".to_string(),
            max_tokens: None,
            temperature: 0.7,
            timeout: 60,
            tools: ToolRegistry::default(),
            max_iterations: 10,
            thinking: true,
            stream: true,
            tool_stream: true,
        }
    }
}

impl AgentOptions {
    /// Create a new builder for AgentOptions
    pub fn builder() -> AgentOptionsBuilder {
        AgentOptionsBuilder::default()
    }
}

/// Builder for AgentOptions
#[derive(Default)]
pub struct AgentOptionsBuilder {
    system_prompt: Option<String>,
    model: Option<String>,
    base_url: Option<String>,
    api_key: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    timeout: Option<u64>,
    tools: Option<ToolRegistry>,
    max_iterations: Option<u32>,
    thinking: Option<bool>,
    stream: Option<bool>,
    tool_stream: Option<bool>,
}

impl std::fmt::Debug for AgentOptionsBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentOptionsBuilder")
            .field("system_prompt", &self.system_prompt)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field(
                "tools",
                &format!("{} tools", self.tools.as_ref().map_or(0, |t| t.len())),
            )
            .finish()
    }
}

impl AgentOptionsBuilder {
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn timeout(mut self, timeout: u64) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn max_iterations(mut self, iterations: u32) -> Self {
        self.max_iterations = Some(iterations);
        self
    }

    pub fn thinking(mut self, enabled: bool) -> Self {
        self.thinking = Some(enabled);
        self
    }

    pub fn stream(mut self, enabled: bool) -> Self {
        self.stream = Some(enabled);
        self
    }

    pub fn tool_stream(mut self, enabled: bool) -> Self {
        self.tool_stream = Some(enabled);
        self
    }

    pub fn build(self) -> crate::Result<AgentOptions> {
        let model = self
            .model
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| crate::Error::config("model is required"))?;

        let base_url = self
            .base_url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| crate::Error::config("base_url is required"))?;

        let max_iterations = self.max_iterations.unwrap_or(10);
        if max_iterations == 0 {
            return Err(crate::Error::config("max_iterations must be at least 1"));
        }

        let temperature = self.temperature.unwrap_or(0.7);
        if !(0.0..=2.0).contains(&temperature) {
            return Err(crate::Error::config(format!(
                "temperature must be between 0.0 and 2.0, got {temperature}"
            )));
        }

        Ok(AgentOptions {
            system_prompt: self.system_prompt.unwrap_or_default(),
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: self.api_key.unwrap_or_else(|| "not-needed".to_string()),
            max_tokens: self.max_tokens,
            temperature,
            timeout: self.timeout.unwrap_or(60),
            tools: self.tools.unwrap_or_default(),
            max_iterations,
            thinking: self.thinking.unwrap_or(true),
            stream: self.stream.unwrap_or(true),
            tool_stream: self.tool_stream.unwrap_or(true),
        })
    }
}

/// Message role in the conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One transcript entry, tagged by role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant(AssistantMessage),
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Message::System {
            content: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Message::User {
            content: text.into(),
        }
    }

    pub fn assistant(message: AssistantMessage) -> Self {
        Message::Assistant(message)
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Message::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }

    pub fn role(&self) -> MessageRole {
        match self {
            Message::System { .. } => MessageRole::System,
            Message::User { .. } => MessageRole::User,
            Message::Assistant(_) => MessageRole::Assistant,
            Message::Tool { .. } => MessageRole::Tool,
        }
    }

    /// Text content of the message, if it has any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Message::System { content } | Message::User { content } => Some(content),
            Message::Tool { content, .. } => Some(content),
            Message::Assistant(msg) => msg.content.as_deref(),
        }
    }
}

/// Assistant turn as recorded in the transcript.
///
/// `content` is always serialized; `None` becomes an explicit `null`, which is
/// the shape servers expect for a message that only carries tool calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolInvocation>>,
}

impl AssistantMessage {
    /// Builds the message from aggregated stream output, dropping empty parts.
    pub fn from_parts(answer: String, reasoning: String, tool_calls: Vec<ToolInvocation>) -> Self {
        Self {
            content: Some(answer).filter(|s| !s.is_empty()),
            reasoning_content: Some(reasoning).filter(|s| !s.is_empty()),
            tool_calls: Some(tool_calls).filter(|calls| !calls.is_empty()),
        }
    }

    pub fn tool_calls(&self) -> &[ToolInvocation] {
        self.tool_calls.as_deref().unwrap_or_default()
    }
}

/// A completed tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "OpenAIToolCall", from = "OpenAIToolCall")]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    /// Raw argument text exactly as streamed; parsed only when dispatched.
    pub arguments: String,
}

impl ToolInvocation {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

impl From<ToolInvocation> for OpenAIToolCall {
    fn from(call: ToolInvocation) -> Self {
        OpenAIToolCall {
            id: call.id,
            call_type: "function".to_string(),
            function: OpenAIFunction {
                name: call.name,
                arguments: call.arguments,
            },
        }
    }
}

impl From<OpenAIToolCall> for ToolInvocation {
    fn from(call: OpenAIToolCall) -> Self {
        ToolInvocation {
            id: call.id,
            name: call.function.name,
            arguments: call.function.arguments,
        }
    }
}

/// OpenAI tool call format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub call_type: String,
    pub function: OpenAIFunction,
}

fn function_type() -> String {
    "function".to_string()
}

/// OpenAI function format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIFunction {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

/// `thinking` request extension understood by reasoning-capable servers
#[derive(Debug, Clone, Serialize)]
pub struct ThinkingConfig {
    #[serde(rename = "type")]
    pub kind: String,
}

impl ThinkingConfig {
    pub fn enabled() -> Self {
        Self {
            kind: "enabled".to_string(),
        }
    }
}

/// OpenAI API request
#[derive(Debug, Clone, Serialize)]
pub struct OpenAIRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub stream: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub tool_stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<serde_json::Value>>,
}

impl OpenAIRequest {
    /// Builds a request carrying the whole transcript and the option set.
    pub fn from_options(options: &AgentOptions, messages: &[Message]) -> Self {
        let tools = if options.tools.is_empty() {
            None
        } else {
            Some(options.tools.schemas())
        };

        OpenAIRequest {
            model: options.model.clone(),
            messages: messages.to_vec(),
            stream: options.stream,
            tool_stream: options.stream && options.tool_stream && tools.is_some(),
            thinking: options.thinking.then(ThinkingConfig::enabled),
            max_tokens: options.max_tokens,
            temperature: Some(options.temperature),
            tools,
        }
    }
}

/// OpenAI API streaming chunk
///
/// Every field is defaulted: servers differ in which ones they send, and the
/// aggregator only needs the deltas.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAIChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<OpenAIChoice>,
}

/// OpenAI choice in streaming response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAIChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: OpenAIDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// OpenAI delta in streaming response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAIDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<OpenAIToolCallDelta>>,
}

/// OpenAI tool call delta
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAIToolCallDelta {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "type")]
    pub call_type: Option<String>,
    #[serde(default)]
    pub function: Option<OpenAIFunctionDelta>,
}

/// OpenAI function delta
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAIFunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

/// Non-streaming completion returned when `stream` is false
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAICompletion {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<OpenAICompletionChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAICompletionChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub message: OpenAIResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAIResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<OpenAIToolCall>>,
}

impl OpenAICompletion {
    /// Re-expresses a complete response as a single streaming chunk so one
    /// aggregation path serves both modes.
    pub fn into_chunk(self) -> OpenAIChunk {
        let choices = self
            .choices
            .into_iter()
            .map(|choice| {
                let tool_calls = choice.message.tool_calls.map(|calls| {
                    calls
                        .into_iter()
                        .enumerate()
                        .map(|(index, call)| OpenAIToolCallDelta {
                            index: index as u32,
                            id: Some(call.id).filter(|id| !id.is_empty()),
                            call_type: Some(call.call_type),
                            function: Some(OpenAIFunctionDelta {
                                name: Some(call.function.name),
                                arguments: Some(call.function.arguments),
                            }),
                        })
                        .collect()
                });

                OpenAIChoice {
                    index: choice.index,
                    delta: OpenAIDelta {
                        role: Some("assistant".to_string()),
                        content: choice.message.content,
                        reasoning_content: choice.message.reasoning_content,
                        tool_calls,
                    },
                    finish_reason: choice.finish_reason,
                }
            })
            .collect();

        OpenAIChunk {
            id: self.id,
            object: "chat.completion".to_string(),
            created: 0,
            model: self.model,
            choices,
        }
    }
}
