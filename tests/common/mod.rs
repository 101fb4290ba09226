//! Shared helpers for integration tests: a scripted in-memory backend and
//! chunk constructors.

#![allow(dead_code)]

use async_trait::async_trait;
use local_agent::{
    AgentOptions, ChatBackend, ChunkStream, Error, OpenAIChoice, OpenAIChunk, OpenAIDelta,
    OpenAIFunctionDelta, OpenAIRequest, OpenAIToolCallDelta, Result, ToolRegistry,
};
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Backend that replays prepared chunk sequences, one per request.
///
/// When the script runs out, `repeat` (if set) is replayed forever;
/// otherwise the request fails with an API error.
#[derive(Default)]
pub struct ScriptedBackend {
    rounds: Mutex<VecDeque<Vec<Result<OpenAIChunk>>>>,
    repeat: Option<Vec<OpenAIChunk>>,
    requests: Mutex<Vec<OpenAIRequest>>,
}

impl ScriptedBackend {
    pub fn new(rounds: Vec<Vec<OpenAIChunk>>) -> Arc<Self> {
        Arc::new(Self {
            rounds: Mutex::new(
                rounds
                    .into_iter()
                    .map(|round| round.into_iter().map(Ok).collect())
                    .collect(),
            ),
            ..Default::default()
        })
    }

    /// Replays the same round for every request.
    pub fn repeating(round: Vec<OpenAIChunk>) -> Arc<Self> {
        Arc::new(Self {
            repeat: Some(round),
            ..Default::default()
        })
    }

    /// One round whose items may include stream errors.
    pub fn with_items(items: Vec<Result<OpenAIChunk>>) -> Arc<Self> {
        Arc::new(Self {
            rounds: Mutex::new(VecDeque::from([items])),
            ..Default::default()
        })
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<OpenAIRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn chat(&self, request: &OpenAIRequest) -> Result<ChunkStream> {
        self.requests.lock().unwrap().push(request.clone());

        let items = match self.rounds.lock().unwrap().pop_front() {
            Some(items) => items,
            None => match &self.repeat {
                Some(round) => round.iter().cloned().map(Ok).collect(),
                None => return Err(Error::api("API error 500: script exhausted")),
            },
        };
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

/// Backend that stops making progress: either it never answers, or it
/// sends a few chunks and then goes quiet without closing the stream.
pub struct StalledBackend {
    prefix: Option<Vec<OpenAIChunk>>,
}

impl StalledBackend {
    pub fn connecting() -> Arc<Self> {
        Arc::new(Self { prefix: None })
    }

    pub fn after(chunks: Vec<OpenAIChunk>) -> Arc<Self> {
        Arc::new(Self {
            prefix: Some(chunks),
        })
    }
}

#[async_trait]
impl ChatBackend for StalledBackend {
    async fn chat(&self, _request: &OpenAIRequest) -> Result<ChunkStream> {
        let Some(prefix) = self.prefix.clone() else {
            return futures::future::pending().await;
        };
        let stream = futures::stream::iter(prefix.into_iter().map(Ok)).chain(futures::stream::pending());
        Ok(Box::pin(stream))
    }
}

fn chunk(delta: OpenAIDelta) -> OpenAIChunk {
    OpenAIChunk {
        id: "chatcmpl-test".to_string(),
        object: "chat.completion.chunk".to_string(),
        model: "glm-test".to_string(),
        choices: vec![OpenAIChoice {
            delta,
            ..Default::default()
        }],
        ..Default::default()
    }
}

pub fn reasoning(text: &str) -> OpenAIChunk {
    chunk(OpenAIDelta {
        reasoning_content: Some(text.to_string()),
        ..Default::default()
    })
}

pub fn answer(text: &str) -> OpenAIChunk {
    chunk(OpenAIDelta {
        content: Some(text.to_string()),
        ..Default::default()
    })
}

/// First fragment of a tool call: carries id and name.
pub fn call_start(index: u32, id: &str, name: &str) -> OpenAIChunk {
    chunk(OpenAIDelta {
        tool_calls: Some(vec![OpenAIToolCallDelta {
            index,
            id: Some(id.to_string()),
            call_type: Some("function".to_string()),
            function: Some(OpenAIFunctionDelta {
                name: Some(name.to_string()),
                arguments: Some(String::new()),
            }),
        }]),
        ..Default::default()
    })
}

/// Follow-up fragment: argument text only.
pub fn call_args(index: u32, arguments: &str) -> OpenAIChunk {
    chunk(OpenAIDelta {
        tool_calls: Some(vec![OpenAIToolCallDelta {
            index,
            function: Some(OpenAIFunctionDelta {
                name: None,
                arguments: Some(arguments.to_string()),
            }),
            ..Default::default()
        }]),
        ..Default::default()
    })
}

/// A complete tool call in one fragment.
pub fn call(index: u32, id: &str, name: &str, arguments: &str) -> Vec<OpenAIChunk> {
    vec![call_start(index, id, name), call_args(index, arguments)]
}

/// Chunk with no choices, as some servers send for usage reports.
pub fn empty() -> OpenAIChunk {
    OpenAIChunk::default()
}

pub fn options(tools: ToolRegistry) -> AgentOptions {
    let _ = env_logger::builder().is_test(true).try_init();
    AgentOptions::builder()
        .system_prompt("You are a test assistant.")
        .model("glm-test")
        .base_url("http://localhost:1234/v1")
        .tools(tools)
        .build()
        .unwrap()
}
