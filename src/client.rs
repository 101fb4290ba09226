//! Remote chat service access.
//!
//! The agent talks to the model through the [`ChatBackend`] trait: one call
//! takes a request and yields a stream of [`OpenAIChunk`]s. [`HttpBackend`] is
//! the real implementation, POSTing to an OpenAI-compatible
//! `/chat/completions` endpoint. Tests swap in scripted backends.
//!
//! # Streaming and non-streaming
//!
//! With `stream: true` the response body is Server-Sent Events and every
//! event becomes one chunk. With `stream: false` the single completion is
//! adapted into one chunk carrying the whole message, so the same aggregator
//! handles both shapes:
//!
//! ```text
//! stream: true    data: {...}\n\n data: {...}\n\n data: [DONE]  ─┐
//!                                                                ├─▶ ChunkStream
//! stream: false   { "choices": [{ "message": {...} }] } ─────────┘
//! ```
//!
//! # Timeouts
//!
//! Only connection setup is bounded (`AgentOptions::timeout`). A streamed
//! response may legitimately run for minutes while the model reasons.

use crate::stream::{ChunkStream, parse_sse_stream};
use crate::types::{AgentOptions, OpenAICompletion, OpenAIRequest};
use crate::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;

/// A remote chat-completion service.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Sends one request and returns the response as a chunk stream.
    ///
    /// Transport failures and non-success statuses are returned as `Err`;
    /// problems inside an already-open stream surface as `Err` items.
    async fn chat(&self, request: &OpenAIRequest) -> Result<ChunkStream>;
}

/// [`ChatBackend`] speaking the OpenAI chat-completions protocol over HTTP.
#[derive(Clone)]
pub struct HttpBackend {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpBackend {
    /// Builds a backend from the endpoint settings in `options`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the HTTP client cannot be built.
    pub fn new(options: &AgentOptions) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(options.timeout))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: options.base_url.trim_end_matches('/').to_string(),
            api_key: options.api_key.clone(),
        })
    }

    /// Endpoint the backend posts to.
    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.base_url)
            .field("api_key", &"***")
            .finish()
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn chat(&self, request: &OpenAIRequest) -> Result<ChunkStream> {
        log::debug!(
            "POST {} model={} messages={} tools={} stream={}",
            self.endpoint(),
            request.model,
            request.messages.len(),
            request.tools.as_ref().map_or(0, Vec::len),
            request.stream
        );

        let response = self
            .http_client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(Error::Http)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_else(|e| {
                log::warn!("failed to read error response body: {}", e);
                "Unknown error (failed to read response body)".to_string()
            });
            return Err(Error::api(format!("API error {}: {}", status, body)));
        }

        if request.stream {
            return Ok(parse_sse_stream(response.bytes_stream()));
        }

        let completion: OpenAICompletion = response.json().await?;
        let chunk = completion.into_chunk();
        Ok(Box::pin(futures::stream::once(async move { Ok(chunk) })))
    }
}
