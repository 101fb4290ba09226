//! Configuration helpers for the local agent

use std::env;
use std::str::FromStr;

/// Environment variable overriding the endpoint URL.
pub const BASE_URL_ENV: &str = "LOCAL_AGENT_BASE_URL";

/// Environment variable overriding the model name.
pub const MODEL_ENV: &str = "LOCAL_AGENT_MODEL";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "LOCAL_AGENT_API_KEY";

/// Secondary API key variable, read when [`API_KEY_ENV`] is unset.
pub const FALLBACK_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Supported provider shortcuts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    LMStudio,
    Ollama,
    LlamaCpp,
    VLLM,
    Zhipu,
    OpenAI,
}

impl Provider {
    /// Get the default base URL for this provider
    pub fn default_url(&self) -> &'static str {
        match self {
            Provider::LMStudio => "http://localhost:1234/v1",
            Provider::Ollama => "http://localhost:11434/v1",
            Provider::LlamaCpp => "http://localhost:8080/v1",
            Provider::VLLM => "http://localhost:8000/v1",
            Provider::Zhipu => "https://open.bigmodel.cn/api/paas/v4",
            Provider::OpenAI => "https://api.openai.com/v1",
        }
    }
}

impl FromStr for Provider {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_lowercase().as_str() {
            "lmstudio" | "lm-studio" | "lm_studio" => Ok(Provider::LMStudio),
            "ollama" => Ok(Provider::Ollama),
            "llamacpp" | "llama-cpp" | "llama_cpp" | "llama.cpp" => Ok(Provider::LlamaCpp),
            "vllm" => Ok(Provider::VLLM),
            "zhipu" | "glm" | "bigmodel" => Ok(Provider::Zhipu),
            "openai" => Ok(Provider::OpenAI),
            other => Err(crate::Error::config(format!("unknown provider: {other}"))),
        }
    }
}

/// Get the base URL from environment variable or provider default
///
/// Priority:
/// 1. `LOCAL_AGENT_BASE_URL` environment variable
/// 2. Provider default URL (if provider is Some)
/// 3. fallback parameter
/// 4. LM Studio's default URL
pub fn get_base_url(provider: Option<Provider>, fallback: Option<&str>) -> String {
    resolve_base_url(|key| env::var(key).ok(), provider, fallback)
}

/// Get the model name from environment variable or fallback
///
/// When `prefer_env` is true, `LOCAL_AGENT_MODEL` wins over `fallback`.
pub fn get_model(fallback: Option<&str>, prefer_env: bool) -> Option<String> {
    resolve_model(|key| env::var(key).ok(), fallback, prefer_env)
}

/// Get the API key from `LOCAL_AGENT_API_KEY`, then `OPENAI_API_KEY`.
pub fn get_api_key() -> Option<String> {
    resolve_api_key(|key| env::var(key).ok())
}

fn resolve_base_url(
    lookup: impl Fn(&str) -> Option<String>,
    provider: Option<Provider>,
    fallback: Option<&str>,
) -> String {
    if let Some(url) = lookup(BASE_URL_ENV) {
        return url;
    }

    if let Some(p) = provider {
        return p.default_url().to_string();
    }

    fallback
        .unwrap_or(Provider::LMStudio.default_url())
        .to_string()
}

fn resolve_model(
    lookup: impl Fn(&str) -> Option<String>,
    fallback: Option<&str>,
    prefer_env: bool,
) -> Option<String> {
    if prefer_env {
        if let Some(model) = lookup(MODEL_ENV) {
            return Some(model);
        }
    }

    fallback.map(|s| s.to_string())
}

fn resolve_api_key(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    lookup(API_KEY_ENV)
        .or_else(|| lookup(FALLBACK_API_KEY_ENV))
        .filter(|key| !key.trim().is_empty())
}
