//! Provider request/response types and error taxonomy.
//!
//! A [`ChatRequest`] carries the canonical IR regardless of which wire
//! protocol the configured provider speaks; the adapters in kizuna-infra
//! translate it at the boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::chat::{AssistantReply, ChatMessage, ToolSpec};

/// Wire protocol spoken by the configured upstream provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiFormat {
    OpenAi,
    Anthropic,
    Gemini,
}

impl ApiFormat {
    /// Lenient parse used for stored configuration: unknown or blank
    /// values fall back to the OpenAI shape.
    pub fn normalize(raw: &str) -> Self {
        raw.trim().parse().unwrap_or(ApiFormat::OpenAi)
    }
}

impl fmt::Display for ApiFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiFormat::OpenAi => write!(f, "openai"),
            ApiFormat::Anthropic => write!(f, "anthropic"),
            ApiFormat::Gemini => write!(f, "gemini"),
        }
    }
}

impl FromStr for ApiFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(ApiFormat::OpenAi),
            "anthropic" => Ok(ApiFormat::Anthropic),
            "gemini" => Ok(ApiFormat::Gemini),
            other => Err(format!("invalid api format: '{other}'")),
        }
    }
}

/// A chat completion request in the canonical shape.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
    pub temperature: Option<f64>,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
            temperature: None,
            max_tokens: 1024,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// The normalized result of one provider round trip.
///
/// `raw` keeps the provider's original response body for observability;
/// callers must only depend on `message`.
#[derive(Debug, Clone)]
pub struct ChatExchange {
    pub message: AssistantReply,
    pub raw: serde_json::Value,
}

/// Errors from provider calls.
///
/// The adapter never retries internally -- retry policy belongs to the
/// caller, and the agent loop degrades to a fixed fallback reply instead.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Missing URL/key/model, raised eagerly before any network call.
    #[error("missing provider configuration: {0}")]
    MissingConfig(String),

    /// Non-2xx response from the vendor.
    #[error("{provider} returned HTTP {status}: {body}")]
    Http {
        provider: &'static str,
        status: u16,
        body: String,
    },

    /// The request exceeded its deadline.
    #[error("{provider} request timed out after {timeout_ms}ms")]
    Timeout {
        provider: &'static str,
        timeout_ms: u64,
    },

    /// Connection-level failure before a status was received.
    #[error("{provider} transport error: {message}")]
    Transport {
        provider: &'static str,
        message: String,
    },

    /// The vendor answered 2xx with a body we could not interpret.
    #[error("{provider} response decode error: {message}")]
    Decode {
        provider: &'static str,
        message: String,
    },
}

impl ProviderError {
    /// HTTP status associated with the failure, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn provider(&self) -> &str {
        match self {
            ProviderError::MissingConfig(_) => "config",
            ProviderError::Http { provider, .. }
            | ProviderError::Timeout { provider, .. }
            | ProviderError::Transport { provider, .. }
            | ProviderError::Decode { provider, .. } => provider,
        }
    }
}

/// Truncate a provider error body to a loggable snippet.
pub fn body_snippet(body: &str, max_chars: usize) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{cut}\u{2026}")
}
