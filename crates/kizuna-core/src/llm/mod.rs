//! Provider port and shared call instrumentation.
//!
//! Every provider call in the system goes through [`traced_send`], so the
//! `llm_request` / `llm_response` / `llm_error` events carry identical
//! fields no matter which wire protocol is configured.

pub mod box_provider;
pub mod provider;

use std::time::Instant;

use tracing::{error, info};

use kizuna_types::chat::{ChatMessage, ChatRole, MessageContent};
use kizuna_types::llm::{ChatExchange, ChatRequest, ProviderError};

use self::box_provider::BoxChatProvider;

/// Truncate text to a loggable snippet.
pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    let trimmed = value.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{cut}\u{2026}")
}

/// Compact per-message summary included in `llm_request` events.
///
/// Only the trailing `limit` messages are summarized; bodies are truncated
/// so a long history never floods the log stream.
fn summarize_messages(messages: &[ChatMessage], limit: usize) -> Vec<serde_json::Value> {
    let start = messages.len().saturating_sub(limit);
    messages[start..]
        .iter()
        .map(|msg| {
            let text_cap = if msg.role == ChatRole::System { 400 } else { 800 };
            let mut entry = serde_json::json!({
                "role": msg.role.to_string(),
                "text": truncate_text(&msg.content.text(), text_cap),
            });
            if let MessageContent::Parts(parts) = &msg.content {
                let kinds: Vec<&str> = parts
                    .iter()
                    .map(|p| match p {
                        kizuna_types::chat::ContentPart::Text { .. } => "text",
                        kizuna_types::chat::ContentPart::ImageUrl { .. } => "image_url",
                    })
                    .collect();
                entry["parts"] = serde_json::json!(kinds);
            }
            if !msg.tool_calls.is_empty() {
                let names: Vec<&str> = msg
                    .tool_calls
                    .iter()
                    .map(|c| c.function.name.as_str())
                    .collect();
                entry["tool_calls"] = serde_json::json!(names);
            }
            if let Some(id) = &msg.tool_call_id {
                entry["tool_call_id"] = serde_json::json!(id);
            }
            entry
        })
        .collect()
}

/// Send a request through the provider with uniform before/after telemetry.
///
/// Errors pass through untouched -- no retries here.
pub async fn traced_send(
    provider: &BoxChatProvider,
    request: &ChatRequest,
    scope: &str,
    user_id: Option<&str>,
) -> Result<ChatExchange, ProviderError> {
    let started = Instant::now();

    info!(
        event = "llm_request",
        scope,
        user_id,
        provider = provider.name(),
        model = %request.model,
        message_count = request.messages.len(),
        tool_count = request.tools.len(),
        timeout_ms = request.timeout.as_millis() as u64,
        messages = %serde_json::Value::Array(summarize_messages(&request.messages, 8)),
        "sending chat request"
    );

    match provider.send(request).await {
        Ok(exchange) => {
            let tool_names: Vec<&str> = exchange
                .message
                .tool_calls
                .iter()
                .map(|c| c.function.name.as_str())
                .collect();
            info!(
                event = "llm_response",
                scope,
                user_id,
                provider = provider.name(),
                model = %request.model,
                duration_ms = started.elapsed().as_millis() as u64,
                content = exchange.message.content.as_deref().map(|c| truncate_text(c, 1200)),
                tool_calls = ?tool_names,
                "chat response received"
            );
            Ok(exchange)
        }
        Err(err) => {
            error!(
                event = "llm_error",
                scope,
                user_id,
                provider = provider.name(),
                model = %request.model,
                duration_ms = started.elapsed().as_millis() as u64,
                status = err.status(),
                error = %err,
                "chat request failed"
            );
            Err(err)
        }
    }
}
