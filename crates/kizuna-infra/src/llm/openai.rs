//! OpenAI chat-completions adapter.
//!
//! The canonical IR serializes directly into the chat-completions shape,
//! so this path is a pass-through: no message rewriting on the way out,
//! and only `choices[0].message` extraction on the way back.

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;

use kizuna_core::llm::provider::ChatProvider;
use kizuna_types::chat::{AssistantReply, ChatMessage, ToolCall, ToolSpec};
use kizuna_types::llm::{ApiFormat, ChatExchange, ChatRequest, ProviderError, body_snippet};

use super::{http_client, join_url, transport_error, versioned_url};

// No Debug derive: the client must never leak the API key through logs.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
}

#[derive(Serialize)]
struct OpenAiRequestBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolSpec]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    max_tokens: u32,
}

impl OpenAiProvider {
    pub fn new(api_url: &str, api_key: &str) -> Self {
        Self {
            client: http_client(),
            api_key: SecretString::from(api_key),
            base_url: versioned_url(api_url, ApiFormat::OpenAi),
        }
    }
}

/// Pull the assistant message out of a chat-completions response.
pub(crate) fn extract_reply(data: &Value) -> AssistantReply {
    let message = &data["choices"][0]["message"];
    let content = message["content"].as_str().map(str::to_string);
    let tool_calls = message["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .filter_map(|call| {
                    let name = call["function"]["name"].as_str()?.trim();
                    if name.is_empty() {
                        return None;
                    }
                    Some(ToolCall::function(
                        call["id"].as_str().unwrap_or_default(),
                        name,
                        call["function"]["arguments"].as_str().unwrap_or("{}"),
                    ))
                })
                .collect()
        })
        .unwrap_or_default();

    AssistantReply { content, tool_calls }
}

impl ChatProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn send(&self, request: &ChatRequest) -> Result<ChatExchange, ProviderError> {
        let body = OpenAiRequestBody {
            model: &request.model,
            messages: &request.messages,
            tools: (!request.tools.is_empty()).then_some(request.tools.as_slice()),
            tool_choice: (!request.tools.is_empty()).then_some("auto"),
            temperature: request.temperature,
            max_tokens: request.max_tokens.max(1),
        };

        let response = self
            .client
            .post(join_url(&self.base_url, "chat/completions"))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| transport_error("openai", request.timeout.as_millis() as u64, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                provider: "openai",
                status: status.as_u16(),
                body: body_snippet(&text, 2000),
            });
        }

        let raw: Value = response.json().await.map_err(|e| ProviderError::Decode {
            provider: "openai",
            message: e.to_string(),
        })?;

        Ok(ChatExchange {
            message: extract_reply(&raw),
            raw,
        })
    }
}
