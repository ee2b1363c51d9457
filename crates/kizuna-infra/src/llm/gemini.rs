//! Gemini generateContent adapter.
//!
//! Protocol differences bridged here:
//! - system text moves to `systemInstruction`;
//! - assistant turns use role `model`;
//! - tool calls/results are `functionCall` / `functionResponse` parts
//!   (results ride in a `user` turn keyed by function name, not call id);
//! - tool declarations become `functionDeclarations` with an AUTO calling
//!   config;
//! - images become `inlineData` parts.

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use kizuna_core::llm::provider::ChatProvider;
use kizuna_types::chat::{
    AssistantReply, ChatMessage, ChatRole, ContentPart, MessageContent, ToolCall, ToolSpec,
};
use kizuna_types::llm::{ApiFormat, ChatExchange, ChatRequest, ProviderError, body_snippet};

use super::media::MediaResolver;
use super::{http_client, join_url, transport_error, versioned_url};

// No Debug derive: the client must never leak the API key through logs.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    resolver: MediaResolver,
}

// Untagged: each variant serializes as a bare part object
// ({"text": ...}, {"inlineData": ...}, {"functionCall": ...}).
#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub(crate) enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: FunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: FunctionResponse,
    },
}

#[derive(Debug, Serialize, PartialEq)]
pub(crate) struct InlineData {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub(crate) struct FunctionCall {
    pub name: String,
    pub args: Value,
}

#[derive(Debug, Serialize, PartialEq)]
pub(crate) struct FunctionResponse {
    pub name: String,
    pub response: Value,
}

#[derive(Debug, Serialize)]
pub(crate) struct GeminiContent {
    pub role: &'static str,
    pub parts: Vec<GeminiPart>,
}

impl GeminiProvider {
    pub fn new(api_url: &str, api_key: &str, resolver: MediaResolver) -> Self {
        Self {
            client: http_client(),
            api_key: SecretString::from(api_key),
            base_url: versioned_url(api_url, ApiFormat::Gemini),
            resolver,
        }
    }
}

async fn content_to_parts(resolver: &MediaResolver, content: &MessageContent) -> Vec<GeminiPart> {
    match content {
        MessageContent::Text(text) => {
            if text.is_empty() {
                vec![]
            } else {
                vec![GeminiPart::Text { text: text.clone() }]
            }
        }
        MessageContent::Parts(parts) => {
            let mut out = Vec::new();
            for part in parts {
                match part {
                    ContentPart::Text { text } => {
                        if !text.is_empty() {
                            out.push(GeminiPart::Text { text: text.clone() });
                        }
                    }
                    ContentPart::ImageUrl { image_url } => match resolver.resolve(&image_url.url).await {
                        Some(image) => out.push(GeminiPart::InlineData {
                            inline_data: InlineData {
                                mime_type: image.mime_type,
                                data: image.base64,
                            },
                        }),
                        None if !image_url.url.is_empty() => out.push(GeminiPart::Text {
                            text: format!("[image] {}", image_url.url),
                        }),
                        None => {}
                    },
                }
            }
            out
        }
    }
}

/// Translate canonical messages into Gemini contents.
pub(crate) async fn to_wire(resolver: &MediaResolver, messages: &[ChatMessage]) -> Vec<GeminiContent> {
    let mut contents = Vec::new();

    for message in messages {
        match message.role {
            ChatRole::System => continue,
            ChatRole::User => {
                let parts = content_to_parts(resolver, &message.content).await;
                contents.push(GeminiContent {
                    role: "user",
                    parts: if parts.is_empty() {
                        vec![GeminiPart::Text {
                            text: "[empty message]".to_string(),
                        }]
                    } else {
                        parts
                    },
                });
            }
            ChatRole::Assistant => {
                let mut parts = Vec::new();
                let text = message.content.text();
                if !text.is_empty() {
                    parts.push(GeminiPart::Text { text });
                }
                for call in &message.tool_calls {
                    let name = call.function.name.trim();
                    if name.is_empty() {
                        continue;
                    }
                    let args: Value = serde_json::from_str(&call.function.arguments)
                        .unwrap_or_else(|_| Value::Object(Default::default()));
                    parts.push(GeminiPart::FunctionCall {
                        function_call: FunctionCall {
                            name: name.to_string(),
                            args,
                        },
                    });
                }
                contents.push(GeminiContent {
                    role: "model",
                    parts: if parts.is_empty() {
                        vec![GeminiPart::Text { text: String::new() }]
                    } else {
                        parts
                    },
                });
            }
            ChatRole::Tool => {
                let Some(name) = message.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) else {
                    continue;
                };
                contents.push(GeminiContent {
                    role: "user",
                    parts: vec![GeminiPart::FunctionResponse {
                        function_response: FunctionResponse {
                            name: name.to_string(),
                            response: serde_json::json!({ "result": message.content.text() }),
                        },
                    }],
                });
            }
        }
    }
    contents
}

fn to_wire_tools(tools: &[ToolSpec]) -> Vec<Value> {
    tools
        .iter()
        .filter(|t| !t.function.name.trim().is_empty())
        .map(|t| {
            serde_json::json!({
                "name": t.function.name,
                "description": t.function.description,
                "parameters": t.function.parameters,
            })
        })
        .collect()
}

/// Map `candidates[0].content.parts` back into the canonical reply.
pub(crate) fn extract_reply(data: &Value) -> AssistantReply {
    let parts = data["candidates"][0]["content"]["parts"]
        .as_array()
        .cloned()
        .unwrap_or_default();
    let mut texts = Vec::new();
    let mut tool_calls = Vec::new();

    for part in &parts {
        if let Some(text) = part["text"].as_str().filter(|t| !t.is_empty()) {
            texts.push(text.to_string());
            continue;
        }
        let call = &part["functionCall"];
        if let Some(name) = call["name"].as_str().map(str::trim).filter(|n| !n.is_empty()) {
            let args = call.get("args").cloned().unwrap_or_else(|| Value::Object(Default::default()));
            // Gemini does not assign call ids; synthesize one so results
            // can round-trip through the canonical shape.
            tool_calls.push(ToolCall::function(
                format!("gemini_{}", Uuid::new_v4()),
                name,
                args.to_string(),
            ));
        }
    }

    let content = texts.join("\n").trim().to_string();
    AssistantReply {
        content: (!content.is_empty()).then_some(content),
        tool_calls,
    }
}

impl ChatProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn send(&self, request: &ChatRequest) -> Result<ChatExchange, ProviderError> {
        let system = super::anthropic::build_system_text(&request.messages);
        let contents = to_wire(&self.resolver, &request.messages).await;
        let declarations = to_wire_tools(&request.tools);

        let model = request.model.strip_prefix("models/").unwrap_or(&request.model);
        let mut body = serde_json::json!({
            "contents": contents,
            "generationConfig": {
                "maxOutputTokens": request.max_tokens.max(1),
            },
        });
        if let Some(temperature) = request.temperature {
            body["generationConfig"]["temperature"] = serde_json::json!(temperature);
        }
        if !system.is_empty() {
            body["systemInstruction"] = serde_json::json!({ "parts": [{ "text": system }] });
        }
        if !declarations.is_empty() {
            body["tools"] = serde_json::json!([{ "functionDeclarations": declarations }]);
            body["toolConfig"] = serde_json::json!({ "functionCallingConfig": { "mode": "AUTO" } });
        }

        let url = join_url(&self.base_url, &format!("models/{model}:generateContent"));
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.expose_secret())])
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| transport_error("gemini", request.timeout.as_millis() as u64, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                provider: "gemini",
                status: status.as_u16(),
                body: body_snippet(&text, 2000),
            });
        }

        let raw: Value = response.json().await.map_err(|e| ProviderError::Decode {
            provider: "gemini",
            message: e.to_string(),
        })?;

        Ok(ChatExchange {
            message: extract_reply(&raw),
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use serde_json::json;

    fn resolver() -> MediaResolver {
        MediaResolver::data_urls_only()
    }

    #[tokio::test]
    async fn test_roles_and_function_parts() {
        let messages = vec![
            ChatMessage::system("rules"),
            ChatMessage::user("hi"),
            ChatMessage::assistant_tool_calls(None, vec![ToolCall::function("c1", "web_search", r#"{"query":"sea"}"#)]),
            ChatMessage::tool_result("c1", "web_search", "three results"),
            ChatMessage::assistant("done"),
        ];

        let wire = to_wire(&resolver(), &messages).await;
        let roles: Vec<&str> = wire.iter().map(|c| c.role).collect();
        assert_eq!(roles, vec!["user", "model", "user", "model"]);

        assert!(matches!(
            wire[1].parts[0],
            GeminiPart::FunctionCall { ref function_call } if function_call.name == "web_search"
        ));
        match &wire[2].parts[0] {
            GeminiPart::FunctionResponse { function_response } => {
                assert_eq!(function_response.name, "web_search");
                assert_eq!(function_response.response["result"], "three results");
            }
            other => panic!("expected function response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_images_become_inline_data() {
        let payload = base64::engine::general_purpose::STANDARD.encode(b"img");
        let messages = vec![ChatMessage::user(MessageContent::Parts(vec![
            ContentPart::text("see"),
            ContentPart::image(format!("data:image/webp;base64,{payload}")),
        ]))];

        let wire = to_wire(&resolver(), &messages).await;
        match &wire[0].parts[1] {
            GeminiPart::InlineData { inline_data } => {
                assert_eq!(inline_data.mime_type, "image/webp");
                assert_eq!(inline_data.data, payload);
            }
            other => panic!("expected inline data, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_reply_synthesizes_call_ids() {
        let data = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "checking" },
                        { "functionCall": { "name": "read_diary", "args": { "date": "2026-08-01" } } }
                    ]
                }
            }]
        });
        let reply = extract_reply(&data);
        assert_eq!(reply.content.as_deref(), Some("checking"));
        assert_eq!(reply.tool_calls.len(), 1);
        assert!(reply.tool_calls[0].id.starts_with("gemini_"));
        let args: Value = serde_json::from_str(&reply.tool_calls[0].function.arguments).unwrap();
        assert_eq!(args["date"], "2026-08-01");
    }

    /// IR -> Gemini -> (echo) -> IR preserves role sequence, tool name,
    /// tool arguments, and text content.
    #[tokio::test]
    async fn test_round_trip_preserves_semantics() {
        let args = r#"{"delta":-5,"reason":"that stung"}"#;
        let messages = vec![
            ChatMessage::user("that was mean"),
            ChatMessage::assistant_tool_calls(Some("ow".to_string()), vec![ToolCall::function("c1", "update_intimacy", args)]),
        ];

        let wire = to_wire(&resolver(), &messages).await;
        let parts_value = serde_json::to_value(&wire[1].parts).unwrap();
        let echoed = extract_reply(&json!({
            "candidates": [{ "content": { "parts": parts_value } }]
        }));

        assert_eq!(echoed.content.as_deref(), Some("ow"));
        assert_eq!(echoed.tool_calls.len(), 1);
        assert_eq!(echoed.tool_calls[0].function.name, "update_intimacy");
        let original: Value = serde_json::from_str(args).unwrap();
        let round_tripped: Value = serde_json::from_str(&echoed.tool_calls[0].function.arguments).unwrap();
        assert_eq!(original, round_tripped);
    }
}
