//! Anthropic Messages API adapter.
//!
//! The Messages protocol differs from the canonical shape in three ways
//! this adapter bridges:
//! - system messages live in a top-level `system` string, not the array;
//! - tool results are `tool_result` blocks inside a *user* turn, so
//!   consecutive canonical `tool` messages fold into one synthetic user
//!   turn (a genuine non-tool turn flushes the pending block first);
//! - tool invocations are `tool_use` content blocks, mapped both ways to
//!   canonical `tool_calls`.
//!
//! Image parts are resolved to base64 and embedded as `image` blocks;
//! unresolvable images degrade to a text placeholder.

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;

use kizuna_core::llm::provider::ChatProvider;
use kizuna_types::chat::{
    AssistantReply, ChatMessage, ChatRole, ContentPart, MessageContent, ToolCall, ToolSpec,
};
use kizuna_types::llm::{ApiFormat, ChatExchange, ChatRequest, ProviderError, body_snippet};

use super::media::MediaResolver;
use super::{http_client, join_url, transport_error, versioned_url};

const DEFAULT_API_VERSION: &str = "2023-06-01";

// No Debug derive: the client must never leak the API key through logs.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    api_version: String,
    resolver: MediaResolver,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum AnthropicBlock {
    Text {
        text: String,
    },
    Image {
        source: ImageSource,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize, PartialEq)]
pub(crate) struct ImageSource {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub media_type: String,
    pub data: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnthropicMessage {
    pub role: &'static str,
    pub content: Vec<AnthropicBlock>,
}

#[derive(Serialize)]
struct AnthropicTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Serialize)]
struct AnthropicRequestBody<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: &'a [AnthropicMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
}

impl AnthropicProvider {
    pub fn new(
        api_url: &str,
        api_key: &str,
        api_version: Option<String>,
        resolver: MediaResolver,
    ) -> Self {
        Self {
            client: http_client(),
            api_key: SecretString::from(api_key),
            base_url: versioned_url(api_url, ApiFormat::Anthropic),
            api_version: api_version
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            resolver,
        }
    }
}

/// Collect every system message into the top-level system string.
pub(crate) fn build_system_text(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .filter(|m| m.role == ChatRole::System)
        .map(|m| m.content.text().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

async fn content_to_blocks(resolver: &MediaResolver, content: &MessageContent) -> Vec<AnthropicBlock> {
    match content {
        MessageContent::Text(text) => {
            if text.is_empty() {
                vec![]
            } else {
                vec![AnthropicBlock::Text { text: text.clone() }]
            }
        }
        MessageContent::Parts(parts) => {
            let mut blocks = Vec::new();
            for part in parts {
                match part {
                    ContentPart::Text { text } => {
                        if !text.is_empty() {
                            blocks.push(AnthropicBlock::Text { text: text.clone() });
                        }
                    }
                    ContentPart::ImageUrl { image_url } => {
                        match resolver.resolve(&image_url.url).await {
                            Some(image) => blocks.push(AnthropicBlock::Image {
                                source: ImageSource {
                                    kind: "base64",
                                    media_type: image.mime_type,
                                    data: image.base64,
                                },
                            }),
                            None if !image_url.url.is_empty() => blocks.push(AnthropicBlock::Text {
                                text: format!("[image] {}", image_url.url),
                            }),
                            None => {}
                        }
                    }
                }
            }
            blocks
        }
    }
}

/// Translate canonical messages into Anthropic turns, folding consecutive
/// tool results into one synthetic user turn.
pub(crate) async fn to_wire(
    resolver: &MediaResolver,
    messages: &[ChatMessage],
) -> Vec<AnthropicMessage> {
    let mut out: Vec<AnthropicMessage> = Vec::new();
    let mut pending_tool_results: Vec<AnthropicBlock> = Vec::new();

    for message in messages {
        match message.role {
            ChatRole::System => continue,
            ChatRole::Tool => {
                if let Some(id) = message.tool_call_id.as_deref().filter(|id| !id.is_empty()) {
                    pending_tool_results.push(AnthropicBlock::ToolResult {
                        tool_use_id: id.to_string(),
                        content: message.content.text(),
                    });
                }
                continue;
            }
            _ => {}
        }

        // A genuine turn flushes the pending tool results first so the
        // order the model saw is preserved.
        if !pending_tool_results.is_empty() {
            out.push(AnthropicMessage {
                role: "user",
                content: std::mem::take(&mut pending_tool_results),
            });
        }

        match message.role {
            ChatRole::User => {
                let blocks = content_to_blocks(resolver, &message.content).await;
                out.push(AnthropicMessage {
                    role: "user",
                    content: if blocks.is_empty() {
                        vec![AnthropicBlock::Text {
                            text: "[empty message]".to_string(),
                        }]
                    } else {
                        blocks
                    },
                });
            }
            ChatRole::Assistant => {
                let mut blocks = Vec::new();
                let text = message.content.text();
                if !text.is_empty() {
                    blocks.push(AnthropicBlock::Text { text });
                }
                for call in &message.tool_calls {
                    let name = call.function.name.trim();
                    if name.is_empty() {
                        continue;
                    }
                    let input: Value =
                        serde_json::from_str(&call.function.arguments).unwrap_or_else(|_| Value::Object(Default::default()));
                    blocks.push(AnthropicBlock::ToolUse {
                        id: call.id.clone(),
                        name: name.to_string(),
                        input,
                    });
                }
                out.push(AnthropicMessage {
                    role: "assistant",
                    content: if blocks.is_empty() {
                        vec![AnthropicBlock::Text { text: String::new() }]
                    } else {
                        blocks
                    },
                });
            }
            _ => unreachable!("system and tool handled above"),
        }
    }

    if !pending_tool_results.is_empty() {
        out.push(AnthropicMessage {
            role: "user",
            content: pending_tool_results,
        });
    }
    out
}

fn to_wire_tools(tools: &[ToolSpec]) -> Vec<AnthropicTool<'_>> {
    tools
        .iter()
        .filter(|t| !t.function.name.trim().is_empty())
        .map(|t| AnthropicTool {
            name: &t.function.name,
            description: &t.function.description,
            input_schema: &t.function.parameters,
        })
        .collect()
}

/// Map the response content blocks back into the canonical reply.
pub(crate) fn extract_reply(data: &Value) -> AssistantReply {
    let blocks = data["content"].as_array().cloned().unwrap_or_default();
    let mut texts = Vec::new();
    let mut tool_calls = Vec::new();

    for (index, block) in blocks.iter().enumerate() {
        match block["type"].as_str() {
            Some("text") => {
                if let Some(text) = block["text"].as_str().filter(|t| !t.is_empty()) {
                    texts.push(text.to_string());
                }
            }
            Some("tool_use") => {
                let Some(name) = block["name"].as_str().map(str::trim).filter(|n| !n.is_empty()) else {
                    continue;
                };
                let id = block["id"]
                    .as_str()
                    .map(str::trim)
                    .filter(|i| !i.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("toolu_{index}"));
                let input = block.get("input").cloned().unwrap_or_else(|| Value::Object(Default::default()));
                tool_calls.push(ToolCall::function(id, name, input.to_string()));
            }
            _ => {}
        }
    }

    let content = texts.join("\n").trim().to_string();
    AssistantReply {
        content: (!content.is_empty()).then_some(content),
        tool_calls,
    }
}

impl ChatProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn send(&self, request: &ChatRequest) -> Result<ChatExchange, ProviderError> {
        let system = build_system_text(&request.messages);
        let messages = to_wire(&self.resolver, &request.messages).await;
        let tools = to_wire_tools(&request.tools);

        let body = AnthropicRequestBody {
            model: &request.model,
            max_tokens: request.max_tokens.max(1),
            messages: &messages,
            system: (!system.is_empty()).then_some(system.as_str()),
            temperature: request.temperature,
            tool_choice: (!tools.is_empty()).then(|| serde_json::json!({ "type": "auto" })),
            tools: (!tools.is_empty()).then_some(tools),
        };

        let response = self
            .client
            .post(join_url(&self.base_url, "messages"))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", &self.api_version)
            .json(&body)
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| transport_error("anthropic", request.timeout.as_millis() as u64, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                provider: "anthropic",
                status: status.as_u16(),
                body: body_snippet(&text, 2000),
            });
        }

        let raw: Value = response.json().await.map_err(|e| ProviderError::Decode {
            provider: "anthropic",
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
    async fn test_system_messages_extracted_not_sent_inline() {
        let messages = vec![
            ChatMessage::system("first rule"),
            ChatMessage::user("hi"),
            ChatMessage::system("second rule"),
        ];
        let system = build_system_text(&messages);
        assert_eq!(system, "first rule\n\nsecond rule");

        let wire = to_wire(&resolver(), &messages).await;
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].role, "user");
    }

    #[tokio::test]
    async fn test_consecutive_tool_results_fold_into_one_user_turn() {
        let messages = vec![
            ChatMessage::user("do two things"),
            ChatMessage::assistant_tool_calls(
                None,
                vec![
                    ToolCall::function("c1", "read_diary", r#"{"date":"2026-08-01"}"#),
                    ToolCall::function("c2", "search_memory", r#"{"query":"sea"}"#),
                ],
            ),
            ChatMessage::tool_result("c1", "read_diary", "nothing"),
            ChatMessage::tool_result("c2", "search_memory", "the sea trip"),
        ];

        let wire = to_wire(&resolver(), &messages).await;
        assert_eq!(wire.len(), 3);
        assert_eq!(wire[1].role, "assistant");
        assert_eq!(wire[2].role, "user");
        assert_eq!(wire[2].content.len(), 2, "both results share one user turn");
        assert!(matches!(
            wire[2].content[0],
            AnthropicBlock::ToolResult { ref tool_use_id, .. } if tool_use_id == "c1"
        ));
    }

    #[tokio::test]
    async fn test_genuine_user_turn_flushes_pending_results_first() {
        let messages = vec![
            ChatMessage::assistant_tool_calls(None, vec![ToolCall::function("c1", "web_search", "{}")]),
            ChatMessage::tool_result("c1", "web_search", "result"),
            ChatMessage::user("actually, never mind"),
        ];

        let wire = to_wire(&resolver(), &messages).await;
        assert_eq!(wire.len(), 3);
        // Pending tool_result turn lands before the genuine user turn.
        assert!(matches!(wire[1].content[0], AnthropicBlock::ToolResult { .. }));
        assert!(matches!(
            wire[2].content[0],
            AnthropicBlock::Text { ref text } if text == "actually, never mind"
        ));
    }

    #[tokio::test]
    async fn test_image_parts_become_base64_blocks() {
        let payload = base64::engine::general_purpose::STANDARD.encode(b"img");
        let messages = vec![ChatMessage::user(MessageContent::Parts(vec![
            ContentPart::text("look at this"),
            ContentPart::image(format!("data:image/jpeg;base64,{payload}")),
        ]))];

        let wire = to_wire(&resolver(), &messages).await;
        assert_eq!(wire[0].content.len(), 2);
        match &wire[0].content[1] {
            AnthropicBlock::Image { source } => {
                assert_eq!(source.kind, "base64");
                assert_eq!(source.media_type, "image/jpeg");
                assert_eq!(source.data, payload);
            }
            other => panic!("expected image block, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unresolvable_image_degrades_to_text() {
        let messages = vec![ChatMessage::user(MessageContent::Parts(vec![ContentPart::image(
            "https://elsewhere.example/cat.png",
        )]))];
        let wire = to_wire(&resolver(), &messages).await;
        assert!(matches!(
            wire[0].content[0],
            AnthropicBlock::Text { ref text } if text.contains("cat.png")
        ));
    }

    #[test]
    fn test_extract_reply_maps_tool_use() {
        let data = json!({
            "content": [
                { "type": "text", "text": "let me check" },
                { "type": "tool_use", "id": "toolu_1", "name": "read_diary", "input": { "date": "2026-08-01" } }
            ]
        });
        let reply = extract_reply(&data);
        assert_eq!(reply.content.as_deref(), Some("let me check"));
        assert_eq!(reply.tool_calls.len(), 1);
        assert_eq!(reply.tool_calls[0].id, "toolu_1");
        assert_eq!(reply.tool_calls[0].function.name, "read_diary");
        let args: Value = serde_json::from_str(&reply.tool_calls[0].function.arguments).unwrap();
        assert_eq!(args["date"], "2026-08-01");
    }

    /// IR -> Anthropic -> (echo) -> IR preserves role sequence, tool name,
    /// tool arguments, and text content.
    #[tokio::test]
    async fn test_round_trip_preserves_semantics() {
        let args = r##"{"label":"sleepy","pill_color":"#7FA8FF"}"##;
        let payload = base64::engine::general_purpose::STANDARD.encode(b"img");
        let messages = vec![
            ChatMessage::system("stay in character"),
            ChatMessage::user(MessageContent::Parts(vec![
                ContentPart::text("here's a photo"),
                ContentPart::image(format!("data:image/png;base64,{payload}")),
            ])),
            ChatMessage::assistant_tool_calls(Some("one sec".to_string()), vec![ToolCall::function("c9", "set_status", args)]),
            ChatMessage::tool_result("c9", "set_status", "Status updated"),
            ChatMessage::assistant("all set"),
        ];

        let wire = to_wire(&resolver(), &messages).await;
        let roles: Vec<&str> = wire.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["user", "assistant", "user", "assistant"]);

        // Echo the assistant turn back through the response extractor.
        let assistant_wire = serde_json::to_value(&wire[1].content).unwrap();
        let echoed = extract_reply(&json!({ "content": assistant_wire }));
        assert_eq!(echoed.content.as_deref(), Some("one sec"));
        assert_eq!(echoed.tool_calls.len(), 1);
        assert_eq!(echoed.tool_calls[0].id, "c9");
        assert_eq!(echoed.tool_calls[0].function.name, "set_status");
        let original: Value = serde_json::from_str(args).unwrap();
        let round_tripped: Value = serde_json::from_str(&echoed.tool_calls[0].function.arguments).unwrap();
        assert_eq!(original, round_tripped);
    }
}
