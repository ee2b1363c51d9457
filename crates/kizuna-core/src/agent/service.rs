//! Chat turn orchestration.
//!
//! `ChatService::run_chat` is the inbound-message entry point: it loads
//! relationship state and recent history, composes the system prompt,
//! drives the tool loop, and persists the touched state. Saving the
//! conversation log rows themselves stays with the HTTP layer, which owns
//! the client-supplied message ids.

use tracing::{info, warn};

use kizuna_types::chat::{ChatMessage, ContentPart, MessageContent};
use kizuna_types::error::RepositoryError;
use kizuna_types::settings::RuntimeSettings;
use kizuna_types::state::StatusPayload;

use crate::llm::box_provider::BoxChatProvider;
use crate::relationship::RelationshipEngine;
use crate::repository::conversation::ConversationRepository;
use crate::repository::diary::ProfileRepository;
use crate::repository::fact::FactRepository;
use crate::repository::state::UserStateRepository;
use crate::sanitize::{sanitize_reply, sanitize_text};
use crate::timefmt::{date_from_client_iso, local_date, parse_zone, previous_iso_date};

use super::prompt::{PromptContext, compose_system_prompt};
use super::history::build_two_day_history;
use super::runner::{FALLBACK_REPLY, LoopConfig, ToolExecutor, run_tool_loop};
use super::toolbox::{ACTIVE_FACT_LIMIT, ToolContext};

/// An attachment riding along with a chat message.
#[derive(Debug, Clone)]
pub struct ChatAttachment {
    pub kind: AttachmentKind,
    pub url: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Image,
    Document,
}

/// One inbound chat request.
#[derive(Debug, Clone, Default)]
pub struct ChatInput {
    pub user_id: String,
    /// Id of the already-saved user log row, when the route stored it first.
    pub log_id: Option<String>,
    pub message_text: String,
    pub attachments: Vec<ChatAttachment>,
    pub inline_image: Option<String>,
    pub user_name: Option<String>,
    pub platform: Option<String>,
    pub client_time_iso: Option<String>,
    pub model: Option<String>,
}

impl Default for AttachmentKind {
    fn default() -> Self {
        AttachmentKind::Document
    }
}

/// What the UI consumes from one turn.
#[derive(Debug, Clone)]
pub struct ChatOutput {
    pub reply: String,
    pub status: StatusPayload,
    pub intimacy: i32,
    /// Calendar date the turn was filed under.
    pub context_date: String,
}

/// Orchestrates one conversation turn end to end.
pub struct ChatService<C, Pr, S, F, T>
where
    C: ConversationRepository,
    Pr: ProfileRepository,
    S: UserStateRepository,
    F: FactRepository,
    T: ToolExecutor,
{
    conversations: C,
    profiles: Pr,
    engine: RelationshipEngine<S>,
    facts: F,
    toolbox: T,
}

impl<C, Pr, S, F, T> ChatService<C, Pr, S, F, T>
where
    C: ConversationRepository,
    Pr: ProfileRepository,
    S: UserStateRepository,
    F: FactRepository,
    T: ToolExecutor,
{
    pub fn new(
        conversations: C,
        profiles: Pr,
        engine: RelationshipEngine<S>,
        facts: F,
        toolbox: T,
    ) -> Self {
        Self {
            conversations,
            profiles,
            engine,
            facts,
            toolbox,
        }
    }

    /// Run one chat turn. Never returns a provider error -- the loop
    /// degrades to fallback text; only repository failures surface.
    pub async fn run_chat(
        &self,
        provider: &BoxChatProvider,
        settings: &RuntimeSettings,
        input: ChatInput,
        now: i64,
    ) -> Result<ChatOutput, RepositoryError> {
        info!(
            event = "chat_in",
            user_id = %input.user_id,
            platform = input.platform.as_deref(),
            log_id = input.log_id.as_deref(),
            message = %crate::llm::truncate_text(&input.message_text, 400),
            attachments = input.attachments.len(),
            has_inline_image = input.inline_image.is_some(),
            "chat request received"
        );

        let context_date = self.resolve_context_date(&input, settings, now).await;
        let yesterday = previous_iso_date(&context_date);

        let today_logs = self.logs_for_date(&input, &context_date).await;
        let yesterday_logs = match &yesterday {
            Some(date) => self
                .conversations
                .fetch_by_date(&input.user_id, date)
                .await
                .unwrap_or_default(),
            None => Vec::new(),
        };

        let profile_snippet = self.load_profile_snippet(&input.user_id).await;
        let notes_snippet = self.load_notes_snippet(&input.user_id).await;
        let first_interaction_at = self
            .conversations
            .first_timestamp(&input.user_id)
            .await
            .unwrap_or_else(|err| {
                warn!(user_id = %input.user_id, error = %err, "first timestamp load failed");
                None
            });

        let state = self.engine.load(&input.user_id, now).await?.touched(now);

        let (local_date_str, clock_time) = client_date_time(input.client_time_iso.as_deref());
        let prompt_ctx = PromptContext {
            template: settings.agent.system_template.clone(),
            user_name: input.user_name.clone(),
            platform: input.platform.clone(),
            local_date: local_date_str,
            clock_time,
            first_interaction_at,
            profile_snippet,
            notes_snippet,
            now,
        };

        let mut messages = vec![ChatMessage::system(String::new())];
        messages.extend(build_two_day_history(
            &context_date,
            &today_logs,
            yesterday.as_deref(),
            &yesterday_logs,
        ));
        messages.push(build_user_turn(&input));

        let config = LoopConfig {
            model: input
                .model
                .clone()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| settings.provider.model.clone()),
            temperature: settings.agent.temperature,
            max_tokens: settings.agent.max_tokens,
            timeout: std::time::Duration::from_millis(settings.agent.timeout_ms),
        };
        let tool_ctx = ToolContext {
            user_id: input.user_id.clone(),
            user_name: input.user_name.clone(),
            context_date: context_date.clone(),
            now,
        };

        let outcome = run_tool_loop(
            provider,
            &self.toolbox,
            &tool_ctx,
            &config,
            |state| compose_system_prompt(&prompt_ctx, state),
            messages,
            state,
        )
        .await;

        let final_state = self.engine.save_touched(outcome.state, now).await?;
        let reply = {
            let cleaned = sanitize_reply(&outcome.reply);
            if cleaned.is_empty() {
                FALLBACK_REPLY.to_string()
            } else {
                cleaned
            }
        };

        info!(
            event = "chat_out",
            user_id = %input.user_id,
            reply = %crate::llm::truncate_text(&reply, 400),
            intimacy = final_state.intimacy,
            status_label = %final_state.status_label,
            "chat reply produced"
        );

        Ok(ChatOutput {
            reply,
            status: StatusPayload::from(&final_state),
            intimacy: final_state.intimacy,
            context_date,
        })
    }

    /// Date the turn belongs to: the stored log's date wins, then the
    /// client clock, then the server clock in the configured zone.
    async fn resolve_context_date(
        &self,
        input: &ChatInput,
        settings: &RuntimeSettings,
        now: i64,
    ) -> String {
        if let Some(log_id) = input.log_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
            match self.conversations.log_date(&input.user_id, log_id).await {
                Ok(Some(date)) => return date,
                Ok(None) => {}
                Err(err) => {
                    warn!(user_id = %input.user_id, log_id, error = %err, "log date lookup failed");
                }
            }
        }
        if let Some(date) = input.client_time_iso.as_deref().and_then(date_from_client_iso) {
            return date;
        }
        local_date(now, parse_zone(Some(&settings.agent.time_zone)))
    }

    async fn logs_for_date(
        &self,
        input: &ChatInput,
        date: &str,
    ) -> Vec<kizuna_types::conversation::ConversationLog> {
        let mut logs = self
            .conversations
            .fetch_by_date(&input.user_id, date)
            .await
            .unwrap_or_default();
        if let Some(exclude) = input.log_id.as_deref() {
            logs.retain(|log| log.id != exclude);
        }
        logs
    }

    async fn load_profile_snippet(&self, user_id: &str) -> String {
        match self.profiles.get(user_id).await {
            Ok(Some(profile)) => profile
                .content
                .as_deref()
                .map(build_profile_snippet)
                .unwrap_or_default(),
            Ok(None) => String::new(),
            Err(err) => {
                warn!(user_id, error = %err, "profile load failed");
                String::new()
            }
        }
    }

    async fn load_notes_snippet(&self, user_id: &str) -> String {
        match self.facts.active_facts(user_id, ACTIVE_FACT_LIMIT).await {
            Ok(facts) => facts
                .iter()
                .take(10)
                .map(|f| format!("- [{}] {}", f.id, f.content))
                .collect::<Vec<_>>()
                .join("\n"),
            Err(err) => {
                warn!(user_id, error = %err, "facts load failed");
                String::new()
            }
        }
    }
}

/// Categories rendered from a stored profile, in display order.
const PROFILE_CATEGORIES: [&str; 5] = ["facts", "likes", "boundaries", "speech_style", "relationship"];
const PROFILE_SNIPPET_MAX_LINES: usize = 6;

/// Condense a stored profile JSON into a few prompt lines. Unparseable
/// content degrades to a plain-text prefix.
pub fn build_profile_snippet(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let Ok(data) = serde_json::from_str::<serde_json::Value>(trimmed) else {
        return trimmed.chars().take(400).collect();
    };

    let mut lines = Vec::new();
    'outer: for category in PROFILE_CATEGORIES {
        let Some(items) = data.get(category).and_then(|v| v.as_array()) else {
            continue;
        };
        for item in items.iter().take(2) {
            if let Some(text) = item.as_str().map(str::trim).filter(|t| !t.is_empty()) {
                lines.push(format!("- {category}: {text}"));
                if lines.len() >= PROFILE_SNIPPET_MAX_LINES {
                    break 'outer;
                }
            }
        }
    }
    lines.join("\n")
}

/// Assemble the user turn from text, inline image, and attachments.
fn build_user_turn(input: &ChatInput) -> ChatMessage {
    let text = sanitize_text(&input.message_text);
    let mut parts = Vec::new();

    if !text.is_empty() {
        parts.push(ContentPart::text(text));
    }
    if let Some(url) = input.inline_image.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        parts.push(ContentPart::image(url));
    }
    for attachment in &input.attachments {
        match attachment.kind {
            AttachmentKind::Image => parts.push(ContentPart::image(attachment.url.clone())),
            AttachmentKind::Document => {
                let name = attachment.name.as_deref().unwrap_or("document");
                parts.push(ContentPart::text(format!("[attached document] {name}")));
            }
        }
    }

    if parts.is_empty() {
        return ChatMessage::user("[empty message]");
    }
    if parts.len() == 1 {
        if let ContentPart::Text { text } = &parts[0] {
            return ChatMessage::user(text.clone());
        }
    }
    ChatMessage::user(MessageContent::Parts(parts))
}

/// Split a client ISO time into display date and clock strings.
fn client_date_time(client_time_iso: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(raw) = client_time_iso.map(str::trim).filter(|t| t.len() >= 16) else {
        return (None, None);
    };
    let Some(date) = date_from_client_iso(raw) else {
        return (None, None);
    };
    // "YYYY-MM-DDTHH:MM..." -- take the HH:MM right after the 'T'.
    let clock = raw.get(11..16).filter(|c| c.as_bytes()[2] == b':').map(str::to_string);
    (Some(date), clock)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_snippet_orders_and_caps() {
        let content = serde_json::json!({
            "facts": ["works nights", "lives alone", "third fact ignored"],
            "likes": ["coffee", "rain"],
            "boundaries": ["no weight talk"],
            "speech_style": ["dry humor"],
            "relationship": ["warming up"]
        })
        .to_string();

        let snippet = build_profile_snippet(&content);
        let lines: Vec<&str> = snippet.lines().collect();
        assert_eq!(lines.len(), PROFILE_SNIPPET_MAX_LINES);
        assert!(lines[0].starts_with("- facts:"));
        assert!(!snippet.contains("third fact ignored"));
    }

    #[test]
    fn test_profile_snippet_plain_text_fallback() {
        let snippet = build_profile_snippet("not json at all");
        assert_eq!(snippet, "not json at all");
    }

    #[test]
    fn test_build_user_turn_plain_text() {
        let input = ChatInput {
            message_text: "[21:00] hello".to_string(),
            ..Default::default()
        };
        let turn = build_user_turn(&input);
        assert_eq!(turn.content, MessageContent::Text("hello".to_string()));
    }

    #[test]
    fn test_build_user_turn_with_images_and_documents() {
        let input = ChatInput {
            message_text: "look".to_string(),
            inline_image: Some("https://media.local/media/a.png".to_string()),
            attachments: vec![ChatAttachment {
                kind: AttachmentKind::Document,
                url: "https://media.local/media/report.pdf".to_string(),
                name: Some("report.pdf".to_string()),
            }],
            ..Default::default()
        };
        let turn = build_user_turn(&input);
        match turn.content {
            MessageContent::Parts(parts) => {
                assert_eq!(parts.len(), 3);
                assert!(matches!(parts[1], ContentPart::ImageUrl { .. }));
            }
            _ => panic!("expected parts"),
        }
    }

    #[test]
    fn test_build_user_turn_empty_message() {
        let turn = build_user_turn(&ChatInput::default());
        assert_eq!(turn.content, MessageContent::Text("[empty message]".to_string()));
    }

    #[test]
    fn test_client_date_time() {
        let (date, clock) = client_date_time(Some("2026-08-07T21:03:00+09:00"));
        assert_eq!(date.as_deref(), Some("2026-08-07"));
        assert_eq!(clock.as_deref(), Some("21:03"));

        assert_eq!(client_date_time(Some("junk")), (None, None));
        assert_eq!(client_date_time(None), (None, None));
    }
}
