//! Chat endpoint.
//!
//! Persists the inbound user message first (so a crash mid-turn never
//! loses what the user said), runs the agent, then persists the reply
//! with `reply_to` pointing back at the user message for cascade
//! deletion.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kizuna_core::agent::service::{AttachmentKind, ChatAttachment, ChatInput};
use kizuna_core::repository::conversation::ConversationRepository;
use kizuna_core::sanitize::sanitize_text;
use kizuna_core::timefmt::{date_from_client_iso, local_date, parse_zone};
use kizuna_types::conversation::{ConversationLog, ConversationRole};
use kizuna_types::state::StatusPayload;

use kizuna_infra::llm::build_provider;

use crate::http::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequestBody {
    pub user_id: String,
    pub message: String,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentBody>,
    #[serde(default)]
    pub inline_image: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub client_time_iso: Option<String>,
    #[serde(default)]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AttachmentBody {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponseBody {
    pub reply: String,
    pub message_id: String,
    pub reply_message_id: String,
    pub status: StatusPayload,
    pub intimacy: i32,
}

pub async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatRequestBody>,
) -> Result<Json<ChatResponseBody>, ApiError> {
    let user_id = body.user_id.trim().to_string();
    if user_id.is_empty() {
        return Err(ApiError::BadRequest("user_id is required".to_string()));
    }

    let settings = state.settings_snapshot().await;
    let provider = build_provider(&settings.provider)
        .map_err(|e| ApiError::BadRequest(format!("provider not configured: {e}")))?;

    let now = Utc::now().timestamp_millis();
    let zone_name = body
        .time_zone
        .clone()
        .filter(|z| !z.trim().is_empty())
        .unwrap_or_else(|| settings.agent.time_zone.clone());
    let date = body
        .client_time_iso
        .as_deref()
        .and_then(date_from_client_iso)
        .unwrap_or_else(|| local_date(now, parse_zone(Some(&zone_name))));

    // Save the user turn before any model work.
    let user_log_id = body
        .message_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let attachments_json: Vec<serde_json::Value> = body
        .attachments
        .iter()
        .map(|a| serde_json::to_value(a).unwrap_or_default())
        .collect();
    state
        .conversations
        .save(&ConversationLog {
            id: user_log_id.clone(),
            user_id: user_id.clone(),
            date: date.clone(),
            role: ConversationRole::User,
            content: sanitize_text(&body.message),
            attachments: attachments_json,
            reply_to: body.reply_to.clone(),
            timestamp: now,
            user_name: body.user_name.clone(),
            time_zone: Some(zone_name.clone()),
        })
        .await?;

    let input = ChatInput {
        user_id: user_id.clone(),
        log_id: Some(user_log_id.clone()),
        message_text: body.message,
        attachments: body
            .attachments
            .iter()
            .map(|a| ChatAttachment {
                kind: if a.kind.eq_ignore_ascii_case("image") {
                    AttachmentKind::Image
                } else {
                    AttachmentKind::Document
                },
                url: a.url.clone(),
                name: a.name.clone(),
            })
            .collect(),
        inline_image: body.inline_image,
        user_name: body.user_name.clone(),
        platform: body.platform,
        client_time_iso: body.client_time_iso,
        model: body.model,
    };

    let output = state.chat.run_chat(&provider, &settings, input, now).await?;

    // Persist the companion reply, chained to the user turn.
    let reply_log_id = Uuid::new_v4().to_string();
    state
        .conversations
        .save(&ConversationLog {
            id: reply_log_id.clone(),
            user_id,
            date: output.context_date.clone(),
            role: ConversationRole::Companion,
            content: output.reply.clone(),
            attachments: vec![],
            reply_to: Some(user_log_id.clone()),
            timestamp: Utc::now().timestamp_millis(),
            user_name: body.user_name,
            time_zone: Some(zone_name),
        })
        .await?;

    Ok(Json(ChatResponseBody {
        reply: output.reply,
        message_id: user_log_id,
        reply_message_id: reply_log_id,
        status: output.status,
        intimacy: output.intimacy,
    }))
}
