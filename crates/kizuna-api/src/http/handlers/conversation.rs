//! Conversation deletion and edit-history endpoints.
//!
//! DELETE also serves as the best-effort unwind for a user-initiated
//! cancel: the in-flight server work cannot be truly aborted, but its
//! visible effects (the message and its replies) are tombstoned away.

use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;

use kizuna_core::repository::conversation::ConversationRepository;

use crate::http::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: u64,
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path((user_id, log_id)): Path<(String, String)>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let deleted = state
        .conversations
        .delete_cascade(&user_id, &[log_id])
        .await?;
    Ok(Json(DeleteResponse { deleted }))
}

#[derive(Debug, serde::Deserialize)]
pub struct EditRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct EditResponse {
    pub message_id: String,
    pub version_index: i64,
}

/// Edit a message in place, snapshotting the prior content as a new
/// version so the UI can show edit history.
pub async fn edit_message(
    State(state): State<AppState>,
    Path((user_id, log_id)): Path<(String, String)>,
    Json(body): Json<EditRequest>,
) -> Result<Json<EditResponse>, ApiError> {
    let content = body.content.trim();
    if content.is_empty() {
        return Err(ApiError::BadRequest("content is required".to_string()));
    }

    if state.conversations.is_tombstoned(&user_id, &log_id).await? {
        return Err(ApiError::NotFound);
    }
    let Some(mut log) = state.conversations.get(&user_id, &log_id).await? else {
        return Err(ApiError::NotFound);
    };

    let now = chrono::Utc::now().timestamp_millis();
    let version_index = state
        .conversations
        .push_version(&log_id, &log.content, now)
        .await?;

    log.content = content.to_string();
    state.conversations.save(&log).await?;

    Ok(Json(EditResponse {
        message_id: log_id,
        version_index,
    }))
}

#[derive(Debug, Serialize)]
pub struct VersionView {
    pub message_id: String,
    pub version_index: i64,
    pub content: String,
    pub created_at: i64,
}

pub async fn list_versions(
    State(state): State<AppState>,
    Path((_user_id, log_id)): Path<(String, String)>,
) -> Result<Json<Vec<VersionView>>, ApiError> {
    let versions = state.conversations.list_versions(&log_id).await?;
    Ok(Json(
        versions
            .into_iter()
            .map(|v| VersionView {
                message_id: v.log_id,
                version_index: v.version_index,
                content: v.content,
                created_at: v.created_at,
            })
            .collect(),
    ))
}
