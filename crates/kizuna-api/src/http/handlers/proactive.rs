//! Proactive message pull endpoint.
//!
//! The client polls here; each pull expires stale messages globally,
//! returns the caller's pending ones, and marks them delivered in the
//! same pass (at-most-once per pull, not exactly-once across restarts).

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use kizuna_core::repository::proactive::ProactiveRepository;

use crate::http::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PullRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct PulledMessage {
    pub id: String,
    pub content: String,
    pub created_at: i64,
}

#[derive(Debug, Serialize)]
pub struct PullResponse {
    pub messages: Vec<PulledMessage>,
}

pub async fn pull(
    State(state): State<AppState>,
    Json(body): Json<PullRequest>,
) -> Result<Json<PullResponse>, ApiError> {
    let user_id = body.user_id.trim();
    if user_id.is_empty() {
        return Err(ApiError::BadRequest("user_id is required".to_string()));
    }

    let now = Utc::now().timestamp_millis();
    state.proactive_repo.expire_stale(now).await?;

    let pending = state.proactive_repo.pending_messages(user_id, now).await?;
    if pending.is_empty() {
        return Ok(Json(PullResponse { messages: vec![] }));
    }

    let ids: Vec<String> = pending.iter().map(|m| m.id.clone()).collect();
    state.proactive_repo.mark_delivered(&ids, now).await?;

    Ok(Json(PullResponse {
        messages: pending
            .into_iter()
            .map(|m| PulledMessage {
                id: m.id,
                content: m.content,
                created_at: m.created_at,
            })
            .collect(),
    }))
}
