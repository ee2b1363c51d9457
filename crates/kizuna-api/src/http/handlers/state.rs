//! Relationship state endpoint: the decayed view the UI renders.

use axum::Json;
use axum::extract::{Path, State};
use chrono::Utc;
use serde::Serialize;

use kizuna_types::state::StatusPayload;

use crate::http::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UserStateView {
    pub user_id: String,
    pub status: StatusPayload,
    pub intimacy: i32,
    pub last_interaction_at: i64,
}

pub async fn get_state(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserStateView>, ApiError> {
    let now = Utc::now().timestamp_millis();
    let user_state = state.engine.load(&user_id, now).await?;
    Ok(Json(UserStateView {
        status: StatusPayload::from(&user_state),
        intimacy: user_state.intimacy,
        last_interaction_at: user_state.last_interaction_at,
        user_id: user_state.user_id,
    }))
}
