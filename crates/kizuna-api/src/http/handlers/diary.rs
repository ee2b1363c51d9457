//! Diary read endpoint.

use axum::Json;
use axum::extract::{Path, State};

use kizuna_core::repository::diary::DiaryRepository;
use kizuna_types::conversation::DiaryEntry;

use crate::http::error::ApiError;
use crate::state::AppState;

pub async fn get_diary(
    State(state): State<AppState>,
    Path((user_id, date)): Path<(String, String)>,
) -> Result<Json<DiaryEntry>, ApiError> {
    let entry = state
        .diaries
        .get(&user_id, &date)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(entry))
}
