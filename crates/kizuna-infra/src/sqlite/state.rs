//! SQLite user state repository implementation.
//!
//! Implements `UserStateRepository` from `kizuna-core` using sqlx with
//! split read/write pools. Raw queries, private Row structs, last write
//! wins -- decay is the engine's job, not the repository's.

use sqlx::Row;

use kizuna_core::repository::state::UserStateRepository;
use kizuna_types::error::RepositoryError;
use kizuna_types::state::UserState;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `UserStateRepository`.
pub struct SqliteUserStateRepository {
    pool: DatabasePool,
}

impl SqliteUserStateRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct UserStateRow {
    user_id: String,
    status_label: String,
    status_pill_color: String,
    status_text_color: String,
    status_reason: Option<String>,
    status_updated_at: i64,
    intimacy: i64,
    last_interaction_at: i64,
    updated_at: i64,
}

impl UserStateRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            user_id: row.try_get("user_id")?,
            status_label: row.try_get("status_label")?,
            status_pill_color: row.try_get("status_pill_color")?,
            status_text_color: row.try_get("status_text_color")?,
            status_reason: row.try_get("status_reason")?,
            status_updated_at: row.try_get("status_updated_at")?,
            intimacy: row.try_get("intimacy")?,
            last_interaction_at: row.try_get("last_interaction_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_state(self) -> UserState {
        UserState {
            user_id: self.user_id,
            status_label: self.status_label,
            status_pill_color: self.status_pill_color,
            status_text_color: self.status_text_color,
            status_reason: self.status_reason,
            status_updated_at: self.status_updated_at,
            intimacy: self.intimacy as i32,
            last_interaction_at: self.last_interaction_at,
            updated_at: self.updated_at,
        }
    }
}

impl UserStateRepository for SqliteUserStateRepository {
    async fn get(&self, user_id: &str) -> Result<Option<UserState>, RepositoryError> {
        let row = sqlx::query(
            "SELECT user_id, status_label, status_pill_color, status_text_color,
                    status_reason, status_updated_at, intimacy, last_interaction_at, updated_at
               FROM user_states
              WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.map(|r| UserStateRow::from_row(&r).map(UserStateRow::into_state))
            .transpose()
            .map_err(|e| RepositoryError::Query(e.to_string()))
    }

    async fn save(&self, state: &UserState) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO user_states
                (user_id, status_label, status_pill_color, status_text_color,
                 status_reason, status_updated_at, intimacy, last_interaction_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (user_id) DO UPDATE SET
                status_label = excluded.status_label,
                status_pill_color = excluded.status_pill_color,
                status_text_color = excluded.status_text_color,
                status_reason = excluded.status_reason,
                status_updated_at = excluded.status_updated_at,
                intimacy = excluded.intimacy,
                last_interaction_at = excluded.last_interaction_at,
                updated_at = excluded.updated_at",
        )
        .bind(&state.user_id)
        .bind(&state.status_label)
        .bind(&state.status_pill_color)
        .bind(&state.status_text_color)
        .bind(&state.status_reason)
        .bind(state.status_updated_at)
        .bind(state.intimacy)
        .bind(state.last_interaction_at)
        .bind(state.updated_at)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }
}
