//! SQLite proactive repository implementation.

use sqlx::Row;

use kizuna_core::repository::proactive::ProactiveRepository;
use kizuna_types::error::RepositoryError;
use kizuna_types::proactive::{NotificationChannel, ProactiveMessage, ProactiveStatus, ProactiveUserState};

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ProactiveRepository`.
pub struct SqliteProactiveRepository {
    pool: DatabasePool,
}

impl SqliteProactiveRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct ProactiveMessageRow {
    id: String,
    user_id: String,
    content: String,
    trigger_context: String,
    status: String,
    notification_channel: String,
    notification_sent: i64,
    notification_error: Option<String>,
    created_at: i64,
    delivered_at: Option<i64>,
    expires_at: i64,
}

impl ProactiveMessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            content: row.try_get("content")?,
            trigger_context: row.try_get("trigger_context")?,
            status: row.try_get("status")?,
            notification_channel: row.try_get("notification_channel")?,
            notification_sent: row.try_get("notification_sent")?,
            notification_error: row.try_get("notification_error")?,
            created_at: row.try_get("created_at")?,
            delivered_at: row.try_get("delivered_at")?,
            expires_at: row.try_get("expires_at")?,
        })
    }

    fn into_message(self) -> Result<ProactiveMessage, RepositoryError> {
        let status: ProactiveStatus = self
            .status
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let notification_channel: NotificationChannel = self
            .notification_channel
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;

        Ok(ProactiveMessage {
            id: self.id,
            user_id: self.user_id,
            content: self.content,
            trigger_context: self.trigger_context,
            status,
            notification_channel,
            notification_sent: self.notification_sent != 0,
            notification_error: self.notification_error,
            created_at: self.created_at,
            delivered_at: self.delivered_at,
            expires_at: self.expires_at,
        })
    }
}

impl ProactiveRepository for SqliteProactiveRepository {
    async fn get_state(&self, user_id: &str) -> Result<Option<ProactiveUserState>, RepositoryError> {
        let row = sqlx::query(
            "SELECT user_id, last_proactive_at, daily_count, daily_count_date, updated_at
               FROM proactive_user_states WHERE user_id = ? LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.map(|r| {
            Ok(ProactiveUserState {
                user_id: r.try_get("user_id").map_err(|e| RepositoryError::Query(e.to_string()))?,
                last_proactive_at: r
                    .try_get("last_proactive_at")
                    .map_err(|e| RepositoryError::Query(e.to_string()))?,
                daily_count: r.try_get("daily_count").map_err(|e| RepositoryError::Query(e.to_string()))?,
                daily_count_date: r
                    .try_get("daily_count_date")
                    .map_err(|e| RepositoryError::Query(e.to_string()))?,
                updated_at: r.try_get("updated_at").map_err(|e| RepositoryError::Query(e.to_string()))?,
            })
        })
        .transpose()
    }

    async fn save_state(&self, state: &ProactiveUserState) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO proactive_user_states
                (user_id, last_proactive_at, daily_count, daily_count_date, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (user_id) DO UPDATE SET
                last_proactive_at = excluded.last_proactive_at,
                daily_count = excluded.daily_count,
                daily_count_date = excluded.daily_count_date,
                updated_at = excluded.updated_at",
        )
        .bind(&state.user_id)
        .bind(state.last_proactive_at)
        .bind(state.daily_count)
        .bind(&state.daily_count_date)
        .bind(state.updated_at)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }

    async fn save_message(&self, message: &ProactiveMessage) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO proactive_messages
                (id, user_id, content, trigger_context, status, notification_channel,
                 notification_sent, notification_error, created_at, delivered_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (id) DO UPDATE SET
                status = excluded.status,
                notification_sent = excluded.notification_sent,
                notification_error = excluded.notification_error,
                delivered_at = excluded.delivered_at",
        )
        .bind(&message.id)
        .bind(&message.user_id)
        .bind(&message.content)
        .bind(&message.trigger_context)
        .bind(message.status.to_string())
        .bind(message.notification_channel.to_string())
        .bind(i64::from(message.notification_sent))
        .bind(&message.notification_error)
        .bind(message.created_at)
        .bind(message.delivered_at)
        .bind(message.expires_at)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }

    async fn pending_messages(&self, user_id: &str, now: i64) -> Result<Vec<ProactiveMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, user_id, content, trigger_context, status, notification_channel,
                    notification_sent, notification_error, created_at, delivered_at, expires_at
               FROM proactive_messages
              WHERE user_id = ? AND status = 'pending' AND expires_at > ?
              ORDER BY created_at ASC",
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter()
            .map(|row| {
                ProactiveMessageRow::from_row(row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?
                    .into_message()
            })
            .collect()
    }

    async fn mark_delivered(&self, ids: &[String], now: i64) -> Result<u64, RepositoryError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "UPDATE proactive_messages
                SET status = 'delivered', delivered_at = ?
              WHERE id IN ({placeholders}) AND status = 'pending'"
        );
        let mut query = sqlx::query(&sql).bind(now);
        for id in ids {
            query = query.bind(id);
        }
        let result = query
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn expire_stale(&self, now: i64) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE proactive_messages
                SET status = 'expired'
              WHERE status = 'pending' AND expires_at <= ?",
        )
        .bind(now)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(result.rows_affected())
    }
}
