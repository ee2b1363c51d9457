//! SQLite conversation log repository implementation.
//!
//! Append-only log rows with tombstoned deletion. Deleting a log cascades
//! over the `reply_to` chain so a retracted user message also removes the
//! companion replies that answered it.

use sqlx::Row;

use kizuna_core::repository::conversation::{ConversationRepository, JobCandidate};
use kizuna_types::conversation::{ConversationLog, ConversationRole, MessageVersion};
use kizuna_types::error::RepositoryError;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ConversationRepository`.
pub struct SqliteConversationRepository {
    pool: DatabasePool,
}

impl SqliteConversationRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct ConversationLogRow {
    id: String,
    user_id: String,
    date: String,
    role: String,
    content: String,
    attachments: String,
    reply_to: Option<String>,
    timestamp: i64,
    user_name: Option<String>,
    time_zone: Option<String>,
}

impl ConversationLogRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            date: row.try_get("date")?,
            role: row.try_get("role")?,
            content: row.try_get("content")?,
            attachments: row.try_get("attachments")?,
            reply_to: row.try_get("reply_to")?,
            timestamp: row.try_get("timestamp")?,
            user_name: row.try_get("user_name")?,
            time_zone: row.try_get("time_zone")?,
        })
    }

    fn into_log(self) -> Result<ConversationLog, RepositoryError> {
        let role: ConversationRole = self
            .role
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let attachments = serde_json::from_str(&self.attachments).unwrap_or_default();

        Ok(ConversationLog {
            id: self.id,
            user_id: self.user_id,
            date: self.date,
            role,
            content: self.content,
            attachments,
            reply_to: self.reply_to,
            timestamp: self.timestamp,
            user_name: self.user_name,
            time_zone: self.time_zone,
        })
    }
}

const LOG_COLUMNS: &str = "id, user_id, date, role, content, attachments, reply_to, timestamp, user_name, time_zone";

fn rows_to_logs(rows: Vec<sqlx::sqlite::SqliteRow>) -> Result<Vec<ConversationLog>, RepositoryError> {
    rows.iter()
        .map(|row| {
            ConversationLogRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?
                .into_log()
        })
        .collect()
}

impl ConversationRepository for SqliteConversationRepository {
    async fn save(&self, log: &ConversationLog) -> Result<(), RepositoryError> {
        let attachments = serde_json::to_string(&log.attachments)
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query(
            "INSERT INTO conversation_logs
                (id, user_id, date, role, content, attachments, reply_to, timestamp, user_name, time_zone, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (id) DO UPDATE SET
                user_id = excluded.user_id,
                date = excluded.date,
                role = excluded.role,
                content = excluded.content,
                attachments = excluded.attachments,
                reply_to = COALESCE(excluded.reply_to, conversation_logs.reply_to),
                timestamp = excluded.timestamp,
                user_name = excluded.user_name,
                time_zone = excluded.time_zone",
        )
        .bind(&log.id)
        .bind(&log.user_id)
        .bind(&log.date)
        .bind(log.role.to_string())
        .bind(&log.content)
        .bind(attachments)
        .bind(&log.reply_to)
        .bind(log.timestamp)
        .bind(&log.user_name)
        .bind(&log.time_zone)
        .bind(log.timestamp)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, user_id: &str, log_id: &str) -> Result<Option<ConversationLog>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {LOG_COLUMNS} FROM conversation_logs
              WHERE user_id = ? AND id = ? LIMIT 1"
        ))
        .bind(user_id)
        .bind(log_id)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.map(|r| {
            ConversationLogRow::from_row(&r)
                .map_err(|e| RepositoryError::Query(e.to_string()))?
                .into_log()
        })
        .transpose()
    }

    async fn fetch_by_date(&self, user_id: &str, date: &str) -> Result<Vec<ConversationLog>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {LOG_COLUMNS} FROM conversation_logs
              WHERE user_id = ? AND date = ?
              ORDER BY timestamp ASC"
        ))
        .bind(user_id)
        .bind(date)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
        rows_to_logs(rows)
    }

    async fn fetch_after(
        &self,
        user_id: &str,
        after: i64,
        limit: i64,
        roles: Option<&[ConversationRole]>,
    ) -> Result<Vec<ConversationLog>, RepositoryError> {
        let limit = limit.clamp(1, 200);
        let rows = match roles.filter(|r| !r.is_empty()) {
            Some(roles) => {
                let placeholders = vec!["?"; roles.len()].join(", ");
                let sql = format!(
                    "SELECT {LOG_COLUMNS} FROM conversation_logs
                      WHERE user_id = ? AND timestamp > ? AND role IN ({placeholders})
                      ORDER BY timestamp ASC LIMIT ?"
                );
                let mut query = sqlx::query(&sql).bind(user_id).bind(after);
                for role in roles {
                    query = query.bind(role.to_string());
                }
                query
                    .bind(limit)
                    .fetch_all(&self.pool.reader)
                    .await
                    .map_err(|e| RepositoryError::Query(e.to_string()))?
            }
            None => sqlx::query(&format!(
                "SELECT {LOG_COLUMNS} FROM conversation_logs
                  WHERE user_id = ? AND timestamp > ?
                  ORDER BY timestamp ASC LIMIT ?"
            ))
            .bind(user_id)
            .bind(after)
            .bind(limit)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?,
        };
        rows_to_logs(rows)
    }

    async fn log_date(&self, user_id: &str, log_id: &str) -> Result<Option<String>, RepositoryError> {
        let row = sqlx::query(
            "SELECT date FROM conversation_logs WHERE user_id = ? AND id = ? LIMIT 1",
        )
        .bind(user_id)
        .bind(log_id)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(row
            .map(|r| r.try_get::<String, _>("date"))
            .transpose()
            .map_err(|e| RepositoryError::Query(e.to_string()))?
            .filter(|d| !d.is_empty()))
    }

    async fn last_date_before(&self, user_id: &str, before_date: &str) -> Result<Option<String>, RepositoryError> {
        let row = sqlx::query(
            "SELECT date FROM conversation_logs
              WHERE user_id = ? AND date < ?
              ORDER BY date DESC LIMIT 1",
        )
        .bind(user_id)
        .bind(before_date)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.map(|r| r.try_get("date"))
            .transpose()
            .map_err(|e| RepositoryError::Query(e.to_string()))
    }

    async fn first_timestamp(&self, user_id: &str) -> Result<Option<i64>, RepositoryError> {
        let row = sqlx::query(
            "SELECT timestamp FROM conversation_logs
              WHERE user_id = ? ORDER BY timestamp ASC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.map(|r| r.try_get("timestamp"))
            .transpose()
            .map_err(|e| RepositoryError::Query(e.to_string()))
    }

    async fn pending_diary_users(&self, date: &str) -> Result<Vec<JobCandidate>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT logs.user_id AS user_id,
                    MAX(logs.user_name) AS user_name,
                    MAX(logs.time_zone) AS time_zone
               FROM conversation_logs logs
               LEFT JOIN diary_entries diary
                 ON diary.user_id = logs.user_id AND diary.date = logs.date AND diary.status = 'ready'
              WHERE logs.date = ? AND diary.id IS NULL
              GROUP BY logs.user_id",
        )
        .bind(date)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter()
            .map(|row| {
                Ok(JobCandidate {
                    user_id: row.try_get("user_id").map_err(|e| RepositoryError::Query(e.to_string()))?,
                    user_name: row.try_get("user_name").map_err(|e| RepositoryError::Query(e.to_string()))?,
                    time_zone: row.try_get("time_zone").map_err(|e| RepositoryError::Query(e.to_string()))?,
                })
            })
            .collect()
    }

    async fn active_users_since(&self, since: i64, limit: i64) -> Result<Vec<JobCandidate>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT user_id,
                    MAX(user_name) AS user_name,
                    MAX(time_zone) AS time_zone
               FROM conversation_logs
              WHERE timestamp > ?
              GROUP BY user_id
              ORDER BY MAX(timestamp) DESC
              LIMIT ?",
        )
        .bind(since)
        .bind(limit.clamp(1, 10_000))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter()
            .map(|row| {
                Ok(JobCandidate {
                    user_id: row.try_get("user_id").map_err(|e| RepositoryError::Query(e.to_string()))?,
                    user_name: row.try_get("user_name").map_err(|e| RepositoryError::Query(e.to_string()))?,
                    time_zone: row.try_get("time_zone").map_err(|e| RepositoryError::Query(e.to_string()))?,
                })
            })
            .collect()
    }

    async fn delete_cascade(&self, user_id: &str, ids: &[String]) -> Result<u64, RepositoryError> {
        let ids: Vec<&str> = ids.iter().map(String::as_str).filter(|id| !id.trim().is_empty()).collect();
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(", ");

        // Collect dependent replies first so their tombstones are written too.
        let sql = format!(
            "SELECT id FROM conversation_logs WHERE user_id = ? AND reply_to IN ({placeholders})"
        );
        let mut query = sqlx::query(&sql).bind(user_id);
        for id in &ids {
            query = query.bind(*id);
        }
        let reply_rows = query
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let mut tombstone_ids: Vec<String> = ids.iter().map(|s| s.to_string()).collect();
        for row in &reply_rows {
            let id: String = row.try_get("id").map_err(|e| RepositoryError::Query(e.to_string()))?;
            if !tombstone_ids.contains(&id) {
                tombstone_ids.push(id);
            }
        }

        let now = chrono::Utc::now().timestamp_millis();
        for id in &tombstone_ids {
            sqlx::query(
                "INSERT INTO conversation_log_tombstones (user_id, log_id, deleted_at)
                 VALUES (?, ?, ?)
                 ON CONFLICT (user_id, log_id) DO UPDATE SET
                    deleted_at = MAX(conversation_log_tombstones.deleted_at, excluded.deleted_at)",
            )
            .bind(user_id)
            .bind(id)
            .bind(now)
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        }

        let tomb_placeholders = vec!["?"; tombstone_ids.len()].join(", ");
        let sql = format!(
            "DELETE FROM conversation_logs
              WHERE user_id = ? AND (id IN ({tomb_placeholders}) OR reply_to IN ({placeholders}))"
        );
        let mut query = sqlx::query(&sql).bind(user_id);
        for id in &tombstone_ids {
            query = query.bind(id);
        }
        for id in &ids {
            query = query.bind(*id);
        }
        let result = query
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn is_tombstoned(&self, user_id: &str, log_id: &str) -> Result<bool, RepositoryError> {
        let row = sqlx::query(
            "SELECT 1 AS ok FROM conversation_log_tombstones
              WHERE user_id = ? AND log_id = ? LIMIT 1",
        )
        .bind(user_id)
        .bind(log_id)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(row.is_some())
    }

    async fn push_version(&self, log_id: &str, content: &str, now: i64) -> Result<i64, RepositoryError> {
        let row = sqlx::query(
            "SELECT COALESCE(MAX(version_index) + 1, 0) AS next
               FROM conversation_log_versions WHERE log_id = ?",
        )
        .bind(log_id)
        .fetch_one(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let next: i64 = row.try_get("next").map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query(
            "INSERT INTO conversation_log_versions (log_id, version_index, content, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(log_id)
        .bind(next)
        .bind(content)
        .bind(now)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(next)
    }

    async fn list_versions(&self, log_id: &str) -> Result<Vec<MessageVersion>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT log_id, version_index, content, created_at
               FROM conversation_log_versions
              WHERE log_id = ?
              ORDER BY version_index ASC",
        )
        .bind(log_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter()
            .map(|row| {
                Ok(MessageVersion {
                    log_id: row.try_get("log_id").map_err(|e| RepositoryError::Query(e.to_string()))?,
                    version_index: row
                        .try_get("version_index")
                        .map_err(|e| RepositoryError::Query(e.to_string()))?,
                    content: row.try_get("content").map_err(|e| RepositoryError::Query(e.to_string()))?,
                    created_at: row
                        .try_get("created_at")
                        .map_err(|e| RepositoryError::Query(e.to_string()))?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::pool::test_pool;

    fn log(id: &str, role: ConversationRole, date: &str, ts: i64, reply_to: Option<&str>) -> ConversationLog {
        ConversationLog {
            id: id.to_string(),
            user_id: "u1".to_string(),
            date: date.to_string(),
            role,
            content: format!("content of {id}"),
            attachments: vec![],
            reply_to: reply_to.map(str::to_string),
            timestamp: ts,
            user_name: Some("Rin".to_string()),
            time_zone: Some("UTC".to_string()),
        }
    }

    #[tokio::test]
    async fn test_save_and_fetch_by_date_ordered() {
        let (_dir, pool) = test_pool().await;
        let repo = SqliteConversationRepository::new(pool);

        repo.save(&log("b", ConversationRole::Companion, "2026-08-07", 200, None)).await.unwrap();
        repo.save(&log("a", ConversationRole::User, "2026-08-07", 100, None)).await.unwrap();
        repo.save(&log("c", ConversationRole::User, "2026-08-06", 50, None)).await.unwrap();

        let logs = repo.fetch_by_date("u1", "2026-08-07").await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].id, "a");
        assert_eq!(logs[1].id, "b");
    }

    #[tokio::test]
    async fn test_fetch_after_with_role_filter() {
        let (_dir, pool) = test_pool().await;
        let repo = SqliteConversationRepository::new(pool);

        repo.save(&log("a", ConversationRole::User, "2026-08-07", 100, None)).await.unwrap();
        repo.save(&log("b", ConversationRole::Companion, "2026-08-07", 200, None)).await.unwrap();

        let only_user = repo
            .fetch_after("u1", 0, 10, Some(&[ConversationRole::User]))
            .await
            .unwrap();
        assert_eq!(only_user.len(), 1);
        assert_eq!(only_user[0].id, "a");

        let after = repo.fetch_after("u1", 150, 10, None).await.unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].id, "b");
    }

    #[tokio::test]
    async fn test_delete_cascade_follows_reply_chain() {
        let (_dir, pool) = test_pool().await;
        let repo = SqliteConversationRepository::new(pool);

        repo.save(&log("q", ConversationRole::User, "2026-08-07", 100, None)).await.unwrap();
        repo.save(&log("r", ConversationRole::Companion, "2026-08-07", 200, Some("q"))).await.unwrap();
        repo.save(&log("s", ConversationRole::User, "2026-08-07", 300, None)).await.unwrap();

        let deleted = repo.delete_cascade("u1", &["q".to_string()]).await.unwrap();
        assert_eq!(deleted, 2);

        let remaining = repo.fetch_by_date("u1", "2026-08-07").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "s");

        assert!(repo.is_tombstoned("u1", "q").await.unwrap());
        assert!(repo.is_tombstoned("u1", "r").await.unwrap());
        assert!(!repo.is_tombstoned("u1", "s").await.unwrap());
    }

    #[tokio::test]
    async fn test_pending_diary_users_skips_ready_entries() {
        let (_dir, pool) = test_pool().await;
        let repo = SqliteConversationRepository::new(pool.clone());

        repo.save(&log("a", ConversationRole::User, "2026-08-07", 100, None)).await.unwrap();

        let pending = repo.pending_diary_users("2026-08-07").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].user_id, "u1");

        sqlx::query(
            "INSERT INTO diary_entries (id, user_id, date, content, status, created_at, updated_at)
             VALUES ('d1', 'u1', '2026-08-07', 'entry', 'ready', 0, 0)",
        )
        .execute(&pool.writer)
        .await
        .unwrap();

        assert!(repo.pending_diary_users("2026-08-07").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_catchup_window_only_regenerates_missing_date() {
        // Catch-up=2 checks D-1 and D; D-1 already has a ready diary, so
        // only D comes back as pending work.
        let (_dir, pool) = test_pool().await;
        let repo = SqliteConversationRepository::new(pool.clone());

        repo.save(&log("a", ConversationRole::User, "2026-08-06", 100, None)).await.unwrap();
        repo.save(&log("b", ConversationRole::User, "2026-08-07", 200, None)).await.unwrap();
        sqlx::query(
            "INSERT INTO diary_entries (id, user_id, date, content, status, created_at, updated_at)
             VALUES ('d1', 'u1', '2026-08-06', 'entry', 'ready', 0, 0)",
        )
        .execute(&pool.writer)
        .await
        .unwrap();

        assert!(repo.pending_diary_users("2026-08-06").await.unwrap().is_empty());
        let pending = repo.pending_diary_users("2026-08-07").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].user_id, "u1");
    }

    #[tokio::test]
    async fn test_error_status_diary_still_pending() {
        let (_dir, pool) = test_pool().await;
        let repo = SqliteConversationRepository::new(pool.clone());

        repo.save(&log("a", ConversationRole::User, "2026-08-07", 100, None)).await.unwrap();
        sqlx::query(
            "INSERT INTO diary_entries (id, user_id, date, content, status, created_at, updated_at)
             VALUES ('d1', 'u1', '2026-08-07', 'failed', 'error', 0, 0)",
        )
        .execute(&pool.writer)
        .await
        .unwrap();

        // An error row does not count as done; the catch-up pass retries it.
        assert_eq!(repo.pending_diary_users("2026-08-07").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_by_id() {
        let (_dir, pool) = test_pool().await;
        let repo = SqliteConversationRepository::new(pool);

        repo.save(&log("a", ConversationRole::User, "2026-08-07", 100, None)).await.unwrap();
        let loaded = repo.get("u1", "a").await.unwrap().unwrap();
        assert_eq!(loaded.content, "content of a");
        assert!(repo.get("u1", "missing").await.unwrap().is_none());
        assert!(repo.get("someone-else", "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_version_history() {
        let (_dir, pool) = test_pool().await;
        let repo = SqliteConversationRepository::new(pool);

        assert_eq!(repo.push_version("m1", "first", 10).await.unwrap(), 0);
        assert_eq!(repo.push_version("m1", "second", 20).await.unwrap(), 1);

        let versions = repo.list_versions("m1").await.unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].version_index, 0);
        assert_eq!(versions[1].content, "second");
    }

    #[tokio::test]
    async fn test_first_timestamp_and_last_date() {
        let (_dir, pool) = test_pool().await;
        let repo = SqliteConversationRepository::new(pool);

        repo.save(&log("a", ConversationRole::User, "2026-08-05", 100, None)).await.unwrap();
        repo.save(&log("b", ConversationRole::User, "2026-08-07", 300, None)).await.unwrap();

        assert_eq!(repo.first_timestamp("u1").await.unwrap(), Some(100));
        assert_eq!(
            repo.last_date_before("u1", "2026-08-07").await.unwrap().as_deref(),
            Some("2026-08-05")
        );
        assert!(repo.last_date_before("u1", "2026-08-05").await.unwrap().is_none());
    }
}
