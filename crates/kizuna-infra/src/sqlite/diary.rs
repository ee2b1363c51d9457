//! SQLite diary and profile repository implementations.

use sqlx::Row;

use kizuna_core::repository::diary::{DiaryRepository, DiaryWrite, ProfileRepository};
use kizuna_types::conversation::{DiaryEntry, DiaryStatus, UserProfile};
use kizuna_types::error::RepositoryError;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `DiaryRepository`.
pub struct SqliteDiaryRepository {
    pool: DatabasePool,
}

impl SqliteDiaryRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct DiaryEntryRow {
    id: String,
    user_id: String,
    date: String,
    summary: Option<String>,
    content: Option<String>,
    mood: Option<String>,
    status: String,
    created_at: i64,
    updated_at: i64,
}

impl DiaryEntryRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            date: row.try_get("date")?,
            summary: row.try_get("summary")?,
            content: row.try_get("content")?,
            mood: row.try_get("mood")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_entry(self) -> Result<DiaryEntry, RepositoryError> {
        let status: DiaryStatus = self
            .status
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        Ok(DiaryEntry {
            id: self.id,
            user_id: self.user_id,
            date: self.date,
            summary: self.summary,
            content: self.content,
            mood: self.mood,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const DIARY_COLUMNS: &str = "id, user_id, date, summary, content, mood, status, created_at, updated_at";

impl DiaryRepository for SqliteDiaryRepository {
    async fn get(&self, user_id: &str, date: &str) -> Result<Option<DiaryEntry>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {DIARY_COLUMNS} FROM diary_entries
              WHERE user_id = ? AND date = ? LIMIT 1"
        ))
        .bind(user_id)
        .bind(date)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.map(|r| {
            DiaryEntryRow::from_row(&r)
                .map_err(|e| RepositoryError::Query(e.to_string()))?
                .into_entry()
        })
        .transpose()
    }

    async fn save(&self, write: &DiaryWrite, now: i64) -> Result<DiaryEntry, RepositoryError> {
        let id = DiaryEntry::entry_id(&write.user_id, &write.date);
        let summary = write.summary.clone().unwrap_or_else(|| write.content.clone());

        sqlx::query(
            "INSERT INTO diary_entries (id, user_id, date, summary, content, mood, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (user_id, date) DO UPDATE SET
                summary = excluded.summary,
                content = excluded.content,
                mood = excluded.mood,
                status = excluded.status,
                updated_at = excluded.updated_at",
        )
        .bind(&id)
        .bind(&write.user_id)
        .bind(&write.date)
        .bind(&summary)
        .bind(&write.content)
        .bind(&write.mood)
        .bind(write.status.to_string())
        .bind(now)
        .bind(now)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        self.get(&write.user_id, &write.date)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    async fn list_recent(&self, user_id: &str, limit: i64) -> Result<Vec<DiaryEntry>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {DIARY_COLUMNS} FROM diary_entries
              WHERE user_id = ?
              ORDER BY date DESC LIMIT ?"
        ))
        .bind(user_id)
        .bind(limit.clamp(1, 100))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter()
            .map(|row| {
                DiaryEntryRow::from_row(row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?
                    .into_entry()
            })
            .collect()
    }
}

/// SQLite-backed implementation of `ProfileRepository`.
pub struct SqliteProfileRepository {
    pool: DatabasePool,
}

impl SqliteProfileRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

impl ProfileRepository for SqliteProfileRepository {
    async fn get(&self, user_id: &str) -> Result<Option<UserProfile>, RepositoryError> {
        let row = sqlx::query(
            "SELECT user_id, content, created_at, updated_at
               FROM user_profiles WHERE user_id = ? LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.map(|r| {
            Ok(UserProfile {
                user_id: r.try_get("user_id").map_err(|e| RepositoryError::Query(e.to_string()))?,
                content: r.try_get("content").map_err(|e| RepositoryError::Query(e.to_string()))?,
                created_at: r.try_get("created_at").map_err(|e| RepositoryError::Query(e.to_string()))?,
                updated_at: r.try_get("updated_at").map_err(|e| RepositoryError::Query(e.to_string()))?,
            })
        })
        .transpose()
    }

    async fn save(&self, user_id: &str, content: &str, now: i64) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO user_profiles (user_id, content, created_at, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (user_id) DO UPDATE SET
                content = excluded.content,
                updated_at = excluded.updated_at",
        )
        .bind(user_id)
        .bind(content.trim())
        .bind(now)
        .bind(now)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::pool::test_pool;

    fn write(status: DiaryStatus) -> DiaryWrite {
        DiaryWrite {
            user_id: "u1".to_string(),
            date: "2026-08-07".to_string(),
            content: "a quiet day".to_string(),
            summary: Some("quiet".to_string()),
            mood: Some("calm".to_string()),
            status,
        }
    }

    #[tokio::test]
    async fn test_save_and_get_diary() {
        let (_dir, pool) = test_pool().await;
        let repo = SqliteDiaryRepository::new(pool);

        let entry = repo.save(&write(DiaryStatus::Ready), 1_000).await.unwrap();
        assert_eq!(entry.id, "diary:u1:2026-08-07");
        assert_eq!(entry.status, DiaryStatus::Ready);

        let loaded = repo.get("u1", "2026-08-07").await.unwrap().unwrap();
        assert_eq!(loaded.content.as_deref(), Some("a quiet day"));
    }

    #[tokio::test]
    async fn test_regeneration_overwrites_error_row() {
        let (_dir, pool) = test_pool().await;
        let repo = SqliteDiaryRepository::new(pool);

        repo.save(&write(DiaryStatus::Error), 1_000).await.unwrap();
        let entry = repo.save(&write(DiaryStatus::Ready), 2_000).await.unwrap();
        assert_eq!(entry.status, DiaryStatus::Ready);
        assert_eq!(entry.updated_at, 2_000);

        let all = repo.list_recent("u1", 10).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_profile_roundtrip() {
        let (_dir, pool) = test_pool().await;
        let repo = SqliteProfileRepository::new(pool);

        assert!(repo.get("u1").await.unwrap().is_none());
        repo.save("u1", r#"{"facts":["works nights"]}"#, 1_000).await.unwrap();
        repo.save("u1", r#"{"facts":["sleeps late"]}"#, 2_000).await.unwrap();

        let profile = repo.get("u1").await.unwrap().unwrap();
        assert!(profile.content.unwrap().contains("sleeps late"));
        assert_eq!(profile.updated_at, 2_000);
    }
}
