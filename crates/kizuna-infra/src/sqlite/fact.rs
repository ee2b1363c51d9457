//! SQLite fact repository implementation.

use sqlx::Row;
use uuid::Uuid;

use kizuna_core::repository::fact::FactRepository;
use kizuna_types::error::RepositoryError;
use kizuna_types::memory::FactEntry;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `FactRepository`.
pub struct SqliteFactRepository {
    pool: DatabasePool,
}

impl SqliteFactRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn row_to_fact(row: &sqlx::sqlite::SqliteRow) -> Result<FactEntry, RepositoryError> {
    Ok(FactEntry {
        id: row.try_get("id").map_err(|e| RepositoryError::Query(e.to_string()))?,
        user_id: row.try_get("user_id").map_err(|e| RepositoryError::Query(e.to_string()))?,
        content: row.try_get("content").map_err(|e| RepositoryError::Query(e.to_string()))?,
        active: row
            .try_get::<i64, _>("active")
            .map_err(|e| RepositoryError::Query(e.to_string()))?
            != 0,
        created_at: row.try_get("created_at").map_err(|e| RepositoryError::Query(e.to_string()))?,
        updated_at: row.try_get("updated_at").map_err(|e| RepositoryError::Query(e.to_string()))?,
    })
}

impl FactRepository for SqliteFactRepository {
    async fn active_facts(&self, user_id: &str, limit: i64) -> Result<Vec<FactEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, user_id, content, active, created_at, updated_at
               FROM fact_memories
              WHERE user_id = ? AND active = 1
              ORDER BY updated_at DESC
              LIMIT ?",
        )
        .bind(user_id)
        .bind(limit.clamp(1, 100))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter().map(row_to_fact).collect()
    }

    async fn upsert(&self, user_id: &str, content: &str, now: i64) -> Result<(FactEntry, bool), RepositoryError> {
        let content = content.trim();

        // Identical content reactivates the existing note instead of
        // growing a duplicate.
        let existing = sqlx::query(
            "SELECT id, user_id, content, active, created_at, updated_at
               FROM fact_memories
              WHERE user_id = ? AND content = ?
              LIMIT 1",
        )
        .bind(user_id)
        .bind(content)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if let Some(row) = existing {
            let fact = row_to_fact(&row)?;
            sqlx::query("UPDATE fact_memories SET active = 1, updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(&fact.id)
                .execute(&self.pool.writer)
                .await
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            return Ok((
                FactEntry {
                    active: true,
                    updated_at: now,
                    ..fact
                },
                false,
            ));
        }

        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO fact_memories (id, user_id, content, active, created_at, updated_at)
             VALUES (?, ?, ?, 1, ?, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(content)
        .bind(now)
        .bind(now)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok((
            FactEntry {
                id,
                user_id: user_id.to_string(),
                content: content.to_string(),
                active: true,
                created_at: now,
                updated_at: now,
            },
            true,
        ))
    }

    async fn forget(&self, user_id: &str, fact_id: &str, now: i64) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE fact_memories SET active = 0, updated_at = ?
              WHERE user_id = ? AND id = ? AND active = 1",
        )
        .bind(now)
        .bind(user_id)
        .bind(fact_id)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }
}
