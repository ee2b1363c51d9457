//! SQLite highlight vector store implementation.
//!
//! Embeddings are stored as little-endian f32 BLOBs and ranked by cosine
//! similarity in process. The per-user row count is bounded (at most ten
//! highlights per diary day), so a linear scan stays cheap without a
//! dedicated vector index.

use sqlx::Row;

use kizuna_core::memory::store::{HighlightItem, HighlightStore};
use kizuna_types::error::RepositoryError;
use kizuna_types::memory::{MemoryHit, MemoryVectorEntry};

use super::pool::DatabasePool;

/// Default importance recorded for diary highlights.
const HIGHLIGHT_IMPORTANCE: i64 = 6;

/// SQLite-backed implementation of `HighlightStore`.
pub struct SqliteHighlightStore {
    pool: DatabasePool,
}

impl SqliteHighlightStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

impl HighlightStore for SqliteHighlightStore {
    async fn search(
        &self,
        user_id: &str,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<MemoryHit>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, date, text, mood, importance, timestamp, embedding
               FROM memory_vectors WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut hits: Vec<MemoryHit> = rows
            .iter()
            .map(|row| -> Result<MemoryHit, RepositoryError> {
                let blob: Vec<u8> = row
                    .try_get("embedding")
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                let embedding = blob_to_embedding(&blob);
                Ok(MemoryHit {
                    id: row.try_get("id").map_err(|e| RepositoryError::Query(e.to_string()))?,
                    date: row.try_get("date").map_err(|e| RepositoryError::Query(e.to_string()))?,
                    text: row.try_get("text").map_err(|e| RepositoryError::Query(e.to_string()))?,
                    mood: row.try_get("mood").map_err(|e| RepositoryError::Query(e.to_string()))?,
                    importance: row
                        .try_get("importance")
                        .map_err(|e| RepositoryError::Query(e.to_string()))?,
                    score: cosine_similarity(query_embedding, &embedding),
                    timestamp: row
                        .try_get("timestamp")
                        .map_err(|e| RepositoryError::Query(e.to_string()))?,
                })
            })
            .collect::<Result<_, _>>()?;

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit.clamp(1, 50));
        Ok(hits)
    }

    async fn upsert_day(
        &self,
        user_id: &str,
        date: &str,
        items: &[HighlightItem],
        mood: Option<&str>,
        timestamp: i64,
    ) -> Result<usize, RepositoryError> {
        for (idx, item) in items.iter().enumerate() {
            let id = MemoryVectorEntry::highlight_id(user_id, date, idx);
            sqlx::query(
                "INSERT INTO memory_vectors
                    (id, user_id, date, idx, text, mood, importance, timestamp, embedding)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (id) DO UPDATE SET
                    text = excluded.text,
                    mood = excluded.mood,
                    importance = excluded.importance,
                    timestamp = excluded.timestamp,
                    embedding = excluded.embedding",
            )
            .bind(&id)
            .bind(user_id)
            .bind(date)
            .bind(idx as i64)
            .bind(&item.text)
            .bind(mood)
            .bind(HIGHLIGHT_IMPORTANCE)
            .bind(timestamp)
            .bind(embedding_to_blob(&item.embedding))
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        }

        // Prune rows past the new set so a shorter regeneration doesn't
        // leave stale highlights behind.
        sqlx::query("DELETE FROM memory_vectors WHERE user_id = ? AND date = ? AND idx >= ?")
            .bind(user_id)
            .bind(date)
            .bind(items.len() as i64)
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(items.len())
    }
}
