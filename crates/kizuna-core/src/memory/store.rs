//! Highlight vector store trait.
//!
//! Diary highlights are the unit of long-term memory: each day's diary
//! yields up to ten short highlight sentences, embedded and stored for
//! semantic recall by the `search_memory` tool.

use kizuna_types::error::RepositoryError;
use kizuna_types::memory::MemoryHit;

/// One highlight ready to store: text plus its embedding.
#[derive(Debug, Clone)]
pub struct HighlightItem {
    pub text: String,
    pub embedding: Vec<f32>,
}

/// Trait for vector-indexed diary highlight storage.
pub trait HighlightStore: Send + Sync {
    /// Rank the user's stored highlights against a query embedding,
    /// highest cosine similarity first.
    fn search(
        &self,
        user_id: &str,
        query_embedding: &[f32],
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<MemoryHit>, RepositoryError>> + Send;

    /// Replace the highlight set for one diary day. Rows beyond the new
    /// set's length are pruned so a regenerated shorter diary does not
    /// leave stale highlights behind.
    fn upsert_day(
        &self,
        user_id: &str,
        date: &str,
        items: &[HighlightItem],
        mood: Option<&str>,
        timestamp: i64,
    ) -> impl std::future::Future<Output = Result<usize, RepositoryError>> + Send;
}
