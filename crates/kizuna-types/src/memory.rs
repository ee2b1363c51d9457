//! Long-term memory records: diary highlight vectors and explicit facts.

use serde::{Deserialize, Serialize};

/// One stored diary highlight with its embedding metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryVectorEntry {
    pub id: String,
    pub user_id: String,
    pub date: String,
    /// Position of this highlight within its diary day (0-based).
    pub idx: i64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    pub importance: i64,
    pub timestamp: i64,
}

impl MemoryVectorEntry {
    /// Deterministic id so re-generated highlights overwrite old rows.
    pub fn highlight_id(user_id: &str, date: &str, idx: usize) -> String {
        format!("hl:{user_id}:{date}:{idx}")
    }
}

/// A semantic search hit over stored highlights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryHit {
    pub id: String,
    pub date: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    pub importance: i64,
    /// Cosine similarity in `[-1, 1]`, higher is closer.
    pub score: f32,
    pub timestamp: i64,
}

/// An explicit fact the companion chose to remember about a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactEntry {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highlight_id_is_deterministic() {
        assert_eq!(
            MemoryVectorEntry::highlight_id("u1", "2026-08-01", 3),
            "hl:u1:2026-08-01:3"
        );
    }
}
