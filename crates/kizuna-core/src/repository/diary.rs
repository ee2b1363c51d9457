//! DiaryRepository and ProfileRepository trait definitions.

use kizuna_types::conversation::{DiaryEntry, DiaryStatus, UserProfile};
use kizuna_types::error::RepositoryError;

/// Fields written when saving a diary entry.
#[derive(Debug, Clone)]
pub struct DiaryWrite {
    pub user_id: String,
    pub date: String,
    pub content: String,
    pub summary: Option<String>,
    pub mood: Option<String>,
    pub status: DiaryStatus,
}

/// Repository trait for generated diary entries.
pub trait DiaryRepository: Send + Sync {
    fn get(
        &self,
        user_id: &str,
        date: &str,
    ) -> impl std::future::Future<Output = Result<Option<DiaryEntry>, RepositoryError>> + Send;

    /// Upsert by `(user_id, date)`; a regenerated entry overwrites.
    fn save(
        &self,
        write: &DiaryWrite,
        now: i64,
    ) -> impl std::future::Future<Output = Result<DiaryEntry, RepositoryError>> + Send;

    /// Most recent entries, newest date first.
    fn list_recent(
        &self,
        user_id: &str,
        limit: i64,
    ) -> impl std::future::Future<Output = Result<Vec<DiaryEntry>, RepositoryError>> + Send;
}

/// Repository trait for long-term user profiles.
pub trait ProfileRepository: Send + Sync {
    fn get(
        &self,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<UserProfile>, RepositoryError>> + Send;

    fn save(
        &self,
        user_id: &str,
        content: &str,
        now: i64,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
