//! ProactiveRepository trait definition.

use kizuna_types::error::RepositoryError;
use kizuna_types::proactive::{ProactiveMessage, ProactiveUserState};

/// Repository trait for proactive messages and rate-limit counters.
pub trait ProactiveRepository: Send + Sync {
    fn get_state(
        &self,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<ProactiveUserState>, RepositoryError>> + Send;

    fn save_state(
        &self,
        state: &ProactiveUserState,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn save_message(
        &self,
        message: &ProactiveMessage,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Pending, unexpired messages for a user, oldest first.
    fn pending_messages(
        &self,
        user_id: &str,
        now: i64,
    ) -> impl std::future::Future<Output = Result<Vec<ProactiveMessage>, RepositoryError>> + Send;

    /// Mark the named messages delivered at `now`.
    fn mark_delivered(
        &self,
        ids: &[String],
        now: i64,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Flip every pending message past its `expires_at` to expired.
    /// Returns the number of rows changed.
    fn expire_stale(
        &self,
        now: i64,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}
