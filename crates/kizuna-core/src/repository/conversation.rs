//! ConversationRepository trait definition.

use kizuna_types::conversation::{ConversationLog, ConversationRole, MessageVersion};
use kizuna_types::error::RepositoryError;

/// A user eligible for a background job, with display metadata gathered
/// from their conversation logs.
#[derive(Debug, Clone)]
pub struct JobCandidate {
    pub user_id: String,
    pub user_name: Option<String>,
    pub time_zone: Option<String>,
}

/// Repository trait for conversation log persistence.
///
/// Logs are append-only except tombstone deletion; `delete_cascade`
/// removes the named logs plus every log whose `reply_to` points at them,
/// and records tombstones for all of it.
pub trait ConversationRepository: Send + Sync {
    /// Upsert one log record (client-supplied ids make retries idempotent).
    fn save(
        &self,
        log: &ConversationLog,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Fetch one log by id.
    fn get(
        &self,
        user_id: &str,
        log_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<ConversationLog>, RepositoryError>> + Send;

    /// All logs for one user on one calendar date, oldest first.
    fn fetch_by_date(
        &self,
        user_id: &str,
        date: &str,
    ) -> impl std::future::Future<Output = Result<Vec<ConversationLog>, RepositoryError>> + Send;

    /// Logs after a timestamp, optionally filtered by role, oldest first.
    fn fetch_after(
        &self,
        user_id: &str,
        after: i64,
        limit: i64,
        roles: Option<&[ConversationRole]>,
    ) -> impl std::future::Future<Output = Result<Vec<ConversationLog>, RepositoryError>> + Send;

    /// The stored calendar date of one log, if it exists.
    fn log_date(
        &self,
        user_id: &str,
        log_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<String>, RepositoryError>> + Send;

    /// Most recent conversation date strictly before `before_date`.
    fn last_date_before(
        &self,
        user_id: &str,
        before_date: &str,
    ) -> impl std::future::Future<Output = Result<Option<String>, RepositoryError>> + Send;

    /// Timestamp of the very first log for this user.
    fn first_timestamp(
        &self,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<i64>, RepositoryError>> + Send;

    /// Users who have logs on `date` but no `ready` diary entry for it.
    fn pending_diary_users(
        &self,
        date: &str,
    ) -> impl std::future::Future<Output = Result<Vec<JobCandidate>, RepositoryError>> + Send;

    /// Users with any log newer than `since`, capped at `limit`.
    fn active_users_since(
        &self,
        since: i64,
        limit: i64,
    ) -> impl std::future::Future<Output = Result<Vec<JobCandidate>, RepositoryError>> + Send;

    /// Tombstone and delete the named logs and their dependent replies.
    /// Returns the number of rows deleted.
    fn delete_cascade(
        &self,
        user_id: &str,
        ids: &[String],
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Whether a log id was tombstoned.
    fn is_tombstoned(
        &self,
        user_id: &str,
        log_id: &str,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Record a prior content version of an edited log; returns the new
    /// version index.
    fn push_version(
        &self,
        log_id: &str,
        content: &str,
        now: i64,
    ) -> impl std::future::Future<Output = Result<i64, RepositoryError>> + Send;

    /// Edit history for one log, oldest version first.
    fn list_versions(
        &self,
        log_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<MessageVersion>, RepositoryError>> + Send;
}
