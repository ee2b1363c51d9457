//! FactRepository trait definition.

use kizuna_types::error::RepositoryError;
use kizuna_types::memory::FactEntry;

/// Repository trait for explicit remembered facts.
///
/// Facts are soft-deleted: `forget` flips `active` off so the companion
/// stops seeing the fact without destroying the audit trail.
pub trait FactRepository: Send + Sync {
    /// Active facts for a user, newest first.
    fn active_facts(
        &self,
        user_id: &str,
        limit: i64,
    ) -> impl std::future::Future<Output = Result<Vec<FactEntry>, RepositoryError>> + Send;

    /// Insert a fact, or reactivate/update an existing one with identical
    /// content. Returns the entry and whether it was newly created.
    fn upsert(
        &self,
        user_id: &str,
        content: &str,
        now: i64,
    ) -> impl std::future::Future<Output = Result<(FactEntry, bool), RepositoryError>> + Send;

    /// Deactivate a fact by id. Returns false when no such active fact.
    fn forget(
        &self,
        user_id: &str,
        fact_id: &str,
        now: i64,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;
}
