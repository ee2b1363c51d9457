//! UserStateRepository trait definition.

use kizuna_types::error::RepositoryError;
use kizuna_types::state::UserState;

/// Repository trait for persisted relationship state.
///
/// `get` returns the raw stored row -- decay is applied by the
/// [`RelationshipEngine`](crate::relationship::RelationshipEngine), never
/// by the repository. Implementations live in kizuna-infra.
pub trait UserStateRepository: Send + Sync {
    /// Fetch the raw stored state for a user, if any.
    fn get(
        &self,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<UserState>, RepositoryError>> + Send;

    /// Upsert the state row. Last write wins; there is no row locking --
    /// per-user concurrency is low enough that races are acceptable.
    fn save(
        &self,
        state: &UserState,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
