//! Advisory lock port.
//!
//! A named, non-blocking, process-external mutex serializing one job
//! class across concurrently running processes. Failing to acquire is a
//! no-op signal -- the run is skipped entirely, never queued.

use kizuna_types::error::RepositoryError;

/// Trait for the distributed try-lock primitive.
///
/// Implementations key the lock row by a hash of the job name and hold a
/// lease so a crashed holder cannot wedge the job class forever.
pub trait AdvisoryLock: Send + Sync {
    /// Try to take the lock. `false` means another process holds it.
    fn try_acquire(
        &self,
        job: &str,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Release the lock if this process still holds it.
    fn release(
        &self,
        job: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}

/// Run `body` under the named lock, or skip it entirely.
///
/// Returns `None` when the lock was busy. The lock is released even when
/// the body errors; release failures are logged and swallowed (the lease
/// expiry covers them).
pub async fn run_exclusive<L, F, Fut, T>(
    lock: &L,
    job: &str,
    body: F,
) -> Result<Option<T>, RepositoryError>
where
    L: AdvisoryLock,
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = T>,
{
    if !lock.try_acquire(job).await? {
        tracing::warn!(job, "lock busy, skipping run");
        return Ok(None);
    }

    let result = body().await;

    if let Err(err) = lock.release(job).await {
        tracing::warn!(job, error = %err, "lock release failed, lease will expire");
    }
    Ok(Some(result))
}
