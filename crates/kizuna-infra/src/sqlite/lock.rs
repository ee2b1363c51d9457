//! Lease-based advisory lock over a SQLite table.
//!
//! The lock row is keyed by a SHA-256-derived hash of the job name.
//! Acquisition is a single conditional upsert: it wins when the row is
//! absent or its lease has expired, so a crashed holder cannot wedge the
//! job class past the lease window. Non-blocking by construction -- a
//! losing caller just skips its run.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use kizuna_core::scheduler::lock::AdvisoryLock;
use kizuna_types::error::RepositoryError;

use super::pool::DatabasePool;

/// How long one lease lasts. Generous enough for a full diary catch-up
/// pass; a run outlasting it risks a second process joining in.
const DEFAULT_LEASE_MS: i64 = 30 * 60 * 1000;

/// SQLite-backed implementation of `AdvisoryLock`.
///
/// Each instance carries a unique holder id so release only ever deletes
/// the caller's own lease.
pub struct SqliteAdvisoryLock {
    pool: DatabasePool,
    holder: String,
    lease_ms: i64,
}

impl SqliteAdvisoryLock {
    pub fn new(pool: DatabasePool) -> Self {
        Self {
            pool,
            holder: Uuid::new_v4().to_string(),
            lease_ms: DEFAULT_LEASE_MS,
        }
    }

    #[cfg(test)]
    fn with_lease_ms(mut self, lease_ms: i64) -> Self {
        self.lease_ms = lease_ms;
        self
    }

    fn lock_key(job: &str) -> String {
        let digest = Sha256::digest(job.as_bytes());
        // 64 bits of the digest is plenty for a handful of job classes.
        digest[..8].iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl AdvisoryLock for SqliteAdvisoryLock {
    async fn try_acquire(&self, job: &str) -> Result<bool, RepositoryError> {
        let key = Self::lock_key(job);
        let now = chrono::Utc::now().timestamp_millis();

        let result = sqlx::query(
            "INSERT INTO scheduler_locks (name, job, holder, acquired_at, expires_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (name) DO UPDATE SET
                holder = excluded.holder,
                acquired_at = excluded.acquired_at,
                expires_at = excluded.expires_at
             WHERE scheduler_locks.expires_at <= excluded.acquired_at",
        )
        .bind(&key)
        .bind(job)
        .bind(&self.holder)
        .bind(now)
        .bind(now + self.lease_ms)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn release(&self, job: &str) -> Result<(), RepositoryError> {
        let key = Self::lock_key(job);
        sqlx::query("DELETE FROM scheduler_locks WHERE name = ? AND holder = ?")
            .bind(&key)
            .bind(&self.holder)
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::pool::test_pool;

    #[tokio::test]
    async fn test_exactly_one_of_two_holders_wins() {
        let (_dir, pool) = test_pool().await;
        let first = SqliteAdvisoryLock::new(pool.clone());
        let second = SqliteAdvisoryLock::new(pool);

        let a = first.try_acquire("diary_cron").await.unwrap();
        let b = second.try_acquire("diary_cron").await.unwrap();
        assert!(a);
        assert!(!b, "second caller must not acquire a held lock");

        first.release("diary_cron").await.unwrap();
        assert!(second.try_acquire("diary_cron").await.unwrap());
    }

    #[tokio::test]
    async fn test_different_job_classes_do_not_contend() {
        let (_dir, pool) = test_pool().await;
        let lock = SqliteAdvisoryLock::new(pool.clone());
        let other = SqliteAdvisoryLock::new(pool);

        assert!(lock.try_acquire("diary_cron").await.unwrap());
        assert!(other.try_acquire("proactive_cron").await.unwrap());
    }

    #[tokio::test]
    async fn test_release_only_affects_own_lease() {
        let (_dir, pool) = test_pool().await;
        let holder = SqliteAdvisoryLock::new(pool.clone());
        let stranger = SqliteAdvisoryLock::new(pool);

        assert!(holder.try_acquire("diary_cron").await.unwrap());
        // A non-holder releasing is a no-op.
        stranger.release("diary_cron").await.unwrap();
        assert!(!stranger.try_acquire("diary_cron").await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_lease_can_be_taken_over() {
        let (_dir, pool) = test_pool().await;
        let crashed = SqliteAdvisoryLock::new(pool.clone()).with_lease_ms(-1);
        let successor = SqliteAdvisoryLock::new(pool);

        assert!(crashed.try_acquire("diary_cron").await.unwrap());
        // The crashed holder never releases, but its lease is already
        // expired, so a new process takes over.
        assert!(successor.try_acquire("diary_cron").await.unwrap());
    }

    #[tokio::test]
    async fn test_reacquire_by_same_holder_while_held() {
        let (_dir, pool) = test_pool().await;
        let lock = SqliteAdvisoryLock::new(pool);

        assert!(lock.try_acquire("diary_cron").await.unwrap());
        // Even the same holder cannot double-acquire an unexpired lease.
        assert!(!lock.try_acquire("diary_cron").await.unwrap());
    }
}
