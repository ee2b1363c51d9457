//! Background job drivers and their advisory lock.

pub mod clock;
pub mod diary;
pub mod lock;
pub mod proactive;

use kizuna_types::error::RepositoryError;
use kizuna_types::llm::ProviderError;

/// Errors inside background job bodies.
///
/// Schedulers never let these escape the process: they are logged at
/// per-user or per-job granularity and the loop continues.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("{0}")]
    Other(String),
}

/// Retry an async operation with linear backoff.
///
/// Used around diary generation where a transient provider failure should
/// not cost a whole day's entry. `retries` is the number of *re*tries
/// after the first attempt.
pub async fn with_retry<T, E, F, Fut>(retries: u32, base_delay: std::time::Duration, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(_) if attempt < retries => {
                attempt += 1;
                tokio::time::sleep(base_delay * attempt).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_with_retry_succeeds_after_failures() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, &str> = with_retry(2, Duration::from_millis(1), || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move { if n < 2 { Err("nope") } else { Ok(n) } }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_exhausts() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, &str> = with_retry(2, Duration::from_millis(1), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err("always") }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
