//! Proactive cron driver.
//!
//! Fires on local-day-aligned interval boundaries, takes the
//! `proactive_cron` advisory lock, and runs one evaluation pass over the
//! candidate users. All per-user gating lives in the proactive service;
//! this driver only owns timing and mutual exclusion.

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use kizuna_types::settings::ProactiveSettings;

use crate::timefmt::parse_zone;

use super::JobError;
use super::clock::next_interval_delay;
use super::lock::{AdvisoryLock, run_exclusive};

/// Lock name shared by every process running this job class.
pub const PROACTIVE_LOCK: &str = "proactive_cron";

/// The work body the driver schedules: one candidate pass.
pub trait ProactiveJob: Send + Sync {
    fn run_pass(&self) -> impl std::future::Future<Output = Result<(), JobError>> + Send;
}

/// Periodic driver for the proactive job class.
pub struct ProactiveCron<L, J>
where
    L: AdvisoryLock,
    J: ProactiveJob,
{
    lock: L,
    job: J,
    settings: ProactiveSettings,
}

impl<L, J> ProactiveCron<L, J>
where
    L: AdvisoryLock,
    J: ProactiveJob,
{
    pub fn new(lock: L, job: J, settings: ProactiveSettings) -> Self {
        Self { lock, job, settings }
    }

    /// Drive the cron until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        if !self.settings.enabled {
            warn!("proactive scheduler disabled");
            return;
        }
        let zone = parse_zone(Some(&self.settings.time_zone));

        loop {
            let delay = next_interval_delay(
                Utc::now().timestamp_millis(),
                self.settings.interval_minutes,
                zone,
            );
            info!(
                in_seconds = delay.as_secs(),
                interval_minutes = self.settings.interval_minutes,
                "proactive cron scheduled"
            );

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            self.run_once().await;
        }
        info!("proactive cron stopped");
    }

    /// One scheduled firing. Never propagates errors.
    pub async fn run_once(&self) {
        let started = std::time::Instant::now();

        let outcome = run_exclusive(&self.lock, PROACTIVE_LOCK, || async {
            if let Err(err) = self.job.run_pass().await {
                error!(error = %err, "proactive pass failed");
            }
        })
        .await;

        match outcome {
            Ok(Some(())) => info!(
                duration_ms = started.elapsed().as_millis() as u64,
                "proactive cron run finished"
            ),
            Ok(None) => {}
            Err(err) => error!(error = %err, "proactive cron lock error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use kizuna_types::error::RepositoryError;

    struct CountingJob {
        runs: AtomicUsize,
    }

    impl ProactiveJob for CountingJob {
        async fn run_pass(&self) -> Result<(), JobError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct OnceLock {
        taken: AtomicBool,
    }

    impl AdvisoryLock for OnceLock {
        async fn try_acquire(&self, _job: &str) -> Result<bool, RepositoryError> {
            Ok(!self.taken.swap(true, Ordering::SeqCst))
        }
        async fn release(&self, _job: &str) -> Result<(), RepositoryError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_second_concurrent_run_is_skipped() {
        // The lock admits exactly one holder and is never released
        // (simulating a concurrently running process): the second run
        // performs no side effects.
        let cron = ProactiveCron::new(
            OnceLock {
                taken: AtomicBool::new(false),
            },
            CountingJob {
                runs: AtomicUsize::new(0),
            },
            ProactiveSettings {
                enabled: true,
                ..Default::default()
            },
        );

        cron.run_once().await;
        cron.run_once().await;
        assert_eq!(cron.job.runs.load(Ordering::SeqCst), 1);
    }
}
