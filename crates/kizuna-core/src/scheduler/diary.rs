//! Diary cron driver.
//!
//! Fires at a configured local wall-clock time, takes the `diary_cron`
//! advisory lock, and reprocesses the catch-up window of recent calendar
//! dates so missed days (downtime, failed generations) are retried.

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use kizuna_types::settings::DiarySettings;

use crate::timefmt::{local_date, parse_zone};

use super::JobError;
use super::clock::{catchup_dates, next_daily_delay, parse_hh_mm};
use super::lock::{AdvisoryLock, run_exclusive};

/// Lock name shared by every process running this job class.
pub const DIARY_LOCK: &str = "diary_cron";

/// The work body the driver schedules: one date pass.
pub trait DiaryJob: Send + Sync {
    fn run_for_date(
        &self,
        date: &str,
    ) -> impl std::future::Future<Output = Result<(), JobError>> + Send;
}

/// Periodic driver for the diary job class.
pub struct DiaryCron<L, J>
where
    L: AdvisoryLock,
    J: DiaryJob,
{
    lock: L,
    job: J,
    settings: DiarySettings,
}

impl<L, J> DiaryCron<L, J>
where
    L: AdvisoryLock,
    J: DiaryJob,
{
    pub fn new(lock: L, job: J, settings: DiarySettings) -> Self {
        Self { lock, job, settings }
    }

    /// Drive the cron until cancelled. Compute delay to the next local
    /// target time, sleep, run, reschedule -- never a fixed interval.
    pub async fn run(self, cancel: CancellationToken) {
        if !self.settings.enabled {
            warn!("diary scheduler disabled");
            return;
        }
        let zone = parse_zone(Some(&self.settings.time_zone));
        let (hour, minute) = parse_hh_mm(&self.settings.time).unwrap_or((23, 59));

        loop {
            let delay = next_daily_delay(Utc::now().timestamp_millis(), hour, minute, zone);
            info!(
                in_seconds = delay.as_secs(),
                time = %format!("{hour:02}:{minute:02}"),
                time_zone = %self.settings.time_zone,
                "diary cron scheduled"
            );

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            self.run_once(Utc::now().timestamp_millis()).await;
        }
        info!("diary cron stopped");
    }

    /// One scheduled firing: lock, then process the catch-up window.
    /// Never propagates errors -- a scheduler must not crash the process.
    pub async fn run_once(&self, now: i64) {
        let zone = parse_zone(Some(&self.settings.time_zone));
        let today = local_date(now, zone);
        let dates = catchup_dates(&today, self.settings.catchup_days);
        let started = std::time::Instant::now();
        info!(today = %today, ?dates, "diary cron run starting");

        let outcome = run_exclusive(&self.lock, DIARY_LOCK, || async {
            for date in &dates {
                if let Err(err) = self.job.run_for_date(date).await {
                    // Per-date isolation: one bad date must not starve the rest.
                    error!(date = %date, error = %err, "diary date pass failed");
                }
            }
        })
        .await;

        match outcome {
            Ok(Some(())) => info!(
                duration_ms = started.elapsed().as_millis() as u64,
                "diary cron run finished"
            ),
            Ok(None) => {}
            Err(err) => error!(error = %err, "diary cron lock error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use kizuna_types::error::RepositoryError;

    struct RecordingJob {
        dates: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    impl DiaryJob for RecordingJob {
        async fn run_for_date(&self, date: &str) -> Result<(), JobError> {
            self.dates.lock().unwrap().push(date.to_string());
            if self.fail_on.as_deref() == Some(date) {
                return Err(JobError::Other("boom".to_string()));
            }
            Ok(())
        }
    }

    struct FreeLock;

    impl AdvisoryLock for FreeLock {
        async fn try_acquire(&self, _job: &str) -> Result<bool, RepositoryError> {
            Ok(true)
        }
        async fn release(&self, _job: &str) -> Result<(), RepositoryError> {
            Ok(())
        }
    }

    struct BusyLock {
        asked: AtomicBool,
    }

    impl AdvisoryLock for BusyLock {
        async fn try_acquire(&self, _job: &str) -> Result<bool, RepositoryError> {
            self.asked.store(true, Ordering::SeqCst);
            Ok(false)
        }
        async fn release(&self, _job: &str) -> Result<(), RepositoryError> {
            Ok(())
        }
    }

    fn settings(catchup: u32) -> DiarySettings {
        DiarySettings {
            time_zone: "UTC".to_string(),
            catchup_days: catchup,
            ..Default::default()
        }
    }

    // 2026-08-07 12:00:00 UTC
    const NOW: i64 = 1_786_104_000_000;

    #[tokio::test]
    async fn test_run_once_processes_catchup_window_oldest_first() {
        let cron = DiaryCron::new(
            FreeLock,
            RecordingJob {
                dates: Mutex::new(Vec::new()),
                fail_on: None,
            },
            settings(2),
        );
        cron.run_once(NOW).await;
        let dates = cron.job.dates.lock().unwrap().clone();
        assert_eq!(dates, vec!["2026-08-06".to_string(), "2026-08-07".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_date_does_not_stop_later_dates() {
        let cron = DiaryCron::new(
            FreeLock,
            RecordingJob {
                dates: Mutex::new(Vec::new()),
                fail_on: Some("2026-08-06".to_string()),
            },
            settings(2),
        );
        cron.run_once(NOW).await;
        assert_eq!(cron.job.dates.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_busy_lock_skips_all_work() {
        let cron = DiaryCron::new(
            BusyLock {
                asked: AtomicBool::new(false),
            },
            RecordingJob {
                dates: Mutex::new(Vec::new()),
                fail_on: None,
            },
            settings(2),
        );
        cron.run_once(NOW).await;
        assert!(cron.lock.asked.load(Ordering::SeqCst));
        assert!(cron.job.dates.lock().unwrap().is_empty());
    }
}
