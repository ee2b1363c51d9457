//! Scheduler job adapters.
//!
//! The core cron drivers only know the `DiaryJob` / `ProactiveJob`
//! traits; these adapters close over the app state, resolve the current
//! settings snapshot, build the configured provider, and invoke the
//! services.

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use kizuna_core::scheduler::JobError;
use kizuna_core::scheduler::diary::{DiaryCron, DiaryJob};
use kizuna_core::scheduler::proactive::{ProactiveCron, ProactiveJob};
use kizuna_infra::llm::build_provider;
use kizuna_infra::sqlite::SqliteAdvisoryLock;

use crate::state::AppState;

pub struct DiaryJobRunner {
    pub state: AppState,
}

impl DiaryJob for DiaryJobRunner {
    async fn run_for_date(&self, date: &str) -> Result<(), JobError> {
        let settings = self.state.settings_snapshot().await;
        // The diary endpoint falls back to the chat provider when its own
        // endpoint is blank.
        let mut provider_settings = settings.provider.clone();
        if let Some(format) = settings.diary.api_format {
            provider_settings.api_format = format;
        }
        if !settings.diary.api_url.trim().is_empty() {
            provider_settings.api_url = settings.diary.api_url.clone();
        }
        if !settings.diary.api_key.trim().is_empty() {
            provider_settings.api_key = settings.diary.api_key.clone();
        }
        let provider = build_provider(&provider_settings)?;

        let now = Utc::now().timestamp_millis();
        self.state
            .diary
            .run_for_date(&provider, &settings, date, now)
            .await?;
        Ok(())
    }
}

pub struct ProactiveJobRunner {
    pub state: AppState,
}

impl ProactiveJob for ProactiveJobRunner {
    async fn run_pass(&self) -> Result<(), JobError> {
        let settings = self.state.settings_snapshot().await;
        let provider = build_provider(&settings.provider)?;
        let now = Utc::now().timestamp_millis();
        self.state
            .proactive
            .run_pass(&provider, &settings, now)
            .await?;
        Ok(())
    }
}

/// Spawn both cron drivers; they stop when `cancel` fires.
pub async fn spawn_schedulers(state: &AppState, cancel: CancellationToken) {
    let settings = state.settings_snapshot().await;

    let diary_cron = DiaryCron::new(
        SqliteAdvisoryLock::new(state.pool.clone()),
        DiaryJobRunner { state: state.clone() },
        settings.diary.clone(),
    );
    tokio::spawn(diary_cron.run(cancel.clone()));

    let proactive_cron = ProactiveCron::new(
        SqliteAdvisoryLock::new(state.pool.clone()),
        ProactiveJobRunner { state: state.clone() },
        settings.proactive.clone(),
    );
    tokio::spawn(proactive_cron.run(cancel));
}
