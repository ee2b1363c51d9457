//! The per-date diary pass.
//!
//! For every user who talked on the target date but has no `ready` diary
//! for it: build the transcript, generate the entry, store it, index its
//! highlights, and refresh the long-term profile. A failed user gets an
//! explicit error-status row instead of inconsistent state, and the loop
//! continues.

use std::time::Duration;

use tracing::{info, warn};

use kizuna_types::conversation::DiaryStatus;
use kizuna_types::settings::RuntimeSettings;

use crate::agent::history::build_transcript;
use crate::diary::generator::{DiaryParams, generate_diary};
use crate::diary::profile::{ProfileParams, generate_user_profile};
use crate::llm::box_provider::BoxChatProvider;
use crate::memory::{Embedder, HighlightItem, HighlightStore};
use crate::repository::conversation::ConversationRepository;
use crate::repository::diary::{DiaryRepository, DiaryWrite, ProfileRepository};
use crate::scheduler::{JobError, with_retry};
use crate::timefmt::days_between;

/// Highlights kept per diary day.
pub const MAX_HIGHLIGHTS_PER_DAY: usize = 10;

/// Outcome counters for one date pass.
#[derive(Debug, Clone, Default)]
pub struct DiaryRunSummary {
    pub candidates: usize,
    pub generated: usize,
    pub failed: usize,
    pub skipped_empty: usize,
}

/// Generates diaries, highlight vectors, and profiles for one date.
pub struct DiaryService<C, D, Pr, E, H>
where
    C: ConversationRepository,
    D: DiaryRepository,
    Pr: ProfileRepository,
    E: Embedder,
    H: HighlightStore,
{
    conversations: C,
    diaries: D,
    profiles: Pr,
    embedder: E,
    highlights: H,
}

impl<C, D, Pr, E, H> DiaryService<C, D, Pr, E, H>
where
    C: ConversationRepository,
    D: DiaryRepository,
    Pr: ProfileRepository,
    E: Embedder,
    H: HighlightStore,
{
    pub fn new(conversations: C, diaries: D, profiles: Pr, embedder: E, highlights: H) -> Self {
        Self {
            conversations,
            diaries,
            profiles,
            embedder,
            highlights,
        }
    }

    /// Process every pending user for `date`. Per-user failures are
    /// isolated; only a candidate-listing failure aborts the pass.
    pub async fn run_for_date(
        &self,
        provider: &BoxChatProvider,
        settings: &RuntimeSettings,
        date: &str,
        now: i64,
    ) -> Result<DiaryRunSummary, JobError> {
        let candidates = self.conversations.pending_diary_users(date).await?;
        let mut summary = DiaryRunSummary {
            candidates: candidates.len(),
            ..Default::default()
        };
        if candidates.is_empty() {
            info!(date, "no diary work");
            return Ok(summary);
        }

        for candidate in &candidates {
            match self
                .generate_for_user(provider, settings, &candidate.user_id, candidate.user_name.as_deref(), date, now)
                .await
            {
                Ok(true) => summary.generated += 1,
                Ok(false) => summary.skipped_empty += 1,
                Err(err) => {
                    summary.failed += 1;
                    warn!(user_id = %candidate.user_id, date, error = %err, "diary generation failed");
                    // Explicit error row rather than silent inconsistency;
                    // the next catch-up run retries (status != ready).
                    let write = DiaryWrite {
                        user_id: candidate.user_id.clone(),
                        date: date.to_string(),
                        content: "Automatic diary generation failed; it will be retried later.".to_string(),
                        summary: Some("generation failed".to_string()),
                        mood: None,
                        status: DiaryStatus::Error,
                    };
                    if let Err(save_err) = self.diaries.save(&write, now).await {
                        warn!(user_id = %candidate.user_id, date, error = %save_err, "error-row save failed");
                    }
                }
            }
        }

        info!(
            date,
            candidates = summary.candidates,
            generated = summary.generated,
            failed = summary.failed,
            "diary pass finished"
        );
        Ok(summary)
    }

    /// Returns `Ok(false)` when the user had no usable transcript.
    async fn generate_for_user(
        &self,
        provider: &BoxChatProvider,
        settings: &RuntimeSettings,
        user_id: &str,
        user_name: Option<&str>,
        date: &str,
        now: i64,
    ) -> Result<bool, JobError> {
        let logs = self.conversations.fetch_by_date(user_id, date).await?;
        if logs.is_empty() {
            return Ok(false);
        }
        let display_name = user_name.unwrap_or("them").to_string();
        let transcript = build_transcript(&logs, &display_name);
        if transcript.is_empty() {
            return Ok(false);
        }

        let last_date = self.conversations.last_date_before(user_id, date).await?;
        let days_since = last_date.as_deref().and_then(|d| days_between(d, date));

        let params = DiaryParams {
            user_id: user_id.to_string(),
            user_name: display_name.clone(),
            date: date.to_string(),
            transcript: transcript.clone(),
            days_since_last_chat: days_since,
            now,
        };
        let diary = with_retry(2, Duration::from_secs(1), || {
            generate_diary(provider, settings, &params)
        })
        .await?;

        let summary_text = if diary.highlights.is_empty() {
            diary.content.clone()
        } else {
            diary.highlights.join("; ")
        };
        let write = DiaryWrite {
            user_id: user_id.to_string(),
            date: date.to_string(),
            content: diary.content.clone(),
            summary: Some(summary_text.clone()),
            mood: diary.mood.clone(),
            status: DiaryStatus::Ready,
        };
        self.diaries.save(&write, now).await?;

        self.index_highlights(user_id, date, &diary.highlights, &summary_text, diary.mood.as_deref(), diary.timestamp)
            .await?;

        // Profile refresh is best-effort: a failure here must not undo a
        // successful diary.
        if let Err(err) = self
            .refresh_profile(provider, settings, user_id, &display_name, date, &transcript, now)
            .await
        {
            warn!(user_id, date, error = %err, "profile refresh skipped");
        }

        info!(user_id, date, "diary generated");
        Ok(true)
    }

    async fn index_highlights(
        &self,
        user_id: &str,
        date: &str,
        highlights: &[String],
        summary_text: &str,
        mood: Option<&str>,
        timestamp: i64,
    ) -> Result<(), JobError> {
        let mut texts: Vec<String> = highlights
            .iter()
            .map(|h| h.trim().split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|h| !h.is_empty())
            .take(MAX_HIGHLIGHTS_PER_DAY)
            .collect();
        if texts.is_empty() {
            // Fall back to summary fragments so the day is still findable.
            texts = summary_text
                .split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .take(MAX_HIGHLIGHTS_PER_DAY)
                .map(str::to_string)
                .collect();
        }
        if texts.is_empty() {
            return Ok(());
        }

        let embeddings = self.embedder.embed(&texts).await?;
        let items: Vec<HighlightItem> = texts
            .into_iter()
            .zip(embeddings)
            .map(|(text, embedding)| HighlightItem { text, embedding })
            .collect();
        self.highlights
            .upsert_day(user_id, date, &items, mood, timestamp)
            .await?;
        Ok(())
    }

    async fn refresh_profile(
        &self,
        provider: &BoxChatProvider,
        settings: &RuntimeSettings,
        user_id: &str,
        user_name: &str,
        date: &str,
        transcript: &str,
        now: i64,
    ) -> Result<(), JobError> {
        let previous = self
            .profiles
            .get(user_id)
            .await?
            .and_then(|p| p.content)
            .unwrap_or_default();

        let generation = generate_user_profile(
            provider,
            settings,
            &ProfileParams {
                user_id: user_id.to_string(),
                user_name: user_name.to_string(),
                date: date.to_string(),
                transcript: transcript.to_string(),
                previous_profile: previous,
            },
        )
        .await?;

        self.profiles.save(user_id, &generation.raw, now).await?;
        Ok(())
    }
}
