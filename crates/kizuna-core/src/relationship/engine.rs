//! Relationship state engine.
//!
//! Makes the decay-on-read pattern explicit as a three-stage machine:
//!
//! ```text
//! Raw (persisted row) -> Decayed (read-time view) -> Persisted (next write)
//! ```
//!
//! [`RelationshipEngine::load`] produces the decayed view; mutation
//! helpers (`update_status`, `update_intimacy`, `save_touched`) write the
//! decayed-then-mutated value back, at which point it becomes the new raw
//! row.

use tracing::info;

use kizuna_types::error::RepositoryError;
use kizuna_types::settings::IntimacyTuning;
use kizuna_types::state::{
    DEFAULT_STATUS_LABEL, DEFAULT_STATUS_PILL_COLOR, DEFAULT_STATUS_TEXT_COLOR,
    STATUS_COLOR_MAX_CHARS, STATUS_LABEL_MAX_CHARS, STATUS_REASON_MAX_CHARS, UserState,
};

use crate::repository::state::UserStateRepository;

use super::decay::{apply_delta, clamp_intimacy, decay_intimacy};

/// Requested status change from the `set_status` tool.
#[derive(Debug, Clone, Default)]
pub struct StatusChange {
    pub label: String,
    pub pill_color: String,
    pub text_color: Option<String>,
    pub reason: Option<String>,
}

/// Read-modify-write helpers over one user's relationship state.
pub struct RelationshipEngine<R: UserStateRepository> {
    repo: R,
    tuning: IntimacyTuning,
}

impl<R: UserStateRepository> RelationshipEngine<R> {
    pub fn new(repo: R, tuning: IntimacyTuning) -> Self {
        Self { repo, tuning }
    }

    pub fn tuning(&self) -> &IntimacyTuning {
        &self.tuning
    }

    /// Load the decayed view of a user's state at `now`.
    ///
    /// A user we have never seen gets the initial state. The decayed value
    /// is not written back here; it persists on the next mutation.
    pub async fn load(&self, user_id: &str, now: i64) -> Result<UserState, RepositoryError> {
        let Some(raw) = self.repo.get(user_id).await? else {
            return Ok(UserState::initial(user_id, now));
        };
        Ok(self.decayed_view(raw, now))
    }

    /// Persist a state touched by an interaction at `now`.
    pub async fn save_touched(&self, state: UserState, now: i64) -> Result<UserState, RepositoryError> {
        let next = normalize_state(state.touched(now));
        self.repo.save(&next).await?;
        Ok(next)
    }

    /// Overwrite status fields with length-capped values, falling back to
    /// the fixed defaults for blank label/colors.
    pub async fn update_status(
        &self,
        current: UserState,
        change: StatusChange,
        now: i64,
    ) -> Result<UserState, RepositoryError> {
        let mut next = current;
        next.status_label = cap_or_default(&change.label, STATUS_LABEL_MAX_CHARS, DEFAULT_STATUS_LABEL);
        next.status_pill_color =
            cap_or_default(&change.pill_color, STATUS_COLOR_MAX_CHARS, DEFAULT_STATUS_PILL_COLOR);
        next.status_text_color = cap_or_default(
            change.text_color.as_deref().unwrap_or(""),
            STATUS_COLOR_MAX_CHARS,
            DEFAULT_STATUS_TEXT_COLOR,
        );
        next.status_reason = change
            .reason
            .as_deref()
            .map(|r| cap_chars(r.trim(), STATUS_REASON_MAX_CHARS))
            .filter(|r| !r.is_empty());
        next.status_updated_at = now;

        let next = normalize_state(next.touched(now));
        self.repo.save(&next).await?;
        info!(
            user_id = %next.user_id,
            label = %next.status_label,
            pill_color = %next.status_pill_color,
            "status updated"
        );
        Ok(next)
    }

    /// Apply an intimacy delta (clamped, repair-dampened) and persist.
    pub async fn update_intimacy(
        &self,
        current: UserState,
        delta: i32,
        reason: Option<&str>,
        now: i64,
    ) -> Result<UserState, RepositoryError> {
        let mut next = current;
        next.intimacy = apply_delta(&self.tuning, next.intimacy, delta);

        let next = normalize_state(next.touched(now));
        self.repo.save(&next).await?;
        info!(
            user_id = %next.user_id,
            intimacy = next.intimacy,
            delta,
            reason,
            "intimacy updated"
        );
        Ok(next)
    }

    fn decayed_view(&self, raw: UserState, now: i64) -> UserState {
        let mut view = normalize_state(raw);
        view.intimacy = decay_intimacy(&self.tuning, view.intimacy, view.last_interaction_at, now);
        view
    }
}

/// Enforce the invariants every stored row must satisfy: clamped intimacy
/// and non-empty status fields.
pub fn normalize_state(mut state: UserState) -> UserState {
    state.intimacy = clamp_intimacy(state.intimacy);
    state.status_label = cap_or_default(&state.status_label, STATUS_LABEL_MAX_CHARS, DEFAULT_STATUS_LABEL);
    state.status_pill_color = cap_or_default(
        &state.status_pill_color,
        STATUS_COLOR_MAX_CHARS,
        DEFAULT_STATUS_PILL_COLOR,
    );
    state.status_text_color = cap_or_default(
        &state.status_text_color,
        STATUS_COLOR_MAX_CHARS,
        DEFAULT_STATUS_TEXT_COLOR,
    );
    state.status_reason = state
        .status_reason
        .as_deref()
        .map(|r| cap_chars(r.trim(), STATUS_REASON_MAX_CHARS))
        .filter(|r| !r.is_empty());
    state
}

fn cap_chars(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

fn cap_or_default(value: &str, max_chars: usize, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        cap_chars(trimmed, max_chars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const DAY_MS: i64 = 86_400_000;

    /// In-memory repository recording the last saved row.
    struct MemStateRepo {
        row: Mutex<Option<UserState>>,
    }

    impl MemStateRepo {
        fn new(row: Option<UserState>) -> Self {
            Self { row: Mutex::new(row) }
        }

        fn stored(&self) -> Option<UserState> {
            self.row.lock().unwrap().clone()
        }
    }

    impl UserStateRepository for MemStateRepo {
        async fn get(&self, _user_id: &str) -> Result<Option<UserState>, RepositoryError> {
            Ok(self.row.lock().unwrap().clone())
        }

        async fn save(&self, state: &UserState) -> Result<(), RepositoryError> {
            *self.row.lock().unwrap() = Some(state.clone());
            Ok(())
        }
    }

    fn engine(row: Option<UserState>) -> RelationshipEngine<MemStateRepo> {
        RelationshipEngine::new(MemStateRepo::new(row), IntimacyTuning::default())
    }

    #[tokio::test]
    async fn test_load_unknown_user_returns_initial() {
        let engine = engine(None);
        let state = engine.load("u1", 1_000).await.unwrap();
        assert_eq!(state.intimacy, 0);
        assert_eq!(state.status_label, DEFAULT_STATUS_LABEL);
        // Nothing was written.
        assert!(engine.repo.stored().is_none());
    }

    #[tokio::test]
    async fn test_load_applies_decay_without_persisting() {
        let now = 1_700_000_000_000;
        let mut raw = UserState::initial("u1", now - 7 * DAY_MS);
        raw.intimacy = 9;
        let engine = engine(Some(raw.clone()));

        let view = engine.load("u1", now).await.unwrap();
        assert_eq!(view.intimacy, 7);
        // The stored row still carries the raw number.
        assert_eq!(engine.repo.stored().unwrap().intimacy, 9);
    }

    #[tokio::test]
    async fn test_update_status_caps_and_defaults() {
        let now = 1_700_000_000_000;
        let engine = engine(None);
        let current = UserState::initial("u1", now);

        let long_label = "x".repeat(80);
        let updated = engine
            .update_status(
                current,
                StatusChange {
                    label: long_label,
                    pill_color: "  ".to_string(),
                    text_color: None,
                    reason: Some("because".to_string()),
                },
                now,
            )
            .await
            .unwrap();

        assert_eq!(updated.status_label.chars().count(), STATUS_LABEL_MAX_CHARS);
        assert_eq!(updated.status_pill_color, DEFAULT_STATUS_PILL_COLOR);
        assert_eq!(updated.status_text_color, DEFAULT_STATUS_TEXT_COLOR);
        assert_eq!(updated.status_reason.as_deref(), Some("because"));
        assert_eq!(updated.status_updated_at, now);
        assert_eq!(engine.repo.stored().unwrap().status_reason.as_deref(), Some("because"));
    }

    #[tokio::test]
    async fn test_update_intimacy_persists_decayed_then_mutated() {
        let now = 1_700_000_000_000;
        let mut current = UserState::initial("u1", now);
        current.intimacy = -10;
        let engine = engine(Some(current.clone()));

        let updated = engine.update_intimacy(current, 10, Some("made up"), now).await.unwrap();
        assert_eq!(updated.intimacy, -4);
        assert_eq!(engine.repo.stored().unwrap().intimacy, -4);
    }

    #[test]
    fn test_normalize_state_invariants() {
        let mut state = UserState::initial("u1", 0);
        state.intimacy = 500;
        state.status_label = String::new();
        state.status_reason = Some("   ".to_string());
        let normalized = normalize_state(state);
        assert_eq!(normalized.intimacy, 100);
        assert_eq!(normalized.status_label, DEFAULT_STATUS_LABEL);
        assert!(normalized.status_reason.is_none());
    }
}
