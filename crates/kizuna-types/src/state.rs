//! Per-user relationship state.
//!
//! One row per user. The stored row is always the last explicit write;
//! time decay is applied at read time as a pure function of elapsed time
//! (see `kizuna_core::relationship`) and only persisted when the next
//! mutation writes the decayed value back.

use serde::{Deserialize, Serialize};

/// Fallback status shown when the companion has never set one, and
/// substituted for any blank field on normalize.
pub const DEFAULT_STATUS_LABEL: &str = "right here with you";
pub const DEFAULT_STATUS_PILL_COLOR: &str = "#7E8EA3";
pub const DEFAULT_STATUS_TEXT_COLOR: &str = "#FFFFFF";

/// Field length caps applied on every status write.
pub const STATUS_LABEL_MAX_CHARS: usize = 40;
pub const STATUS_COLOR_MAX_CHARS: usize = 32;
pub const STATUS_REASON_MAX_CHARS: usize = 120;

/// Intimacy bounds.
pub const INTIMACY_MIN: i32 = -100;
pub const INTIMACY_MAX: i32 = 100;

/// Relationship state for one user.
///
/// `intimacy` is an integer in `[-100, 100]`. Timestamps are unix epoch
/// milliseconds, matching the conversation log records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserState {
    pub user_id: String,
    pub status_label: String,
    pub status_pill_color: String,
    pub status_text_color: String,
    pub status_reason: Option<String>,
    pub status_updated_at: i64,
    pub intimacy: i32,
    pub last_interaction_at: i64,
    pub updated_at: i64,
}

impl UserState {
    /// Fresh state for a user we have never seen.
    pub fn initial(user_id: impl Into<String>, now: i64) -> Self {
        Self {
            user_id: user_id.into(),
            status_label: DEFAULT_STATUS_LABEL.to_string(),
            status_pill_color: DEFAULT_STATUS_PILL_COLOR.to_string(),
            status_text_color: DEFAULT_STATUS_TEXT_COLOR.to_string(),
            status_reason: None,
            status_updated_at: now,
            intimacy: 0,
            last_interaction_at: now,
            updated_at: now,
        }
    }

    /// Mark the state as touched by an interaction at `now`.
    pub fn touched(mut self, now: i64) -> Self {
        self.last_interaction_at = now;
        self.updated_at = now;
        self
    }
}

/// The status payload the UI consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusPayload {
    pub label: String,
    pub pill_color: String,
    pub text_color: String,
}

impl From<&UserState> for StatusPayload {
    fn from(state: &UserState) -> Self {
        Self {
            label: state.status_label.clone(),
            pill_color: state.status_pill_color.clone(),
            text_color: state.status_text_color.clone(),
        }
    }
}
