//! Conversation log and diary records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Who spoke a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationRole {
    User,
    Companion,
}

impl fmt::Display for ConversationRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationRole::User => write!(f, "user"),
            ConversationRole::Companion => write!(f, "companion"),
        }
    }
}

impl FromStr for ConversationRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(ConversationRole::User),
            "companion" => Ok(ConversationRole::Companion),
            other => Err(format!("invalid conversation role: '{other}'")),
        }
    }
}

/// One persisted conversation turn.
///
/// Append-only except tombstone deletion. `date` is derived once from
/// `timestamp` + `time_zone` at write time and never recomputed, so a
/// turn stays on the calendar day the user experienced it. `reply_to`
/// forms a chain used to cascade-delete dependent replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationLog {
    pub id: String,
    pub user_id: String,
    pub date: String,
    pub role: ConversationRole,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

/// Lifecycle of a generated diary entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiaryStatus {
    Pending,
    Ready,
    Error,
}

impl fmt::Display for DiaryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiaryStatus::Pending => write!(f, "pending"),
            DiaryStatus::Ready => write!(f, "ready"),
            DiaryStatus::Error => write!(f, "error"),
        }
    }
}

impl FromStr for DiaryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(DiaryStatus::Pending),
            "ready" => Ok(DiaryStatus::Ready),
            "error" => Ok(DiaryStatus::Error),
            other => Err(format!("invalid diary status: '{other}'")),
        }
    }
}

/// A first-person diary entry the companion wrote about one calendar day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiaryEntry {
    pub id: String,
    pub user_id: String,
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    pub status: DiaryStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

impl DiaryEntry {
    /// Deterministic id so a regenerated entry overwrites the old row.
    pub fn entry_id(user_id: &str, date: &str) -> String {
        format!("diary:{user_id}:{date}")
    }
}

/// Long-term profile the companion keeps about one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub content: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One prior content version of an edited conversation turn.
///
/// The UI consumes only `{message_id, version_index}` pairs plus content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageVersion {
    pub log_id: String,
    pub version_index: i64,
    pub content: String,
    pub created_at: i64,
}
