//! Proactive outreach records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Delivery lifecycle of a proactive message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProactiveStatus {
    Pending,
    Delivered,
    Expired,
}

impl fmt::Display for ProactiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProactiveStatus::Pending => write!(f, "pending"),
            ProactiveStatus::Delivered => write!(f, "delivered"),
            ProactiveStatus::Expired => write!(f, "expired"),
        }
    }
}

impl FromStr for ProactiveStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ProactiveStatus::Pending),
            "delivered" => Ok(ProactiveStatus::Delivered),
            "expired" => Ok(ProactiveStatus::Expired),
            other => Err(format!("invalid proactive status: '{other}'")),
        }
    }
}

/// How the user is notified about a proactive message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    Email,
    Webhook,
    None,
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationChannel::Email => write!(f, "email"),
            NotificationChannel::Webhook => write!(f, "webhook"),
            NotificationChannel::None => write!(f, "none"),
        }
    }
}

impl FromStr for NotificationChannel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "email" => Ok(NotificationChannel::Email),
            "webhook" => Ok(NotificationChannel::Webhook),
            "none" => Ok(NotificationChannel::None),
            other => Err(format!("invalid notification channel: '{other}'")),
        }
    }
}

/// A scheduler-initiated message waiting for the client to pull it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProactiveMessage {
    pub id: String,
    pub user_id: String,
    pub content: String,
    /// JSON snapshot of the gate values that admitted this send.
    pub trigger_context: String,
    pub status: ProactiveStatus,
    pub notification_channel: NotificationChannel,
    pub notification_sent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_error: Option<String>,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<i64>,
    pub expires_at: i64,
}

/// Per-user proactive rate-limit counters.
///
/// `daily_count` only counts toward the cap while `daily_count_date`
/// equals the current local calendar day; a new day resets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProactiveUserState {
    pub user_id: String,
    pub last_proactive_at: i64,
    pub daily_count: i64,
    pub daily_count_date: String,
    pub updated_at: i64,
}

impl ProactiveUserState {
    pub fn initial(user_id: impl Into<String>, now: i64) -> Self {
        Self {
            user_id: user_id.into(),
            last_proactive_at: 0,
            daily_count: 0,
            daily_count_date: String::new(),
            updated_at: now,
        }
    }

    /// Count toward today's cap, zero if the stored date is stale.
    pub fn count_for(&self, local_date: &str) -> i64 {
        if self.daily_count_date == local_date {
            self.daily_count
        } else {
            0
        }
    }
}

/// Result of delivering a notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationResult {
    pub sent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NotificationResult {
    pub fn sent() -> Self {
        Self { sent: true, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            sent: false,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proactive_status_roundtrip() {
        for status in [ProactiveStatus::Pending, ProactiveStatus::Delivered, ProactiveStatus::Expired] {
            let parsed: ProactiveStatus = status.to_string().parse().unwrap();
            assert_eq!(status, parsed);
        }
    }

    #[test]
    fn test_notification_channel_roundtrip() {
        for channel in [NotificationChannel::Email, NotificationChannel::Webhook, NotificationChannel::None] {
            let parsed: NotificationChannel = channel.to_string().parse().unwrap();
            assert_eq!(channel, parsed);
        }
    }

    #[test]
    fn test_daily_count_resets_on_new_date() {
        let state = ProactiveUserState {
            user_id: "u1".to_string(),
            last_proactive_at: 100,
            daily_count: 3,
            daily_count_date: "2026-08-06".to_string(),
            updated_at: 100,
        };
        assert_eq!(state.count_for("2026-08-06"), 3);
        assert_eq!(state.count_for("2026-08-07"), 0);
    }
}
