//! Runtime settings.
//!
//! Deserialized from a TOML config file with environment overrides applied
//! by the binary. Every tuning constant the schedulers and the relationship
//! engine consume lives here so tests can construct explicit values.

use serde::{Deserialize, Serialize};

use crate::llm::ApiFormat;
use crate::proactive::NotificationChannel;

/// Default timezone for users who never reported one.
pub const DEFAULT_TIMEZONE: &str = "Asia/Tokyo";

/// Top-level runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSettings {
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub embeddings: EmbeddingsSettings,
    #[serde(default)]
    pub web_search: WebSearchSettings,
    #[serde(default)]
    pub diary: DiarySettings,
    #[serde(default)]
    pub proactive: ProactiveSettings,
    #[serde(default)]
    pub intimacy: IntimacyTuning,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            provider: ProviderSettings::default(),
            agent: AgentSettings::default(),
            embeddings: EmbeddingsSettings::default(),
            web_search: WebSearchSettings::default(),
            diary: DiarySettings::default(),
            proactive: ProactiveSettings::default(),
            intimacy: IntimacyTuning::default(),
        }
    }
}

/// Upstream chat provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Wire protocol of the upstream endpoint.
    #[serde(default = "default_api_format")]
    pub api_format: ApiFormat,
    /// Base URL without a version suffix (the adapter appends v1/v1beta).
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    /// Anthropic `anthropic-version` header override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_version: Option<String>,
    /// Root directory for locally stored media referenced by image parts.
    #[serde(default)]
    pub media_root: String,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_format: default_api_format(),
            api_url: String::new(),
            api_key: String::new(),
            model: default_chat_model(),
            provider_version: None,
            media_root: String::new(),
        }
    }
}

/// Agent loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_agent_temperature")]
    pub temperature: f64,
    #[serde(default = "default_agent_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_agent_timeout_ms")]
    pub timeout_ms: u64,
    /// Optional system prompt template; `{status_label}`-style
    /// placeholders are substituted per turn. Blank uses the built-in.
    #[serde(default)]
    pub system_template: String,
    #[serde(default = "default_timezone")]
    pub time_zone: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            temperature: default_agent_temperature(),
            max_tokens: default_agent_max_tokens(),
            timeout_ms: default_agent_timeout_ms(),
            system_template: String::new(),
            time_zone: default_timezone(),
        }
    }
}

/// OpenAI-compatible embeddings endpoint configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingsSettings {
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model: String,
}

/// Web search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchSettings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_search_max_results")]
    pub max_results: usize,
    #[serde(default = "default_search_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for WebSearchSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            max_results: default_search_max_results(),
            timeout_ms: default_search_timeout_ms(),
        }
    }
}

/// Diary cron configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiarySettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Local wall-clock fire time, `HH:MM`.
    #[serde(default = "default_diary_time")]
    pub time: String,
    #[serde(default = "default_timezone")]
    pub time_zone: String,
    /// How many recent calendar dates each run rechecks (clamped 1..=14).
    #[serde(default = "default_catchup_days")]
    pub catchup_days: u32,
    /// Separate endpoint for diary generation; blank falls back to the
    /// chat provider settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_format: Option<ApiFormat>,
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_diary_temperature")]
    pub temperature: f64,
    #[serde(default = "default_diary_max_tokens")]
    pub max_tokens: u32,
}

impl Default for DiarySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            time: default_diary_time(),
            time_zone: default_timezone(),
            catchup_days: default_catchup_days(),
            api_format: None,
            api_url: String::new(),
            api_key: String::new(),
            model: String::new(),
            temperature: default_diary_temperature(),
            max_tokens: default_diary_max_tokens(),
        }
    }
}

/// Proactive outreach configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProactiveSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Minutes between runs; fire times align to local-day boundaries.
    #[serde(default = "default_proactive_interval")]
    pub interval_minutes: u32,
    #[serde(default = "default_timezone")]
    pub time_zone: String,
    /// Quiet-hour window `[start, end)` in local hours, wraps midnight.
    #[serde(default = "default_quiet_start")]
    pub quiet_start_hour: u32,
    #[serde(default = "default_quiet_end")]
    pub quiet_end_hour: u32,
    #[serde(default = "default_max_daily")]
    pub max_daily: i64,
    #[serde(default = "default_cooldown_hours")]
    pub cooldown_hours: i64,
    /// Minimum intimacy before the companion reaches out on its own.
    #[serde(default = "default_intimacy_threshold")]
    pub intimacy_threshold: i32,
    /// Skip users who interacted within this many minutes.
    #[serde(default = "default_recent_active_minutes")]
    pub recent_active_minutes: i64,
    /// Only consider users active within this many hours.
    #[serde(default = "default_lookback_hours")]
    pub candidate_lookback_hours: i64,
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: i64,
    #[serde(default = "default_notification_channel")]
    pub notification_channel: NotificationChannel,
    #[serde(default)]
    pub notification_target: String,
}

impl Default for ProactiveSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: default_proactive_interval(),
            time_zone: default_timezone(),
            quiet_start_hour: default_quiet_start(),
            quiet_end_hour: default_quiet_end(),
            max_daily: default_max_daily(),
            cooldown_hours: default_cooldown_hours(),
            intimacy_threshold: default_intimacy_threshold(),
            recent_active_minutes: default_recent_active_minutes(),
            candidate_lookback_hours: default_lookback_hours(),
            candidate_limit: default_candidate_limit(),
            notification_channel: default_notification_channel(),
            notification_target: String::new(),
        }
    }
}

/// Relationship decay and delta tuning.
///
/// These are tuning constants with no derivation from first principles;
/// they stay configurable rather than hard-coded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntimacyTuning {
    /// Largest single positive delta a tool call may apply.
    #[serde(default = "default_max_delta_up")]
    pub max_delta_up: i32,
    /// Largest single negative delta (stored as a negative number).
    #[serde(default = "default_max_delta_down")]
    pub max_delta_down: i32,
    /// Dampening applied to positive deltas while intimacy is negative.
    #[serde(default = "default_repair_factor")]
    pub repair_factor: f64,
    /// Days of silence per one decay step toward zero.
    #[serde(default = "default_decay_step_days")]
    pub decay_step_days: i64,
}

impl Default for IntimacyTuning {
    fn default() -> Self {
        Self {
            max_delta_up: default_max_delta_up(),
            max_delta_down: default_max_delta_down(),
            repair_factor: default_repair_factor(),
            decay_step_days: default_decay_step_days(),
        }
    }
}

fn default_api_format() -> ApiFormat {
    ApiFormat::OpenAi
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_agent_temperature() -> f64 {
    1.0
}

fn default_agent_max_tokens() -> u32 {
    4096
}

fn default_agent_timeout_ms() -> u64 {
    120_000
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

fn default_search_max_results() -> usize {
    5
}

fn default_search_timeout_ms() -> u64 {
    12_000
}

fn default_diary_time() -> String {
    "23:59".to_string()
}

fn default_catchup_days() -> u32 {
    2
}

fn default_diary_temperature() -> f64 {
    0.7
}

fn default_diary_max_tokens() -> u32 {
    4096
}

fn default_proactive_interval() -> u32 {
    60
}

fn default_quiet_start() -> u32 {
    23
}

fn default_quiet_end() -> u32 {
    7
}

fn default_max_daily() -> i64 {
    2
}

fn default_max_delta_up() -> i32 {
    10
}

fn default_max_delta_down() -> i32 {
    -50
}

fn default_repair_factor() -> f64 {
    0.6
}

fn default_decay_step_days() -> i64 {
    3
}

fn default_cooldown_hours() -> i64 {
    6
}

fn default_intimacy_threshold() -> i32 {
    10
}

fn default_recent_active_minutes() -> i64 {
    90
}

fn default_lookback_hours() -> i64 {
    24 * 30
}

fn default_candidate_limit() -> i64 {
    500
}

fn default_notification_channel() -> NotificationChannel {
    NotificationChannel::None
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let settings: RuntimeSettings = toml::from_str("").unwrap();
        assert_eq!(settings.agent.max_tokens, 4096);
        assert_eq!(settings.proactive.quiet_start_hour, 23);
        assert_eq!(settings.proactive.quiet_end_hour, 7);
        assert!((settings.intimacy.repair_factor - 0.6).abs() < f64::EPSILON);
        assert_eq!(settings.intimacy.decay_step_days, 3);
        assert!(!settings.proactive.enabled);
        assert!(settings.diary.enabled);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let settings: RuntimeSettings = toml::from_str(
            r#"
            [provider]
            api_format = "anthropic"
            api_url = "https://api.anthropic.com"
            model = "claude-sonnet-4-20250514"

            [proactive]
            enabled = true
            max_daily = 4
            "#,
        )
        .unwrap();
        assert_eq!(settings.provider.api_format, ApiFormat::Anthropic);
        assert_eq!(settings.proactive.max_daily, 4);
        assert_eq!(settings.proactive.cooldown_hours, 6);
    }
}
