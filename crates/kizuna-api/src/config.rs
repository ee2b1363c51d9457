//! Settings loading: TOML file plus environment overrides.
//!
//! Secrets never have to live in the config file: `KIZUNA_API_KEY`,
//! `KIZUNA_EMBEDDINGS_API_KEY` and `KIZUNA_SEARCH_API_KEY` override the
//! corresponding fields when set.

use std::path::{Path, PathBuf};

use kizuna_types::error::ConfigError;
use kizuna_types::settings::RuntimeSettings;

/// Default config path: `$KIZUNA_DATA_DIR/config.toml`, falling back to
/// `~/.kizuna/config.toml`.
pub fn default_config_path() -> PathBuf {
    if let Ok(dir) = std::env::var("KIZUNA_DATA_DIR") {
        return PathBuf::from(dir).join("config.toml");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".kizuna")
        .join("config.toml")
}

/// Load settings from `path` (defaults apply if the file is absent),
/// then apply environment overrides and validate.
pub fn load_settings(path: Option<&Path>) -> Result<RuntimeSettings, ConfigError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);

    let mut settings = if path.exists() {
        let raw = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?
    } else {
        RuntimeSettings::default()
    };

    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

fn env_override(settings_field: &mut String, var: &str) {
    if let Ok(value) = std::env::var(var) {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            *settings_field = trimmed.to_string();
        }
    }
}

fn apply_env_overrides(settings: &mut RuntimeSettings) {
    env_override(&mut settings.provider.api_key, "KIZUNA_API_KEY");
    env_override(&mut settings.provider.api_url, "KIZUNA_API_URL");
    env_override(&mut settings.embeddings.api_key, "KIZUNA_EMBEDDINGS_API_KEY");
    env_override(&mut settings.web_search.api_key, "KIZUNA_SEARCH_API_KEY");
    env_override(&mut settings.diary.api_key, "KIZUNA_DIARY_API_KEY");
}

fn validate(settings: &RuntimeSettings) -> Result<(), ConfigError> {
    if settings.proactive.quiet_start_hour > 23 {
        return Err(ConfigError::Invalid {
            key: "proactive.quiet_start_hour",
            message: "must be 0-23".to_string(),
        });
    }
    if settings.proactive.quiet_end_hour > 23 {
        return Err(ConfigError::Invalid {
            key: "proactive.quiet_end_hour",
            message: "must be 0-23".to_string(),
        });
    }
    if settings.proactive.interval_minutes == 0 {
        return Err(ConfigError::Invalid {
            key: "proactive.interval_minutes",
            message: "must be greater than zero".to_string(),
        });
    }
    if !(0.0..=1.0).contains(&settings.intimacy.repair_factor) {
        return Err(ConfigError::Invalid {
            key: "intimacy.repair_factor",
            message: "must be within 0..=1".to_string(),
        });
    }
    if settings.intimacy.decay_step_days < 1 {
        return Err(ConfigError::Invalid {
            key: "intimacy.decay_step_days",
            message: "must be at least 1".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings(Some(&dir.path().join("nope.toml"))).unwrap();
        assert_eq!(settings.diary.catchup_days, 2);
    }

    #[test]
    fn test_file_values_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [provider]
            api_format = "gemini"
            api_url = "https://generativelanguage.googleapis.com"
            model = "gemini-2.0-flash"

            [diary]
            time = "22:30"
            "#,
        )
        .unwrap();

        let settings = load_settings(Some(&path)).unwrap();
        assert_eq!(settings.provider.model, "gemini-2.0-flash");
        assert_eq!(settings.diary.time, "22:30");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[proactive]\nquiet_start_hour = 25\n").unwrap();
        assert!(load_settings(Some(&path)).is_err());

        std::fs::write(&path, "[intimacy]\ndecay_step_days = 0\n").unwrap();
        assert!(load_settings(Some(&path)).is_err());
    }
}
