//! Long-term user profile generation.
//!
//! Regenerated after each diary pass from the day's transcript plus the
//! previous profile, then normalized into fixed categories so the prompt
//! snippet builder can rely on the shape.

use std::time::Duration;

use serde_json::{Value, json};

use kizuna_types::chat::ChatMessage;
use kizuna_types::llm::{ChatRequest, ProviderError};
use kizuna_types::settings::RuntimeSettings;

use crate::llm::box_provider::BoxChatProvider;
use crate::llm::traced_send;
use crate::sanitize::sanitize_text;

/// Categories a profile is normalized into, in order.
pub const PROFILE_CATEGORIES: [&str; 5] = ["facts", "likes", "boundaries", "speech_style", "relationship"];

/// Entries kept per category.
const MAX_ENTRIES_PER_CATEGORY: usize = 6;

const PROFILE_SYSTEM_PROMPT: &str = "You maintain the companion's long-term profile of one person. \
Merge what today's conversation shows with the previous profile, keeping only what still holds. \
Respond with ONLY a JSON object with the keys \"facts\", \"likes\", \"boundaries\", \
\"speech_style\" and \"relationship\", each an array of short strings.";

/// Result of one profile generation: the normalized JSON string plus the
/// parsed payload.
#[derive(Debug, Clone)]
pub struct ProfileGeneration {
    pub raw: String,
    pub payload: Value,
}

#[derive(Debug, Clone)]
pub struct ProfileParams {
    pub user_id: String,
    pub user_name: String,
    pub date: String,
    pub transcript: String,
    pub previous_profile: String,
}

/// Generate and normalize a profile. Provider errors bubble up; the diary
/// cron treats a failed profile as skippable.
pub async fn generate_user_profile(
    provider: &BoxChatProvider,
    settings: &RuntimeSettings,
    params: &ProfileParams,
) -> Result<ProfileGeneration, ProviderError> {
    let transcript = sanitize_text(&params.transcript);
    if transcript.is_empty() {
        return Err(ProviderError::MissingConfig("empty profile material".to_string()));
    }
    let previous = {
        let cleaned = sanitize_text(&params.previous_profile);
        if cleaned.is_empty() {
            "(no previous profile)".to_string()
        } else {
            cleaned
        }
    };

    let user_prompt = format!(
        "Date: {}\nThey are called {}.\n\nPrevious profile:\n{}\n\nToday's conversation:\n{}",
        params.date, params.user_name, previous, transcript
    );

    let model = {
        let configured = settings.diary.model.trim();
        if configured.is_empty() {
            settings.provider.model.clone()
        } else {
            configured.to_string()
        }
    };
    let request = ChatRequest::new(
        model,
        vec![
            ChatMessage::system(PROFILE_SYSTEM_PROMPT),
            ChatMessage::user(user_prompt),
        ],
    )
    .with_temperature(0.2)
    .with_max_tokens(1024)
    .with_timeout(Duration::from_secs(90));

    let exchange = traced_send(provider, &request, "profile", Some(&params.user_id)).await?;
    let raw = exchange.message.content.unwrap_or_default();

    let payload = normalize_profile_payload(&parse_profile_json(&raw));
    Ok(ProfileGeneration {
        raw: payload.to_string(),
        payload,
    })
}

fn parse_profile_json(raw: &str) -> Value {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = match rest.find('\n') {
            Some(pos) => &rest[pos + 1..],
            None => rest,
        };
        text = text.strip_suffix("```").unwrap_or(text).trim();
    }

    let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
        return json!({});
    };
    if end < start {
        return json!({});
    }
    serde_json::from_str(&text[start..=end]).unwrap_or_else(|_| json!({}))
}

/// Force the payload into the fixed category shape: every category
/// present, entries trimmed, blanks dropped, capped per category.
pub fn normalize_profile_payload(input: &Value) -> Value {
    let mut out = serde_json::Map::new();
    for category in PROFILE_CATEGORIES {
        let entries: Vec<String> = input
            .get(category)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.as_str())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .take(MAX_ENTRIES_PER_CATEGORY)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        out.insert(category.to_string(), json!(entries));
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_fills_missing_categories() {
        let normalized = normalize_profile_payload(&json!({ "facts": ["works nights"] }));
        for category in PROFILE_CATEGORIES {
            assert!(normalized[category].is_array(), "{category} missing");
        }
        assert_eq!(normalized["facts"][0], "works nights");
        assert_eq!(normalized["likes"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_normalize_caps_and_trims() {
        let many: Vec<String> = (0..10).map(|i| format!(" entry {i} ")).collect();
        let normalized = normalize_profile_payload(&json!({ "likes": many }));
        let likes = normalized["likes"].as_array().unwrap();
        assert_eq!(likes.len(), MAX_ENTRIES_PER_CATEGORY);
        assert_eq!(likes[0], "entry 0");
    }

    #[test]
    fn test_normalize_drops_non_strings_and_blanks() {
        let normalized = normalize_profile_payload(&json!({ "facts": ["keep", 42, "", "  "] }));
        assert_eq!(normalized["facts"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_parse_profile_json_fenced() {
        let parsed = parse_profile_json("```json\n{\"facts\":[\"x\"]}\n```");
        assert_eq!(parsed["facts"][0], "x");
    }

    #[test]
    fn test_parse_profile_json_garbage() {
        assert_eq!(parse_profile_json("not json"), json!({}));
    }
}
