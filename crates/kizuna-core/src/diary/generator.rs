//! Diary generation from one day's transcript.
//!
//! The model is asked for a JSON object `{diary, mood, highlights}`;
//! parsing is deliberately tolerant because models wrap JSON in fences or
//! drop fields. A response that doesn't look structured at all is taken
//! as the diary text itself.

use std::time::Duration;

use kizuna_types::chat::ChatMessage;
use kizuna_types::llm::{ChatRequest, ProviderError};
use kizuna_types::settings::RuntimeSettings;

use crate::llm::box_provider::BoxChatProvider;
use crate::llm::traced_send;
use crate::sanitize::sanitize_text;
use crate::timefmt::diary_date_label;

/// A parsed diary generation.
#[derive(Debug, Clone)]
pub struct DiaryGeneration {
    pub content: String,
    pub mood: Option<String>,
    pub highlights: Vec<String>,
    pub timestamp: i64,
}

/// Inputs for one diary generation.
#[derive(Debug, Clone)]
pub struct DiaryParams {
    pub user_id: String,
    pub user_name: String,
    pub date: String,
    pub transcript: String,
    pub days_since_last_chat: Option<i64>,
    pub now: i64,
}

const DIARY_SYSTEM_PROMPT: &str = "You write the companion's private diary. Looking back over one \
day's conversation, write a short first-person entry in your own voice: what happened, what you \
felt, what you want to remember. Respond with ONLY a JSON object shaped like \
{\"diary\": \"...\", \"mood\": \"one word\", \"highlights\": [\"up to ten short factual sentences \
worth remembering\"]}.";

const PLACEHOLDER_ON_UNPARSEABLE: &str = "The diary entry failed to generate cleanly.";

fn days_since_line(days: Option<i64>) -> String {
    match days {
        None => "\n\nThis was our first conversation.".to_string(),
        Some(d) if d >= 30 => format!("\n\nIt had been {} month(s) since we last talked.", d / 30),
        Some(d) if d >= 7 => format!("\n\nIt had been {} week(s) since we last talked.", d / 7),
        Some(d) if d >= 2 => format!("\n\nIt had been {d} days since we last talked."),
        Some(_) => String::new(),
    }
}

fn build_user_prompt(params: &DiaryParams) -> String {
    format!(
        "Date: {date}\nThey are called {name}.\n\nToday's conversation:\n{transcript}{days_since}",
        date = diary_date_label(&params.date),
        name = params.user_name,
        transcript = params.transcript,
        days_since = days_since_line(params.days_since_last_chat),
    )
}

/// Generate one diary entry. Provider errors bubble up so the cron can
/// write an error-status row; empty transcripts are the caller's problem.
pub async fn generate_diary(
    provider: &BoxChatProvider,
    settings: &RuntimeSettings,
    params: &DiaryParams,
) -> Result<DiaryGeneration, ProviderError> {
    let transcript = sanitize_text(&params.transcript);
    if transcript.is_empty() {
        return Err(ProviderError::MissingConfig("empty diary transcript".to_string()));
    }

    let model = resolve_diary_model(settings);
    let messages = vec![
        ChatMessage::system(DIARY_SYSTEM_PROMPT),
        ChatMessage::user(build_user_prompt(params)),
    ];
    let request = ChatRequest::new(model, messages)
        .with_temperature(settings.diary.temperature)
        .with_max_tokens(settings.diary.max_tokens)
        .with_timeout(Duration::from_secs(120));

    let exchange = traced_send(provider, &request, "diary", Some(&params.user_id)).await?;
    let raw = exchange.message.content.unwrap_or_default();
    let parsed = parse_diary_response(&raw);

    let content = match parsed.diary {
        Some(diary) if !diary.trim().is_empty() => diary.trim().to_string(),
        _ => {
            let trimmed = raw.trim();
            if !trimmed.is_empty() && !looks_structured(trimmed) {
                trimmed.to_string()
            } else {
                PLACEHOLDER_ON_UNPARSEABLE.to_string()
            }
        }
    };

    Ok(DiaryGeneration {
        content,
        mood: parsed.mood.filter(|m| !m.trim().is_empty()),
        highlights: parsed.highlights,
        timestamp: params.now,
    })
}

fn resolve_diary_model(settings: &RuntimeSettings) -> String {
    let configured = settings.diary.model.trim();
    if !configured.is_empty() {
        return configured.to_string();
    }
    settings.provider.model.clone()
}

#[derive(Debug, Default)]
struct ParsedDiary {
    diary: Option<String>,
    mood: Option<String>,
    highlights: Vec<String>,
}

fn looks_structured(raw: &str) -> bool {
    raw.starts_with('{') || raw.starts_with("```") || raw.contains("\"diary\"")
}

/// Strip a leading/trailing markdown fence, if present.
fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip an optional language tag on the fence line.
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn parse_diary_response(raw: &str) -> ParsedDiary {
    let text = strip_fences(raw);
    let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
        return ParsedDiary::default();
    };
    if end < start {
        return ParsedDiary::default();
    }

    let Ok(value) = serde_json::from_str::<serde_json::Value>(&text[start..=end]) else {
        return ParsedDiary::default();
    };

    ParsedDiary {
        diary: value.get("diary").and_then(|v| v.as_str()).map(str::to_string),
        mood: value.get("mood").and_then(|v| v.as_str()).map(str::to_string),
        highlights: value
            .get("highlights")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.as_str())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let parsed = parse_diary_response(
            r#"{"diary":"a long day","mood":"content","highlights":["slept in","we argued about tea"]}"#,
        );
        assert_eq!(parsed.diary.as_deref(), Some("a long day"));
        assert_eq!(parsed.mood.as_deref(), Some("content"));
        assert_eq!(parsed.highlights.len(), 2);
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "```json\n{\"diary\":\"fenced\",\"mood\":\"calm\",\"highlights\":[]}\n```";
        let parsed = parse_diary_response(raw);
        assert_eq!(parsed.diary.as_deref(), Some("fenced"));
    }

    #[test]
    fn test_parse_json_with_prose_around_it() {
        let raw = "Here you go:\n{\"diary\":\"embedded\",\"highlights\":[\"one\"]}\nHope that helps!";
        let parsed = parse_diary_response(raw);
        assert_eq!(parsed.diary.as_deref(), Some("embedded"));
        assert_eq!(parsed.highlights, vec!["one"]);
    }

    #[test]
    fn test_parse_garbage_returns_default() {
        let parsed = parse_diary_response("no braces here");
        assert!(parsed.diary.is_none());
        assert!(parsed.highlights.is_empty());
    }

    #[test]
    fn test_highlights_filter_blank_entries() {
        let parsed =
            parse_diary_response(r#"{"diary":"d","highlights":["keep","  ", ""]}"#);
        assert_eq!(parsed.highlights, vec!["keep"]);
    }

    #[test]
    fn test_days_since_phrasing_buckets() {
        assert!(days_since_line(None).contains("first conversation"));
        assert!(days_since_line(Some(1)).is_empty());
        assert!(days_since_line(Some(3)).contains("3 days"));
        assert!(days_since_line(Some(10)).contains("1 week"));
        assert!(days_since_line(Some(65)).contains("2 month"));
    }

    #[test]
    fn test_looks_structured() {
        assert!(looks_structured("{\"diary\":1}"));
        assert!(looks_structured("```json"));
        assert!(!looks_structured("just a diary paragraph"));
    }
}
