//! Conversation history assembly.
//!
//! The agent sees a rolling two-day window: yesterday's and today's logs,
//! each prefixed with the local wall-clock time the turn happened, split
//! by day-marker system turns.

use kizuna_types::chat::ChatMessage;
use kizuna_types::conversation::{ConversationLog, ConversationRole};

use crate::sanitize::sanitize_text;
use crate::timefmt::{local_time_hm, parse_zone};

/// Render one day of logs as chat messages with `[HH:MM]` prefixes.
///
/// Image attachments are dropped from history (they were already seen in
/// their original turn); turns that end up empty are skipped.
fn history_from_logs(logs: &[ConversationLog]) -> Vec<ChatMessage> {
    logs.iter()
        .filter_map(|log| {
            let text = sanitize_text(&log.content);
            if text.is_empty() {
                return None;
            }
            let zone = parse_zone(log.time_zone.as_deref());
            let prefixed = format!("[{}] {}", local_time_hm(log.timestamp, zone), text);
            Some(match log.role {
                ConversationRole::Companion => ChatMessage::assistant(prefixed),
                ConversationRole::User => ChatMessage::user(prefixed),
            })
        })
        .collect()
}

/// Two-day history: yesterday's block first, then today's, each behind a
/// day-marker system turn.
pub fn build_two_day_history(
    today: &str,
    today_logs: &[ConversationLog],
    yesterday: Option<&str>,
    yesterday_logs: &[ConversationLog],
) -> Vec<ChatMessage> {
    let mut messages = Vec::new();

    if let Some(yesterday) = yesterday {
        let rendered = history_from_logs(yesterday_logs);
        if !rendered.is_empty() {
            messages.push(ChatMessage::system(format!(
                "--- conversation from yesterday ({yesterday}) ---"
            )));
            messages.extend(rendered);
        }
    }

    let rendered = history_from_logs(today_logs);
    if !rendered.is_empty() {
        messages.push(ChatMessage::system(format!(
            "--- conversation from today ({today}) ---"
        )));
        messages.extend(rendered);
    }

    messages
}

/// Flat transcript used by the diary generator: `Speaker: line` per line.
pub fn build_transcript(logs: &[ConversationLog], fallback_user_name: &str) -> String {
    let name = if fallback_user_name.trim().is_empty() {
        "them"
    } else {
        fallback_user_name
    };

    let mut lines = Vec::new();
    for log in logs {
        let speaker = match log.role {
            ConversationRole::Companion => "Me",
            ConversationRole::User => log.user_name.as_deref().unwrap_or(name),
        };
        for raw_line in log.content.replace("\r\n", "\n").replace('\r', "\n").lines() {
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }
            lines.push(format!("{speaker}: {line}"));
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(role: ConversationRole, content: &str, ts: i64) -> ConversationLog {
        ConversationLog {
            id: format!("log-{ts}"),
            user_id: "u1".to_string(),
            date: "2026-08-07".to_string(),
            role,
            content: content.to_string(),
            attachments: vec![],
            reply_to: None,
            timestamp: ts,
            user_name: None,
            time_zone: Some("UTC".to_string()),
        }
    }

    #[test]
    fn test_two_day_history_ordering() {
        let today_logs = vec![log(ConversationRole::User, "morning", 1_786_430_000_000)];
        let yesterday_logs = vec![log(ConversationRole::Companion, "good night", 1_786_300_000_000)];

        let messages = build_two_day_history(
            "2026-08-07",
            &today_logs,
            Some("2026-08-06"),
            &yesterday_logs,
        );

        assert_eq!(messages.len(), 4);
        assert!(messages[0].content.text().contains("yesterday (2026-08-06)"));
        assert!(messages[2].content.text().contains("today (2026-08-07)"));
    }

    #[test]
    fn test_history_prefixes_local_time() {
        let messages = build_two_day_history(
            "2026-08-07",
            &[log(ConversationRole::User, "hello", 1_786_430_000_000)],
            None,
            &[],
        );
        let text = messages[1].content.text();
        assert!(text.starts_with('['), "expected time prefix, got {text}");
        assert!(text.ends_with("hello"));
    }

    #[test]
    fn test_empty_days_produce_no_markers() {
        let messages = build_two_day_history("2026-08-07", &[], Some("2026-08-06"), &[]);
        assert!(messages.is_empty());
    }

    #[test]
    fn test_transcript_splits_lines_and_names_speakers() {
        let logs = vec![
            log(ConversationRole::User, "hi\nhow are you", 1),
            log(ConversationRole::Companion, "doing fine", 2),
        ];
        let transcript = build_transcript(&logs, "Rin");
        assert_eq!(transcript, "Rin: hi\nRin: how are you\nMe: doing fine");
    }
}
