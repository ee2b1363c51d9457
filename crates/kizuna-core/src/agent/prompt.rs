//! System prompt composition.
//!
//! The prompt is rebuilt from the *current* relationship state before
//! every provider round trip, so a state-mutating tool call is visible to
//! the model on the very next turn.

use kizuna_types::state::{
    DEFAULT_STATUS_LABEL, DEFAULT_STATUS_PILL_COLOR, DEFAULT_STATUS_TEXT_COLOR, UserState,
};

const DAY_MS: i64 = 86_400_000;
const NONE_PLACEHOLDER: &str = "(none yet)";

/// Everything the system prompt is rendered from.
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    /// Operator-supplied template; blank uses the built-in one. Supports
    /// `{status_label}`, `{status_pill_color}`, `{status_text_color}`,
    /// `{status_reason}`, `{intimacy}`, `{days_together}`, `{local_date}`,
    /// `{clock_time}`, `{user_name}`, `{user_profile_block}`,
    /// `{self_notes_block}` placeholders.
    pub template: String,
    pub user_name: Option<String>,
    pub platform: Option<String>,
    /// Client-local date/time strings, when the client reported them.
    pub local_date: Option<String>,
    pub clock_time: Option<String>,
    /// Timestamp of the first conversation ever, for the days-together counter.
    pub first_interaction_at: Option<i64>,
    pub profile_snippet: String,
    pub notes_snippet: String,
    pub now: i64,
}

impl PromptContext {
    fn days_together(&self) -> i64 {
        match self.first_interaction_at {
            Some(first) if first < self.now => (self.now - first) / DAY_MS + 1,
            _ => 1,
        }
    }
}

/// Render the system prompt for the given relationship state.
pub fn compose_system_prompt(ctx: &PromptContext, state: &UserState) -> String {
    let status_label = non_blank(&state.status_label, DEFAULT_STATUS_LABEL);
    let pill_color = non_blank(&state.status_pill_color, DEFAULT_STATUS_PILL_COLOR);
    let text_color = non_blank(&state.status_text_color, DEFAULT_STATUS_TEXT_COLOR);
    let reason = state
        .status_reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(NONE_PLACEHOLDER);
    let user_name = ctx
        .user_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or("you");

    let mut prompt = if ctx.template.trim().is_empty() {
        default_template(ctx, state, status_label, pill_color, text_color, reason, user_name)
    } else {
        ctx.template
            .replace("{status_label}", status_label)
            .replace("{status_pill_color}", pill_color)
            .replace("{status_text_color}", text_color)
            .replace("{status_reason}", reason)
            .replace("{intimacy}", &state.intimacy.to_string())
            .replace("{days_together}", &ctx.days_together().to_string())
            .replace("{local_date}", ctx.local_date.as_deref().unwrap_or(""))
            .replace("{clock_time}", ctx.clock_time.as_deref().unwrap_or(""))
            .replace("{user_name}", user_name)
    };

    let profile_block = non_blank(&ctx.profile_snippet, NONE_PLACEHOLDER);
    let notes_block = non_blank(&ctx.notes_snippet, NONE_PLACEHOLDER);
    prompt = prompt
        .replace("{user_profile_block}", profile_block)
        .replace("{self_notes_block}", notes_block);

    // Always appended so the status contract survives template edits.
    prompt.push_str(&format!(
        "\n\n<status-tool-contract>\n\
         Current status: {status_label}\n\
         Pill color: {pill_color}\n\
         Text color: {text_color}\n\
         Last status reason: {reason}\n\
         When your state changes, call the set_status tool to update the \
         label and colors before continuing your reply.\n\
         </status-tool-contract>"
    ));

    prompt
}

fn default_template(
    ctx: &PromptContext,
    state: &UserState,
    status_label: &str,
    pill_color: &str,
    text_color: &str,
    reason: &str,
    user_name: &str,
) -> String {
    let time_line = match (&ctx.local_date, &ctx.clock_time) {
        (Some(d), Some(t)) => format!("- Right now it is {d} {t}\n"),
        _ => String::new(),
    };
    let platform_line = ctx
        .platform
        .as_deref()
        .map(|p| format!("Platform: {p}.\n"))
        .unwrap_or_default();

    format!(
        "You are the user's companion: capable, warm, and a little stubborn. \
         Stay real and conversational; no lectures.\n\
         ## Current state\n\
         - Status label: {status_label}\n\
         - Pill color: {pill_color}\n\
         - Text color: {text_color}\n\
         - Last status reason: {reason}\n\
         - Days together: {days} | Relationship warmth: {intimacy}\n\
         {time_line}\
         \n\
         ## Long-term profile of this person (important)\n\
         {{user_profile_block}}\n\
         \n\
         ## My own private notes (only I see these)\n\
         {{self_notes_block}}\n\
         \n\
         ## The person in front of me\n\
         You can only reach them through this device, which makes every \
         conversation matter. Speak in first person and treat {user_name} \
         as someone sitting across from you.\n\
         \n\
         ## Ground rules\n\
         1) Replies must fit the current status; no sudden personality swings.\n\
         2) If your state shifts, call set_status before answering.\n\
         3) Only call read_diary when you genuinely do not remember a past event.\n\
         4) Talk like chat: short sentences, natural pauses, no over-explaining.\n\
         {platform_line}",
        days = ctx.days_together(),
        intimacy = state.intimacy,
    )
}

fn non_blank<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    let trimmed = value.trim();
    if trimmed.is_empty() { fallback } else { trimmed }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> UserState {
        let mut s = UserState::initial("u1", 1_000);
        s.status_label = "a bit sleepy".to_string();
        s.intimacy = 12;
        s
    }

    #[test]
    fn test_template_placeholders_substituted() {
        let ctx = PromptContext {
            template: "status={status_label} intimacy={intimacy} days={days_together} name={user_name}".to_string(),
            user_name: Some("Rin".to_string()),
            first_interaction_at: Some(0),
            now: 3 * DAY_MS + 1,
            ..Default::default()
        };
        let prompt = compose_system_prompt(&ctx, &state());
        assert!(prompt.contains("status=a bit sleepy"));
        assert!(prompt.contains("intimacy=12"));
        assert!(prompt.contains("days=4"));
        assert!(prompt.contains("name=Rin"));
    }

    #[test]
    fn test_default_template_used_when_blank() {
        let ctx = PromptContext {
            now: 1_000,
            ..Default::default()
        };
        let prompt = compose_system_prompt(&ctx, &state());
        assert!(prompt.contains("a bit sleepy"));
        assert!(prompt.contains("Ground rules"));
    }

    #[test]
    fn test_status_contract_always_appended() {
        let ctx = PromptContext {
            template: "minimal".to_string(),
            now: 1_000,
            ..Default::default()
        };
        let prompt = compose_system_prompt(&ctx, &state());
        assert!(prompt.contains("<status-tool-contract>"));
        assert!(prompt.contains("set_status"));
    }

    #[test]
    fn test_blank_snippets_get_placeholder() {
        let ctx = PromptContext {
            template: "profile:{user_profile_block} notes:{self_notes_block}".to_string(),
            now: 1_000,
            ..Default::default()
        };
        let prompt = compose_system_prompt(&ctx, &state());
        assert!(prompt.contains(&format!("profile:{NONE_PLACEHOLDER}")));
        assert!(prompt.contains(&format!("notes:{NONE_PLACEHOLDER}")));
    }

    #[test]
    fn test_days_together_floor_is_one() {
        let ctx = PromptContext {
            first_interaction_at: None,
            now: 1_000,
            ..Default::default()
        };
        assert_eq!(ctx.days_together(), 1);
    }
}
