//! Tool execution against the repositories.
//!
//! The toolbox is where the model's tool calls touch real state. Handlers
//! return `Result<ToolOutcome, ToolError>`; the loop boundary converts
//! every error into a safe string result so the turn always continues.

use serde_json::Value;
use tracing::warn;

use kizuna_types::conversation::{ConversationRole, DiaryStatus};
use kizuna_types::error::ToolError;
use kizuna_types::state::UserState;

use crate::memory::{Embedder, HighlightStore};
use crate::relationship::{RelationshipEngine, StatusChange};
use crate::repository::conversation::ConversationRepository;
use crate::repository::diary::DiaryRepository;
use crate::repository::fact::FactRepository;
use crate::repository::state::UserStateRepository;
use crate::sanitize::sanitize_text;
use crate::search::WebSearcher;
use crate::timefmt::{local_time_hms, parse_iso_date, parse_zone};

use super::tools::ToolOutcome;

/// Per-turn context shared by every tool call.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub user_id: String,
    pub user_name: Option<String>,
    /// Calendar date the conversation turn belongs to.
    pub context_date: String,
    pub now: i64,
}

/// Executes tool calls for the agent loop.
///
/// Generic over the repository ports so tests can plug in-memory fakes.
pub struct AgentToolbox<C, D, S, F, E, H, W>
where
    C: ConversationRepository,
    D: DiaryRepository,
    S: UserStateRepository,
    F: FactRepository,
    E: Embedder,
    H: HighlightStore,
    W: WebSearcher,
{
    conversations: C,
    diaries: D,
    engine: RelationshipEngine<S>,
    facts: F,
    embedder: E,
    highlights: H,
    web: W,
}

/// How many memory hits a single search returns to the model.
const MEMORY_SEARCH_LIMIT: usize = 20;
/// How many facts the prompt and the tools surface.
pub const ACTIVE_FACT_LIMIT: i64 = 15;

impl<C, D, S, F, E, H, W> AgentToolbox<C, D, S, F, E, H, W>
where
    C: ConversationRepository,
    D: DiaryRepository,
    S: UserStateRepository,
    F: FactRepository,
    E: Embedder,
    H: HighlightStore,
    W: WebSearcher,
{
    pub fn new(
        conversations: C,
        diaries: D,
        engine: RelationshipEngine<S>,
        facts: F,
        embedder: E,
        highlights: H,
        web: W,
    ) -> Self {
        Self {
            conversations,
            diaries,
            engine,
            facts,
            embedder,
            highlights,
            web,
        }
    }

    /// Execute one tool call. `state` is the loop's current relationship
    /// state; a mutating tool returns the replacement via
    /// [`ToolOutcome::updated_state`].
    pub async fn execute(
        &self,
        name: &str,
        arguments: &str,
        ctx: &ToolContext,
        state: &UserState,
    ) -> Result<ToolOutcome, ToolError> {
        let args: Value = serde_json::from_str(arguments).unwrap_or_else(|err| {
            warn!(tool = name, error = %err, "tool arguments failed to parse, using empty object");
            Value::Object(Default::default())
        });

        match name {
            "read_diary" => self.read_diary(&args, ctx).await,
            "read_conversation" => self.read_conversation(&args, ctx).await,
            "search_memory" => self.search_memory(&args, ctx).await,
            "web_search" => self.web_search(&args).await,
            "set_status" => self.set_status(&args, ctx, state).await,
            "update_intimacy" => self.update_intimacy(&args, ctx, state).await,
            "remember_fact" => self.remember_fact(&args, ctx).await,
            "forget_fact" => self.forget_fact(&args, ctx).await,
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    async fn read_diary(&self, args: &Value, ctx: &ToolContext) -> Result<ToolOutcome, ToolError> {
        let date = string_arg(args, &["date", "time_range"]);
        if parse_iso_date(&date).is_none() {
            if !string_arg(args, &["query"]).is_empty() {
                return Ok(ToolOutcome::text(
                    "If you're unsure of the date, use search_memory(query) first to find the \
                     relevant day, then read_diary(date) for the full entry.",
                ));
            }
            return Ok(ToolOutcome::text("Give me date=YYYY-MM-DD."));
        }

        let entry = self
            .diaries
            .get(&ctx.user_id, &date)
            .await
            .map_err(|e| ToolError::Failed {
                tool: "read_diary",
                message: e.to_string(),
            })?;

        let Some(entry) = entry else {
            return Ok(ToolOutcome::text(format!("No diary for that day ({date}) yet.")));
        };
        if entry.status != DiaryStatus::Ready {
            return Ok(ToolOutcome::text(format!(
                "The diary for {date} isn't ready yet ({}).",
                entry.status
            )));
        }
        let content = entry
            .content
            .or(entry.summary)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        let Some(content) = content else {
            return Ok(ToolOutcome::text(format!(
                "There is a diary for {date}, but it's empty."
            )));
        };

        Ok(ToolOutcome::text(format!(
            "Note: the following is my own first-person diary; \"I\" is me, \"you\" is the user.\n\n\
             [{date} | my diary] {content}"
        )))
    }

    async fn read_conversation(&self, args: &Value, ctx: &ToolContext) -> Result<ToolOutcome, ToolError> {
        let date = string_arg(args, &["date"]);
        if parse_iso_date(&date).is_none() {
            return Ok(ToolOutcome::text("Give me date=YYYY-MM-DD."));
        }

        let logs = self
            .conversations
            .fetch_by_date(&ctx.user_id, &date)
            .await
            .map_err(|e| ToolError::Failed {
                tool: "read_conversation",
                message: e.to_string(),
            })?;
        if logs.is_empty() {
            return Ok(ToolOutcome::text(format!("No chat log for that day ({date}).")));
        }

        let fallback_name = ctx.user_name.clone().unwrap_or_else(|| "you".to_string());
        let mut lines = vec![format!("Chat log for {date}:")];
        for log in &logs {
            let content = log.content.trim();
            if content.is_empty() {
                continue;
            }
            let zone = parse_zone(log.time_zone.as_deref());
            let speaker = match log.role {
                ConversationRole::Companion => "Me",
                ConversationRole::User => log.user_name.as_deref().unwrap_or(&fallback_name),
            };
            lines.push(format!(
                "[{}] {speaker}: {content}",
                local_time_hms(log.timestamp, zone)
            ));
        }
        if lines.len() == 1 {
            return Ok(ToolOutcome::text(format!(
                "There are records for {date}, but they're empty."
            )));
        }
        Ok(ToolOutcome::text(lines.join("\n")))
    }

    async fn search_memory(&self, args: &Value, ctx: &ToolContext) -> Result<ToolOutcome, ToolError> {
        let query = sanitize_text(&string_arg(args, &["query"]));
        if query.is_empty() {
            return Ok(ToolOutcome::text("Give me a query."));
        }

        let embeddings = self
            .embedder
            .embed(&[query.clone()])
            .await
            .map_err(|e| ToolError::Failed {
                tool: "search_memory",
                message: e.to_string(),
            })?;
        let Some(query_embedding) = embeddings.first() else {
            return Err(ToolError::Failed {
                tool: "search_memory",
                message: "embedder returned no vectors".to_string(),
            });
        };

        let hits = self
            .highlights
            .search(&ctx.user_id, query_embedding, MEMORY_SEARCH_LIMIT)
            .await
            .map_err(|e| ToolError::Failed {
                tool: "search_memory",
                message: e.to_string(),
            })?;
        if hits.is_empty() {
            return Ok(ToolOutcome::text("No related memories found."));
        }

        let mut lines = vec!["Fragments from my memory that might be related:".to_string()];
        for hit in &hits {
            lines.push(format!("- {}: {}", hit.date, hit.text));
        }
        lines.push(
            "If you need the why, the exact words, or more detail than these fragments give, \
             use read_diary(date) or read_conversation(date) to check the original."
                .to_string(),
        );
        Ok(ToolOutcome::text(lines.join("\n")))
    }

    async fn web_search(&self, args: &Value) -> Result<ToolOutcome, ToolError> {
        let query = sanitize_text(&string_arg(args, &["query"]));
        if query.is_empty() {
            return Ok(ToolOutcome::text("Give me a query."));
        }

        let items = self.web.search(&query).await?;
        if items.is_empty() {
            return Ok(ToolOutcome::text("The search turned up nothing useful."));
        }

        let mut lines = vec!["Key points from outside (for this answer only):".to_string()];
        for item in &items {
            match (item.title.trim(), item.snippet.trim()) {
                ("", "") => continue,
                (title, "") => lines.push(format!("- {title}")),
                ("", snippet) => lines.push(format!("- {snippet}")),
                (title, snippet) => lines.push(format!("- {title}: {snippet}")),
            }
        }
        Ok(ToolOutcome::text(lines.join("\n")))
    }

    async fn set_status(
        &self,
        args: &Value,
        ctx: &ToolContext,
        state: &UserState,
    ) -> Result<ToolOutcome, ToolError> {
        let change = StatusChange {
            label: string_arg(args, &["label"]),
            pill_color: string_arg(args, &["pill_color", "pillColor"]),
            text_color: optional_arg(args, &["text_color", "textColor"]),
            reason: optional_arg(args, &["reason"]),
        };

        let updated = self
            .engine
            .update_status(state.clone(), change, ctx.now)
            .await
            .map_err(|e| ToolError::Failed {
                tool: "set_status",
                message: e.to_string(),
            })?;

        let reason_line = updated
            .status_reason
            .as_deref()
            .map(|r| format!("\nInner voice: {r}"))
            .unwrap_or_default();
        let output = format!(
            "Status updated: {} | pill {} | text {}{reason_line}",
            updated.status_label, updated.status_pill_color, updated.status_text_color
        );
        Ok(ToolOutcome::with_state(output, updated))
    }

    async fn update_intimacy(
        &self,
        args: &Value,
        ctx: &ToolContext,
        state: &UserState,
    ) -> Result<ToolOutcome, ToolError> {
        let delta = args
            .get("delta")
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f.trunc() as i64)))
            .ok_or(ToolError::InvalidArguments {
                tool: "update_intimacy",
                message: "delta must be an integer".to_string(),
            })? as i32;
        let reason = optional_arg(args, &["reason"]);

        let updated = self
            .engine
            .update_intimacy(state.clone(), delta, reason.as_deref(), ctx.now)
            .await
            .map_err(|e| ToolError::Failed {
                tool: "update_intimacy",
                message: e.to_string(),
            })?;

        let reason_line = reason
            .map(|r| format!("\nInner voice: {r}"))
            .unwrap_or_default();
        let output = format!("Relationship warmth is now {}{reason_line}", updated.intimacy);
        Ok(ToolOutcome::with_state(output, updated))
    }

    async fn remember_fact(&self, args: &Value, ctx: &ToolContext) -> Result<ToolOutcome, ToolError> {
        let content = sanitize_text(&string_arg(args, &["content"]));
        if content.is_empty() {
            return Ok(ToolOutcome::text("Nothing to remember -- the content was empty."));
        }

        let (fact, is_new) = self
            .facts
            .upsert(&ctx.user_id, &content, ctx.now)
            .await
            .map_err(|e| ToolError::Failed {
                tool: "remember_fact",
                message: e.to_string(),
            })?;

        let output = if is_new {
            format!("Noted: {}", fact.content)
        } else {
            format!("Updated: {}", fact.content)
        };
        Ok(ToolOutcome::text(output))
    }

    async fn forget_fact(&self, args: &Value, ctx: &ToolContext) -> Result<ToolOutcome, ToolError> {
        let fact_id = string_arg(args, &["fact_id", "factId"]);
        if fact_id.is_empty() {
            return Ok(ToolOutcome::text("No fact id given -- nothing crossed out."));
        }

        let removed = self
            .facts
            .forget(&ctx.user_id, &fact_id, ctx.now)
            .await
            .map_err(|e| ToolError::Failed {
                tool: "forget_fact",
                message: e.to_string(),
            })?;

        let output = if removed {
            format!("Crossed out: {fact_id}")
        } else {
            format!("Couldn't find: {fact_id}")
        };
        Ok(ToolOutcome::text(output))
    }
}

impl<C, D, S, F, E, H, W> super::runner::ToolExecutor for AgentToolbox<C, D, S, F, E, H, W>
where
    C: ConversationRepository,
    D: DiaryRepository,
    S: UserStateRepository,
    F: FactRepository,
    E: Embedder,
    H: HighlightStore,
    W: WebSearcher,
{
    async fn execute(
        &self,
        name: &str,
        arguments: &str,
        ctx: &ToolContext,
        state: &UserState,
    ) -> Result<ToolOutcome, ToolError> {
        AgentToolbox::execute(self, name, arguments, ctx, state).await
    }
}

fn string_arg(args: &Value, keys: &[&str]) -> String {
    for key in keys {
        if let Some(value) = args.get(*key).and_then(Value::as_str) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }
    String::new()
}

fn optional_arg(args: &Value, keys: &[&str]) -> Option<String> {
    let value = string_arg(args, keys);
    if value.is_empty() { None } else { Some(value) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_arg_tries_aliases() {
        let args = serde_json::json!({ "pillColor": "#fff" });
        assert_eq!(string_arg(&args, &["pill_color", "pillColor"]), "#fff");
        assert_eq!(string_arg(&args, &["missing"]), "");
    }

    #[test]
    fn test_optional_arg_filters_blank() {
        let args = serde_json::json!({ "reason": "  " });
        assert!(optional_arg(&args, &["reason"]).is_none());
    }
}
