//! The bounded tool-calling loop.
//!
//! State machine: `Compose -> Call -> (ToolExec)* -> Final`, bounded to
//! [`MAX_AGENT_LOOPS`] round trips. The loop never returns an error to its
//! caller: adapter failures and loop exhaustion both degrade to fixed
//! fallback replies, and tool failures become safe string results.

use std::time::Duration;

use tracing::{info, warn};

use kizuna_types::chat::ChatMessage;
use kizuna_types::error::ToolError;
use kizuna_types::llm::ChatRequest;
use kizuna_types::state::UserState;

use crate::llm::box_provider::BoxChatProvider;
use crate::llm::traced_send;

use super::toolbox::ToolContext;
use super::tools::{ToolOutcome, agent_tools};

/// Maximum provider round trips per conversation turn.
pub const MAX_AGENT_LOOPS: usize = 5;

/// Returned when a completed round trip produced no usable text.
pub const FALLBACK_REPLY: &str =
    "Mm... I froze up for a second. Can we pick this up in a moment?";

/// Returned when the loop exhausts its round trips, or the provider
/// fails mid-turn (both abort to the same fixed string).
pub const EXHAUSTED_REPLY: &str =
    "Sorry, I'm a little slow today. Could you say that once more?";

/// Object implementing tool execution for the loop.
///
/// [`AgentToolbox`](super::toolbox::AgentToolbox) is the production
/// implementation; tests plug in fakes.
pub trait ToolExecutor: Send + Sync {
    fn execute(
        &self,
        name: &str,
        arguments: &str,
        ctx: &ToolContext,
        state: &UserState,
    ) -> impl std::future::Future<Output = Result<ToolOutcome, ToolError>> + Send;
}

/// Request parameters held constant across loop iterations.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout: Duration,
}

/// What a finished loop hands back: the reply text and the relationship
/// state as the last tool call left it.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub reply: String,
    pub state: UserState,
}

/// Drive the loop to completion.
///
/// `messages[0]` must be the system turn; it is rebuilt from the current
/// state via `rebuild_prompt` before every provider call so tool-driven
/// state changes are visible to the model on the very next round trip.
pub async fn run_tool_loop<T>(
    provider: &BoxChatProvider,
    executor: &T,
    ctx: &ToolContext,
    config: &LoopConfig,
    rebuild_prompt: impl Fn(&UserState) -> String,
    mut messages: Vec<ChatMessage>,
    mut state: UserState,
) -> LoopOutcome
where
    T: ToolExecutor,
{
    let tools = agent_tools();

    for _round in 0..MAX_AGENT_LOOPS {
        if messages.is_empty() {
            messages.push(ChatMessage::system(String::new()));
        }
        messages[0] = ChatMessage::system(rebuild_prompt(&state));

        let request = ChatRequest::new(config.model.clone(), messages.clone())
            .with_tools(tools.clone())
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens)
            .with_timeout(config.timeout);

        let exchange = match traced_send(provider, &request, "agent", Some(&ctx.user_id)).await {
            Ok(exchange) => exchange,
            Err(err) => {
                // No internal retry: abort straight to the same fallback
                // the exhausted loop uses.
                warn!(user_id = %ctx.user_id, error = %err, "agent turn aborted on provider error");
                return LoopOutcome {
                    reply: EXHAUSTED_REPLY.to_string(),
                    state,
                };
            }
        };

        let reply = exchange.message;
        if !reply.has_tool_calls() {
            let text = reply.text().map(str::to_string);
            return LoopOutcome {
                reply: text.unwrap_or_else(|| FALLBACK_REPLY.to_string()),
                state,
            };
        }

        messages.push(ChatMessage::assistant_tool_calls(
            reply.content.clone(),
            reply.tool_calls.clone(),
        ));

        // Tools run synchronously in call order -- results must round-trip
        // back to the model in the order it asked for them.
        for call in &reply.tool_calls {
            let name = call.function.name.as_str();
            info!(
                event = "tool_call",
                user_id = %ctx.user_id,
                tool_call_id = %call.id,
                tool = name,
                arguments = %call.function.arguments,
                "executing tool"
            );
            let started = std::time::Instant::now();

            let outcome = match executor
                .execute(name, &call.function.arguments, ctx, &state)
                .await
            {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(
                        user_id = %ctx.user_id,
                        tool = name,
                        error = %err,
                        "tool failed, degrading to string result"
                    );
                    ToolOutcome::text(err.user_message())
                }
            };

            if let Some(updated) = outcome.updated_state {
                state = updated;
            }
            info!(
                event = "tool_result",
                user_id = %ctx.user_id,
                tool_call_id = %call.id,
                tool = name,
                duration_ms = started.elapsed().as_millis() as u64,
                output = %outcome.output,
                "tool finished"
            );
            messages.push(ChatMessage::tool_result(&call.id, name, outcome.output));
        }
    }

    LoopOutcome {
        reply: EXHAUSTED_REPLY.to_string(),
        state,
    }
}
