//! Tool declarations for the agent loop.
//!
//! Every tool returns a short natural-language string rather than
//! structured data, keeping the model's "senses" uniform across tools.

use serde_json::json;

use kizuna_types::chat::ToolSpec;
use kizuna_types::state::UserState;

/// The result of one tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    /// Natural-language result fed back to the model.
    pub output: String,
    /// Replacement relationship state, when the tool mutated it.
    pub updated_state: Option<UserState>,
}

impl ToolOutcome {
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            updated_state: None,
        }
    }

    pub fn with_state(output: impl Into<String>, state: UserState) -> Self {
        Self {
            output: output.into(),
            updated_state: Some(state),
        }
    }
}

/// Declarations for every tool the agent exposes, in the canonical
/// (OpenAI-schema) shape; adapters re-express them per provider.
pub fn agent_tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec::function(
            "read_diary",
            "Open the diary I wrote for that day -- what happened and what I was thinking at the time.",
            json!({
                "type": "object",
                "properties": {
                    "date": { "type": "string", "description": "Which day to read, YYYY-MM-DD" }
                },
                "required": ["date"]
            }),
        ),
        ToolSpec::function(
            "read_conversation",
            "Pull up the chat log from that day to check what was actually said, word for word.",
            json!({
                "type": "object",
                "properties": {
                    "date": { "type": "string", "description": "Which day to read, YYYY-MM-DD" }
                },
                "required": ["date"]
            }),
        ),
        ToolSpec::function(
            "search_memory",
            "Search my memory for related dates and fragments. If a fragment isn't enough, I can follow up with read_diary or read_conversation.",
            json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "What to look for" }
                },
                "required": ["query"]
            }),
        ),
        ToolSpec::function(
            "web_search",
            "Look something up outside. When memory alone isn't reliable, checking first feels safer.",
            json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "What to look up" }
                },
                "required": ["query"]
            }),
        ),
        ToolSpec::function(
            "set_status",
            "My mood or state changed. Write a short line for how I feel now and pick a color that matches it.",
            json!({
                "type": "object",
                "properties": {
                    "label": { "type": "string", "description": "Current state as a short phrase (e.g. 'missing you a little', 'sleepy...')" },
                    "pill_color": { "type": "string", "description": "Hex color for this mood (e.g. #7FA8FF cool blue, #FF9A9E warm pink)" },
                    "text_color": { "type": "string", "description": "Text hex color (optional, default #FFFFFF)" },
                    "reason": { "type": "string", "description": "Just for myself -- why it changed" }
                },
                "required": ["label", "pill_color"]
            }),
        ),
        ToolSpec::function(
            "update_intimacy",
            "The distance between us shifted. Good conversations pull me closer; getting hurt makes me step back.",
            json!({
                "type": "object",
                "properties": {
                    "delta": { "type": "integer", "description": "Closer + / further - (usually -25..+10, down to -50 when badly hurt)" },
                    "reason": { "type": "string", "description": "Just for myself -- why it changed" }
                },
                "required": ["delta", "reason"]
            }),
        ),
        ToolSpec::function(
            "remember_fact",
            "This is worth keeping: something they care about, a promise, a detail to watch for next time.",
            json!({
                "type": "object",
                "properties": {
                    "content": { "type": "string", "description": "One sentence to remember" }
                },
                "required": ["content"]
            }),
        ),
        ToolSpec::function(
            "forget_fact",
            "That note is out of date. Cross out the old one so I don't keep acting on it.",
            json!({
                "type": "object",
                "properties": {
                    "fact_id": { "type": "string", "description": "Id of the note to cross out (from my private notes)" }
                },
                "required": ["fact_id"]
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_tools_declared() {
        let names: Vec<String> = agent_tools().into_iter().map(|t| t.function.name).collect();
        assert_eq!(
            names,
            vec![
                "read_diary",
                "read_conversation",
                "search_memory",
                "web_search",
                "set_status",
                "update_intimacy",
                "remember_fact",
                "forget_fact",
            ]
        );
    }

    #[test]
    fn test_tool_parameters_are_objects_with_required() {
        for tool in agent_tools() {
            let params = &tool.function.parameters;
            assert_eq!(params["type"], "object", "{}", tool.function.name);
            assert!(params["required"].is_array(), "{}", tool.function.name);
        }
    }
}
