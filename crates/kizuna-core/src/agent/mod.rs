//! The tool-calling agent: prompt composition, history assembly, tool
//! execution, the bounded loop, and the chat turn service.

pub mod history;
pub mod prompt;
pub mod runner;
pub mod service;
pub mod toolbox;
pub mod tools;

pub use runner::{EXHAUSTED_REPLY, FALLBACK_REPLY, LoopConfig, LoopOutcome, MAX_AGENT_LOOPS, run_tool_loop};
pub use service::{ChatInput, ChatOutput, ChatService};
pub use toolbox::{AgentToolbox, ToolContext};
pub use tools::{ToolOutcome, agent_tools};
