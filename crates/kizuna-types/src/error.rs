use thiserror::Error;

/// Errors from repository operations (used by trait definitions in kizuna-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors from tool handlers inside the agent loop.
///
/// Tool failures never abort a conversation turn: the loop boundary calls
/// [`ToolError::user_message`] and feeds the string back to the model as
/// the tool result.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: '{0}'")]
    UnknownTool(String),

    #[error("invalid arguments for {tool}: {message}")]
    InvalidArguments { tool: &'static str, message: String },

    #[error("{tool} failed: {message}")]
    Failed { tool: &'static str, message: String },

    #[error("{tool} is not configured: {message}")]
    NotConfigured { tool: &'static str, message: String },
}

impl ToolError {
    /// Safe natural-language result returned to the model in place of the
    /// tool output. Never includes internal error details.
    pub fn user_message(&self) -> String {
        match self {
            ToolError::UnknownTool(_) => "I don't have a tool with that name.".to_string(),
            ToolError::InvalidArguments { tool, message } => {
                format!("I couldn't use {tool} that way: {message}")
            }
            ToolError::Failed { tool, .. } => {
                format!("Something went wrong while running {tool}.")
            }
            ToolError::NotConfigured { tool, .. } => {
                format!("{tool} isn't available right now.")
            }
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {message}")]
    Io { path: String, message: String },

    #[error("cannot parse config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid config value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}
