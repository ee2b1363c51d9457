//! Web search port.

use kizuna_types::error::ToolError;

/// One external search result, already truncated for prompt use.
#[derive(Debug, Clone)]
pub struct SearchItem {
    pub title: String,
    pub snippet: String,
}

/// Trait for external web search backends.
pub trait WebSearcher: Send + Sync {
    fn search(
        &self,
        query: &str,
    ) -> impl std::future::Future<Output = Result<Vec<SearchItem>, ToolError>> + Send;
}
