//! Tavily web search client.
//!
//! Implements the `WebSearcher` port. Results are truncated for prompt
//! use before they leave this module; missing configuration maps to
//! `ToolError::NotConfigured` so the agent can answer gracefully.

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;

use kizuna_core::search::{SearchItem, WebSearcher};
use kizuna_types::error::ToolError;
use kizuna_types::settings::WebSearchSettings;

use crate::llm::http_client;

const SEARCH_URL: &str = "https://api.tavily.com/search";
const TITLE_MAX_CHARS: usize = 80;
const SNIPPET_MAX_CHARS: usize = 220;

// No Debug derive: the client must never leak the API key through logs.
pub struct TavilySearcher {
    client: reqwest::Client,
    api_key: Option<SecretString>,
    max_results: usize,
    timeout: std::time::Duration,
}

#[derive(Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    search_depth: &'static str,
    max_results: usize,
    include_answer: bool,
    include_raw_content: bool,
    include_images: bool,
}

impl TavilySearcher {
    pub fn from_settings(settings: &WebSearchSettings) -> Self {
        let api_key = settings.api_key.trim();
        Self {
            client: http_client(),
            api_key: (!api_key.is_empty()).then(|| SecretString::from(api_key)),
            max_results: settings.max_results.clamp(1, 8),
            timeout: std::time::Duration::from_millis(settings.timeout_ms.clamp(3_000, 30_000)),
        }
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let cut: String = collapsed.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}\u{2026}", cut.trim_end())
}

fn parse_results(data: &Value, max_results: usize) -> Vec<SearchItem> {
    data["results"]
        .as_array()
        .map(|results| {
            results
                .iter()
                .filter_map(|item| {
                    let title = truncate(item["title"].as_str().unwrap_or(""), TITLE_MAX_CHARS);
                    let snippet = truncate(item["content"].as_str().unwrap_or(""), SNIPPET_MAX_CHARS);
                    if title.is_empty() && snippet.is_empty() {
                        return None;
                    }
                    Some(SearchItem { title, snippet })
                })
                .take(max_results)
                .collect()
        })
        .unwrap_or_default()
}

impl WebSearcher for TavilySearcher {
    async fn search(&self, query: &str) -> Result<Vec<SearchItem>, ToolError> {
        let Some(api_key) = &self.api_key else {
            return Err(ToolError::NotConfigured {
                tool: "web_search",
                message: "search API key missing".to_string(),
            });
        };
        let query = query.trim();
        if query.is_empty() {
            return Ok(vec![]);
        }

        let body = TavilyRequest {
            query,
            search_depth: "basic",
            max_results: self.max_results,
            include_answer: false,
            include_raw_content: false,
            include_images: false,
        };

        let response = self
            .client
            .post(SEARCH_URL)
            .bearer_auth(api_key.expose_secret())
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ToolError::Failed {
                tool: "web_search",
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ToolError::Failed {
                tool: "web_search",
                message: format!("search API error: {status} {}", truncate(&text, 200)),
            });
        }

        let data: Value = response.json().await.map_err(|e| ToolError::Failed {
            tool: "web_search",
            message: e.to_string(),
        })?;
        Ok(parse_results(&data, self.max_results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truncate_collapses_whitespace() {
        assert_eq!(truncate("a   b\n\nc", 100), "a b c");
        let long = "word ".repeat(100);
        assert!(truncate(&long, 50).chars().count() <= 50);
    }

    #[test]
    fn test_parse_results_filters_and_caps() {
        let data = json!({
            "results": [
                { "title": "First", "content": "about the sea" },
                { "title": "", "content": "" },
                { "title": "Second", "content": "about tea" },
                { "title": "Third", "content": "dropped by cap" }
            ]
        });
        let items = parse_results(&data, 2);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "First");
        assert_eq!(items[1].snippet, "about tea");
    }

    #[tokio::test]
    async fn test_missing_key_is_not_configured() {
        let searcher = TavilySearcher::from_settings(&WebSearchSettings::default());
        let err = searcher.search("anything").await.unwrap_err();
        assert!(matches!(err, ToolError::NotConfigured { .. }));
    }
}
