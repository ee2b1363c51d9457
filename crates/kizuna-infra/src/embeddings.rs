//! OpenAI-compatible embeddings client.
//!
//! Implements the `Embedder` port against any endpoint speaking the
//! `/embeddings` shape. An unconfigured client still constructs -- the
//! memory tools degrade to a safe string when `embed` reports the missing
//! configuration at call time.

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;

use kizuna_core::memory::embedder::Embedder;
use kizuna_types::error::RepositoryError;
use kizuna_types::settings::EmbeddingsSettings;

use crate::llm::{http_client, join_url};

const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

struct EmbedderEndpoint {
    api_url: String,
    api_key: SecretString,
    model: String,
}

// No Debug derive: the client must never leak the API key through logs.
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: Option<EmbedderEndpoint>,
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

impl HttpEmbedder {
    pub fn from_settings(settings: &EmbeddingsSettings) -> Self {
        let api_url = settings.api_url.trim();
        let api_key = settings.api_key.trim();
        let model = settings.model.trim();

        let endpoint = (!api_url.is_empty() && !api_key.is_empty() && !model.is_empty()).then(|| {
            EmbedderEndpoint {
                api_url: api_url.to_string(),
                api_key: SecretString::from(api_key),
                model: model.to_string(),
            }
        });

        Self {
            client: http_client(),
            endpoint,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }
}

impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RepositoryError> {
        let Some(endpoint) = &self.endpoint else {
            return Err(RepositoryError::Query("missing embeddings configuration".to_string()));
        };
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let response = self
            .client
            .post(join_url(&endpoint.api_url, "embeddings"))
            .bearer_auth(endpoint.api_key.expose_secret())
            .json(&EmbeddingsRequest {
                model: &endpoint.model,
                input: texts,
            })
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| RepositoryError::Query(format!("embeddings request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RepositoryError::Query(format!(
                "embeddings API error: {status} {}",
                text.chars().take(200).collect::<String>()
            )));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| RepositoryError::Query(format!("embeddings decode failed: {e}")))?;

        let items = data["data"]
            .as_array()
            .ok_or_else(|| RepositoryError::Query("invalid embeddings response".to_string()))?;

        let mut vectors = Vec::with_capacity(items.len());
        for item in items {
            let embedding = item["embedding"]
                .as_array()
                .ok_or_else(|| RepositoryError::Query("invalid embeddings response".to_string()))?
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect();
            vectors.push(embedding);
        }
        if vectors.len() != texts.len() {
            return Err(RepositoryError::Query(format!(
                "embeddings count mismatch: sent {}, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }

    fn model_name(&self) -> &str {
        self.endpoint.as_ref().map_or("unconfigured", |e| e.model.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_constructs_but_reports() {
        let embedder = HttpEmbedder::from_settings(&EmbeddingsSettings::default());
        assert!(!embedder.is_configured());
        assert_eq!(embedder.model_name(), "unconfigured");
    }

    #[tokio::test]
    async fn test_unconfigured_embed_errors_at_call_time() {
        let embedder = HttpEmbedder::from_settings(&EmbeddingsSettings::default());
        let err = embedder.embed(&["hello".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("missing embeddings configuration"));
    }

    #[test]
    fn test_configured_from_settings() {
        let settings = EmbeddingsSettings {
            api_url: "https://api.example".to_string(),
            api_key: "key".to_string(),
            model: "text-embedding-3-small".to_string(),
        };
        let embedder = HttpEmbedder::from_settings(&settings);
        assert!(embedder.is_configured());
        assert_eq!(embedder.model_name(), "text-embedding-3-small");
    }
}
