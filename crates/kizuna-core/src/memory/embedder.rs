//! Embedder trait for text-to-vector conversion.
//!
//! Implementations (e.g. an OpenAI-compatible embeddings endpoint) live
//! in kizuna-infra.

use kizuna_types::error::RepositoryError;

/// Trait for converting text into embedding vectors.
pub trait Embedder: Send + Sync {
    /// Embed one or more texts into vectors; one vector per input text.
    fn embed(
        &self,
        texts: &[String],
    ) -> impl std::future::Future<Output = Result<Vec<Vec<f32>>, RepositoryError>> + Send;

    /// The model name used for embeddings.
    fn model_name(&self) -> &str;
}
