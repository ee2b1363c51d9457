//! ChatProvider trait definition.
//!
//! This is the core abstraction every upstream LLM protocol adapter
//! implements. Uses native async fn in traits (RPITIT, Rust 2024 edition);
//! the object-safe wrapper lives in [`super::box_provider`].

use kizuna_types::llm::{ChatExchange, ChatRequest, ProviderError};

/// Trait for upstream chat protocol adapters (OpenAI, Anthropic, Gemini).
///
/// Inputs are always the canonical IR regardless of the target wire
/// protocol. Implementations live in kizuna-infra and are selected once
/// at the call boundary from the configured [`ApiFormat`].
///
/// Adapters never retry internally -- retry policy belongs to the caller.
///
/// [`ApiFormat`]: kizuna_types::llm::ApiFormat
pub trait ChatProvider: Send + Sync {
    /// Wire protocol name ("openai", "anthropic", "gemini").
    fn name(&self) -> &'static str;

    /// Send one completion round trip and normalize the response back
    /// into the canonical shape.
    fn send(
        &self,
        request: &ChatRequest,
    ) -> impl std::future::Future<Output = Result<ChatExchange, ProviderError>> + Send;
}
