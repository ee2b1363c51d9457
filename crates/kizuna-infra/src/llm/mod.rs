//! Upstream chat protocol adapters.
//!
//! One [`ChatProvider`] implementation per wire protocol, selected once
//! at the call boundary by [`build_provider`]. All three share the same
//! reqwest timeout handling and the same error taxonomy; the uniform
//! request/response telemetry lives in `kizuna_core::llm::traced_send`.
//!
//! [`ChatProvider`]: kizuna_core::llm::provider::ChatProvider

pub mod anthropic;
pub mod gemini;
pub mod media;
pub mod openai;

use kizuna_core::llm::box_provider::BoxChatProvider;
use kizuna_types::llm::{ApiFormat, ProviderError};
use kizuna_types::settings::ProviderSettings;

use self::media::MediaResolver;

/// Join a base URL and a suffix, normalizing slashes.
pub(crate) fn join_url(base: &str, suffix: &str) -> String {
    format!(
        "{}/{}",
        base.trim().trim_end_matches('/'),
        suffix.trim().trim_start_matches('/')
    )
}

/// Append the protocol's API version segment to a bare base URL.
pub(crate) fn versioned_url(base: &str, format: ApiFormat) -> String {
    match format {
        ApiFormat::Gemini => join_url(base, "v1beta"),
        _ => join_url(base, "v1"),
    }
}

/// Shared HTTP client: no global timeout, every request carries its own.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .build()
        .expect("failed to create reqwest client")
}

/// Map a reqwest send error into the provider taxonomy.
pub(crate) fn transport_error(provider: &'static str, timeout_ms: u64, err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout { provider, timeout_ms }
    } else {
        ProviderError::Transport {
            provider,
            message: err.to_string(),
        }
    }
}

/// Validate configuration and construct the adapter for the configured
/// wire protocol. Raised eagerly, before any network call.
pub fn build_provider(settings: &ProviderSettings) -> Result<BoxChatProvider, ProviderError> {
    let api_url = settings.api_url.trim();
    let api_key = settings.api_key.trim();
    if api_url.is_empty() {
        return Err(ProviderError::MissingConfig("provider.api_url".to_string()));
    }
    if api_key.is_empty() {
        return Err(ProviderError::MissingConfig("provider.api_key".to_string()));
    }
    if settings.model.trim().is_empty() {
        return Err(ProviderError::MissingConfig("provider.model".to_string()));
    }

    let resolver = if settings.media_root.trim().is_empty() {
        MediaResolver::data_urls_only()
    } else {
        MediaResolver::new(settings.media_root.trim())
    };

    Ok(match settings.api_format {
        ApiFormat::OpenAi => BoxChatProvider::new(openai::OpenAiProvider::new(api_url, api_key)),
        ApiFormat::Anthropic => BoxChatProvider::new(anthropic::AnthropicProvider::new(
            api_url,
            api_key,
            settings.provider_version.clone(),
            resolver,
        )),
        ApiFormat::Gemini => {
            BoxChatProvider::new(gemini::GeminiProvider::new(api_url, api_key, resolver))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url_normalizes_slashes() {
        assert_eq!(join_url("https://a.example/", "/v1"), "https://a.example/v1");
        assert_eq!(join_url("https://a.example", "v1"), "https://a.example/v1");
    }

    #[test]
    fn test_versioned_url_per_format() {
        assert_eq!(versioned_url("https://x", ApiFormat::OpenAi), "https://x/v1");
        assert_eq!(versioned_url("https://x", ApiFormat::Anthropic), "https://x/v1");
        assert_eq!(versioned_url("https://x", ApiFormat::Gemini), "https://x/v1beta");
    }

    #[test]
    fn test_build_provider_validates_eagerly() {
        let mut settings = ProviderSettings::default();
        settings.api_key = "key".to_string();
        let err = build_provider(&settings).err().unwrap();
        assert!(matches!(err, ProviderError::MissingConfig(ref what) if what.contains("api_url")));

        settings.api_url = "https://api.example".to_string();
        settings.api_key = String::new();
        let err = build_provider(&settings).err().unwrap();
        assert!(matches!(err, ProviderError::MissingConfig(ref what) if what.contains("api_key")));
    }

    #[test]
    fn test_build_provider_selects_by_format() {
        let mut settings = ProviderSettings::default();
        settings.api_url = "https://api.example".to_string();
        settings.api_key = "key".to_string();

        for (format, name) in [
            (ApiFormat::OpenAi, "openai"),
            (ApiFormat::Anthropic, "anthropic"),
            (ApiFormat::Gemini, "gemini"),
        ] {
            settings.api_format = format;
            let provider = build_provider(&settings).unwrap();
            assert_eq!(provider.name(), name);
        }
    }
}
