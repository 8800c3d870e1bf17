use std::time::Duration;

use crate::config::AiSettings;

use super::{LlmClient, LlmConfig, LlmError};

pub const PROVIDER_GROQ: &str = "groq";
const DEFAULT_GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Builds the client for the configured provider.
pub fn build_client(settings: &AiSettings) -> Result<LlmClient, LlmError> {
    let provider = settings.provider.trim().to_lowercase();
    let provider = if provider.is_empty() {
        PROVIDER_GROQ.to_string()
    } else {
        provider
    };

    match provider.as_str() {
        PROVIDER_GROQ => {
            let base_url = normalize_base_url(&settings.base_url)
                .unwrap_or_else(|| DEFAULT_GROQ_BASE_URL.to_string());
            LlmClient::new(LlmConfig {
                provider,
                base_url,
                api_key: settings.api_key.clone(),
                model: settings.model.clone(),
                timeout: Duration::from_secs(settings.timeout_secs),
                max_retries: settings.max_retries,
            })
        }
        _ => Err(LlmError::UnsupportedProvider(provider)),
    }
}

/// Accepts either the full endpoint or the API root and returns the endpoint.
/// `None` for a blank input.
pub fn normalize_base_url(value: &str) -> Option<String> {
    let trimmed = value.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.ends_with("/chat/completions") {
        return Some(trimmed.to_string());
    }
    if trimmed.ends_with("/openai/v1") || trimmed.ends_with("/v1") {
        return Some(format!("{trimmed}/chat/completions"));
    }
    Some(trimmed.to_string())
}
