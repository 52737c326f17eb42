//! Provider construction from configuration.

use std::time::Duration;

use adbpilot_config::AppConfig;
use adbpilot_core::error::ProviderError;
use tracing::debug;

use crate::openai_compat::OpenAiCompatProvider;

/// Build the configured provider.
///
/// Known provider names pick their hosted endpoint; `api_url` always
/// wins when set. Every provider except `ollama` needs an API key.
pub fn build_from_config(config: &AppConfig) -> Result<OpenAiCompatProvider, ProviderError> {
    let name = config.provider.trim().to_lowercase();
    let api_key = config.api_key.clone().filter(|k| !k.trim().is_empty());

    let provider = match (name.as_str(), api_key) {
        ("ollama", _) => OpenAiCompatProvider::ollama(config.api_url.as_deref()),
        (_, None) => {
            return Err(ProviderError::NotConfigured(format!(
                "no API key for provider '{name}' (set api_key in the config file or ADBPILOT_API_KEY)"
            )));
        }
        (_, Some(key)) => match (config.api_url.as_deref(), name.as_str()) {
            (Some(url), _) => OpenAiCompatProvider::new(name.clone(), url, key),
            (None, "gemini") => OpenAiCompatProvider::gemini(key),
            (None, "openai") => OpenAiCompatProvider::openai(key),
            (None, "openrouter") => OpenAiCompatProvider::openrouter(key),
            (None, other) => {
                return Err(ProviderError::NotConfigured(format!(
                    "unknown provider '{other}' requires api_url"
                )));
            }
        },
    };

    debug!(provider = %name, base_url = %provider.base_url(), "Provider configured");

    Ok(provider
        .with_timeout(Duration::from_secs(config.request_timeout_secs))
        .with_image_history(config.agent.image_history))
}
