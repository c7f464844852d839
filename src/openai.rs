//! OpenAI client configuration.

use crate::config::InferenceSettings;
use crate::error::{Result, WarechatError};
use async_openai::{config::OpenAIConfig, Client};
use std::time::Duration;

/// Create a client for the configured OpenAI-compatible endpoint.
///
/// The API key is read from the environment variable named in settings;
/// the HTTP timeout matches the inference timeout.
pub fn create_client(settings: &InferenceSettings) -> Result<Client<OpenAIConfig>> {
    let mut config = OpenAIConfig::new();
    if let Ok(key) = std::env::var(&settings.api_key_env) {
        config = config.with_api_key(key);
    }
    if let Some(base) = &settings.api_base {
        config = config.with_api_base(base);
    }

    create_client_with_timeout(config, Duration::from_secs(settings.timeout_secs))
}

/// Create a client with a custom configuration and timeout.
pub fn create_client_with_timeout(
    config: OpenAIConfig,
    timeout: Duration,
) -> Result<Client<OpenAIConfig>> {
    let http_client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| WarechatError::Config(format!("Failed to create HTTP client: {}", e)))?;

    Ok(Client::with_config(config).with_http_client(http_client))
}

/// Check if the inference API key is configured.
pub fn is_api_key_configured(settings: &InferenceSettings) -> bool {
    std::env::var(&settings.api_key_env).is_ok_and(|v| !v.is_empty())
}
