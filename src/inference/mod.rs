//! Inference gateway to a generative model.
//!
//! Requests carry an assembled [`Context`] and an effective configuration;
//! results carry the answer text and token usage when the service reports it.

mod openai;

pub use openai::OpenAIGateway;

use crate::config::InferenceSettings;
use crate::context::Context;
use crate::error::{Result, WarechatError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Effective inference parameters for one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl InferenceConfig {
    /// Defaults from settings.
    pub fn from_settings(settings: &InferenceSettings) -> Self {
        Self {
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            top_p: settings.top_p,
        }
    }

    /// Apply caller overrides, rejecting out-of-range values.
    pub fn apply(&self, overrides: &InferenceOverrides) -> Result<Self> {
        let config = Self {
            model: overrides
                .model
                .clone()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| self.model.clone()),
            max_tokens: overrides.max_tokens.unwrap_or(self.max_tokens),
            temperature: overrides.temperature.unwrap_or(self.temperature),
            top_p: overrides.top_p.unwrap_or(self.top_p),
        };

        if config.max_tokens == 0 {
            return Err(WarechatError::InvalidInput("maxTokens must be positive".to_string()));
        }
        if !(0.0..=2.0).contains(&config.temperature) {
            return Err(WarechatError::InvalidInput(format!(
                "temperature {} outside [0, 2]",
                config.temperature
            )));
        }
        if !(config.top_p > 0.0 && config.top_p <= 1.0) {
            return Err(WarechatError::InvalidInput(format!(
                "topP {} outside (0, 1]",
                config.top_p
            )));
        }
        Ok(config)
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self::from_settings(&InferenceSettings::default())
    }
}

/// Per-request inference parameters; unset fields fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InferenceOverrides {
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
}

/// One inference call.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub context: Context,
    pub config: InferenceConfig,
}

/// Token accounting reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

/// A normalized inference answer.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceResult {
    pub answer: String,
    pub usage: Option<Usage>,
    /// Model that produced the answer, as reported by the service.
    pub model: String,
    pub finish_reason: Option<String>,
}

/// Trait for inference backends.
///
/// Implementations never retry: a failed call surfaces as
/// `InferenceService`, and a successful call without answer text as
/// `EmptyInferenceResponse`.
#[async_trait]
pub trait InferenceGateway: Send + Sync {
    async fn infer(&self, request: &InferenceRequest) -> Result<InferenceResult>;
}
