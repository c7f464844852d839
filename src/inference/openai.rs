//! OpenAI-compatible chat completions backend.

use super::{InferenceGateway, InferenceRequest, InferenceResult, Usage};
use crate::config::InferenceSettings;
use crate::context::Context;
use crate::conversation::Role;
use crate::error::{Result, WarechatError};
use crate::openai::create_client;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Inference gateway over the OpenAI chat completions API.
pub struct OpenAIGateway {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    timeout: Duration,
}

impl OpenAIGateway {
    /// Create a gateway from settings.
    pub fn new(settings: &InferenceSettings) -> Result<Self> {
        Ok(Self::with_client(
            create_client(settings)?,
            Duration::from_secs(settings.timeout_secs),
        ))
    }

    /// Create a gateway around an existing client.
    pub fn with_client(
        client: async_openai::Client<async_openai::config::OpenAIConfig>,
        timeout: Duration,
    ) -> Self {
        Self { client, timeout }
    }
}

fn request_error(e: impl std::fmt::Display) -> WarechatError {
    WarechatError::InferenceService(format!("Failed to build request: {}", e))
}

/// System prompt, prior turns, then the new question under its heading as
/// the last user message.
fn build_messages(context: &Context) -> Result<Vec<ChatCompletionRequestMessage>> {
    let mut messages: Vec<ChatCompletionRequestMessage> = vec![
        ChatCompletionRequestSystemMessageArgs::default()
            .content(context.system.clone())
            .build()
            .map_err(request_error)?
            .into(),
    ];

    for turn in &context.history {
        let message: ChatCompletionRequestMessage = match turn.role {
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(turn.text.clone())
                .build()
                .map_err(request_error)?
                .into(),
            Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(turn.text.clone())
                .build()
                .map_err(request_error)?
                .into(),
        };
        messages.push(message);
    }

    messages.push(
        ChatCompletionRequestUserMessageArgs::default()
            .content(context.question_block())
            .build()
            .map_err(request_error)?
            .into(),
    );

    Ok(messages)
}

/// Extract the answer, treating a missing or blank answer as its own failure.
fn normalize_response(response: CreateChatCompletionResponse) -> Result<InferenceResult> {
    let usage = response.usage.as_ref().map(|u| Usage {
        input_tokens: u.prompt_tokens,
        output_tokens: u.completion_tokens,
        total_tokens: u.total_tokens,
    });

    let choice = response.choices.into_iter().next().ok_or_else(|| {
        WarechatError::EmptyInferenceResponse("response contained no choices".to_string())
    })?;

    let finish_reason = choice
        .finish_reason
        .and_then(|r| serde_json::to_value(r).ok())
        .and_then(|v| v.as_str().map(str::to_string));

    let answer = choice
        .message
        .content
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| {
            WarechatError::EmptyInferenceResponse(format!(
                "model returned no answer text (finish reason: {})",
                finish_reason.as_deref().unwrap_or("unknown")
            ))
        })?;

    Ok(InferenceResult {
        answer,
        usage,
        model: response.model,
        finish_reason,
    })
}

#[async_trait]
impl InferenceGateway for OpenAIGateway {
    #[instrument(skip(self, request), fields(model = %request.config.model))]
    async fn infer(&self, request: &InferenceRequest) -> Result<InferenceResult> {
        let messages = build_messages(&request.context)?;
        debug!("Sending {} messages to inference service", messages.len());

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&request.config.model)
            .messages(messages)
            .max_tokens(request.config.max_tokens)
            .temperature(request.config.temperature)
            .top_p(request.config.top_p)
            .build()
            .map_err(request_error)?;

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(chat_request))
            .await
            .map_err(|_| {
                WarechatError::InferenceService(format!(
                    "inference timed out after {:?}",
                    self.timeout
                ))
            })?
            .map_err(|e| WarechatError::InferenceService(format!("Failed to generate response: {}", e)))?;

        let result = normalize_response(response)?;
        info!("Inference answer received: {} characters", result.answer.len());
        Ok(result)
    }
}
