//! HTTP chat API.
//!
//! Exposes the chat pipeline for dashboards and other systems.

use crate::chunk::ChunkKey;
use crate::cli::preflight;
use crate::cli::Output;
use crate::config::Settings;
use crate::conversation::{Role, Turn};
use crate::error::{ErrorKind, WarechatError};
use crate::inference::{InferenceConfig, InferenceOverrides};
use crate::orchestrator::{ChatFailure, ChatOrchestrator, ChatReply, ChatRequest};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Route of the chat endpoint.
pub const CHAT_ROUTE: &str =
    "/api/v1/warehouses/{warehouse_id}/cameras/{cam_id}/chunks/{chunk_id}/chat";

/// Format of `chatLastTime`.
const LAST_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Shared application state.
struct AppState {
    orchestrator: ChatOrchestrator,
}

/// Run the HTTP API server.
pub async fn run_serve(host: Option<String>, port: Option<u16>, settings: Settings) -> anyhow::Result<()> {
    if let Err(e) = preflight::check(&settings) {
        Output::warning(&format!("{}", e));
    }

    let orchestrator = ChatOrchestrator::from_settings(&settings)?;
    let state = Arc::new(AppState { orchestrator });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route(CHAT_ROUTE, post(chat))
        .layer(cors)
        .with_state(state);

    let host = host.unwrap_or_else(|| settings.server.host.clone());
    let port = port.unwrap_or(settings.server.port);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("Warechat API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET  /health");
    Output::kv("Chat", &format!("POST {}", CHAT_ROUTE));
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    info!("Serving chat API on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// === Request/Response Types ===

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct MessageContent {
    text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct ConversationMessage {
    role: String,
    content: Vec<MessageContent>,
}

impl ConversationMessage {
    fn from_turn(turn: &Turn) -> Self {
        Self {
            role: turn.role.as_str().to_string(),
            content: vec![MessageContent {
                text: turn.text.clone(),
            }],
        }
    }

    fn into_turn(self) -> Result<Turn, WarechatError> {
        let role: Role = self.role.parse().map_err(WarechatError::InvalidInput)?;
        let text = self
            .content
            .into_iter()
            .map(|c| c.text)
            .collect::<Vec<_>>()
            .join("\n");
        Ok(match role {
            Role::User => Turn::user(text),
            Role::Assistant => Turn::assistant(text),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatBody {
    #[serde(rename = "UserQuery")]
    user_query: String,
    #[serde(default)]
    model_id: Option<String>,
    #[serde(default)]
    conversation: Vec<ConversationMessage>,
    #[serde(default)]
    inference_config: InferenceOverrides,
    #[serde(default)]
    chat_transaction_id: Option<String>,
}

impl ChatBody {
    fn into_request(self, chunk: ChunkKey) -> Result<ChatRequest, WarechatError> {
        let conversation = self
            .conversation
            .into_iter()
            .map(ConversationMessage::into_turn)
            .collect::<Result<Vec<_>, _>>()?;

        let mut inference = self.inference_config;
        if self.model_id.is_some() {
            inference.model = self.model_id;
        }

        let mut request = ChatRequest::new(chunk, self.user_query);
        request.transaction_id = self.chat_transaction_id;
        request.conversation = conversation;
        request.inference = inference;
        Ok(request)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatResponse {
    conversation: Vec<ConversationMessage>,
    chat_last_time: String,
    chat_transaction_id: String,
    model_id: String,
    inference_config: InferenceConfig,
    answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<crate::inference::Usage>,
    partial_transcript: bool,
}

impl From<ChatReply> for ChatResponse {
    fn from(reply: ChatReply) -> Self {
        Self {
            conversation: reply.conversation.iter().map(ConversationMessage::from_turn).collect(),
            chat_last_time: reply
                .answered_at
                .with_timezone(&chrono::Local)
                .format(LAST_TIME_FORMAT)
                .to_string(),
            chat_transaction_id: reply.transaction_id.to_string(),
            model_id: reply.model,
            inference_config: reply.inference,
            answer: reply.answer,
            usage: reply.usage,
            partial_transcript: reply.partial_transcript,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    kind: String,
    message: String,
    chat_transaction_id: Option<String>,
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ChunkNotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidInput => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: &WarechatError, transaction_id: Option<String>) -> (StatusCode, Json<ErrorResponse>) {
    let kind = error.kind();
    (
        status_for(kind),
        Json(ErrorResponse {
            kind: kind.as_str().to_string(),
            message: error.to_string(),
            chat_transaction_id: transaction_id,
        }),
    )
}

fn failure_response(failure: &ChatFailure) -> (StatusCode, Json<ErrorResponse>) {
    error_response(
        &failure.error,
        failure.transaction_id.as_ref().map(|id| id.to_string()),
    )
}

// === Handlers ===

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Path((warehouse_id, cam_id, chunk_id)): Path<(String, String, String)>,
    Json(body): Json<ChatBody>,
) -> impl IntoResponse {
    let supplied_id = body.chat_transaction_id.clone();
    let request = match body.into_request(ChunkKey::new(warehouse_id, cam_id, chunk_id)) {
        Ok(request) => request,
        Err(e) => return error_response(&e, supplied_id).into_response(),
    };

    match state.orchestrator.chat(request).await {
        Ok(reply) => Json(ChatResponse::from(reply)).into_response(),
        Err(failure) => failure_response(&failure).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::TransactionId;
    use crate::orchestrator::ChatStage;

    #[test]
    fn test_body_maps_to_request() {
        let body: ChatBody = serde_json::from_value(serde_json::json!({
            "UserQuery": "What else can you tell me?",
            "modelId": "gpt-4o",
            "inferenceConfig": {"maxTokens": 2048, "temperature": 0.7, "topP": 0.9},
            "conversation": [
                {"role": "user", "content": [{"text": "How many vehicles?"}]},
                {"role": "assistant", "content": [{"text": "I saw 3 vehicles."}]}
            ],
            "chatTransactionId": "abc123"
        }))
        .unwrap();

        let request = body.into_request(ChunkKey::new("WH1", "CAM1", "c1")).unwrap();
        assert_eq!(request.question, "What else can you tell me?");
        assert_eq!(request.transaction_id.as_deref(), Some("abc123"));
        assert_eq!(request.inference.model.as_deref(), Some("gpt-4o"));
        assert_eq!(request.inference.max_tokens, Some(2048));
        assert_eq!(request.conversation.len(), 2);
        assert_eq!(request.conversation[1].role, Role::Assistant);
    }

    #[test]
    fn test_minimal_body() {
        let body: ChatBody =
            serde_json::from_value(serde_json::json!({"UserQuery": "Anything?"})).unwrap();
        let request = body.into_request(ChunkKey::new("WH1", "CAM1", "c1")).unwrap();
        assert!(request.transaction_id.is_none());
        assert!(request.conversation.is_empty());
        assert_eq!(request.inference, InferenceOverrides::default());
    }

    #[test]
    fn test_unknown_role_is_invalid() {
        let body: ChatBody = serde_json::from_value(serde_json::json!({
            "UserQuery": "q",
            "conversation": [{"role": "system", "content": [{"text": "x"}]}]
        }))
        .unwrap();
        let err = body.into_request(ChunkKey::new("WH1", "CAM1", "c1")).unwrap_err();
        assert_eq!(status_for(err.kind()), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_failure_status_and_body() {
        let failure = ChatFailure {
            transaction_id: Some(TransactionId::parse("t-1").unwrap()),
            stage: ChatStage::Resolving,
            error: WarechatError::ChunkNotFound("warehouse_id=WH1, cam_id=CAM1, chunk_id=c9".into()),
        };
        let (status, Json(body)) = failure_response(&failure);
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.kind, "ChunkNotFound");
        assert_eq!(body.chat_transaction_id.as_deref(), Some("t-1"));

        let failure = ChatFailure {
            transaction_id: None,
            stage: ChatStage::Inferring,
            error: WarechatError::EmptyInferenceResponse("blank".into()),
        };
        let (status, Json(body)) = failure_response(&failure);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.kind, "EmptyInferenceResponse");
    }

    #[test]
    fn test_response_shape() {
        let reply = ChatReply {
            transaction_id: TransactionId::parse("t-1").unwrap(),
            answer: "Three.".to_string(),
            conversation: vec![Turn::user("How many?"), Turn::assistant("Three.")],
            usage: None,
            model: "gpt-4o-mini".to_string(),
            inference: InferenceConfig::default(),
            partial_transcript: false,
            answered_at: chrono::Utc::now(),
            recorded: true,
        };

        let json = serde_json::to_value(ChatResponse::from(reply)).unwrap();
        assert_eq!(json["chatTransactionId"], "t-1");
        assert_eq!(json["conversation"][1]["role"], "assistant");
        assert_eq!(json["conversation"][1]["content"][0]["text"], "Three.");
        assert_eq!(json["inferenceConfig"]["maxTokens"], 1000);
        assert_eq!(json["chatLastTime"].as_str().unwrap().len(), 19);
        assert!(json.get("usage").is_none());
    }
}
