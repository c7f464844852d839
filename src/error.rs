//! Error types for Warechat.

use thiserror::Error;

/// Library-level error type for Warechat operations.
///
/// The first block of variants is the chat pipeline's failure taxonomy; each
/// maps to exactly one [`ErrorKind`] so callers can discriminate without
/// matching on messages.
#[derive(Error, Debug)]
pub enum WarechatError {
    #[error("Chunk not found: {0}")]
    ChunkNotFound(String),

    #[error("No transcript location for chunk: {0}")]
    TranscriptLocationAbsent(String),

    #[error("Transcript store unavailable: {0}")]
    TranscriptStoreUnavailable(String),

    #[error("Transcript merge failed: {0}")]
    TranscriptMergeFailure(String),

    #[error("No transcript available: {0}")]
    NoTranscriptAvailable(String),

    #[error("Context build failed: {0}")]
    ContextBuildFailure(String),

    #[error("Inference service error: {0}")]
    InferenceService(String),

    #[error("Empty inference response: {0}")]
    EmptyInferenceResponse(String),

    #[error("Conversation recording failed: {0}")]
    ConversationRecording(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] crate::object_store::ObjectStoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Discriminant of a [`WarechatError`], stable across message changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ChunkNotFound,
    TranscriptLocationAbsent,
    TranscriptStoreUnavailable,
    TranscriptMergeFailure,
    NoTranscriptAvailable,
    ContextBuildFailure,
    InferenceServiceError,
    EmptyInferenceResponse,
    ConversationRecordingFailure,
    InvalidInput,
    Internal,
}

impl ErrorKind {
    /// Label sent to clients alongside the error message.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ChunkNotFound => "ChunkNotFound",
            ErrorKind::TranscriptLocationAbsent => "TranscriptLocationAbsent",
            ErrorKind::TranscriptStoreUnavailable => "TranscriptStoreUnavailable",
            ErrorKind::TranscriptMergeFailure => "TranscriptMergeFailure",
            ErrorKind::NoTranscriptAvailable => "NoTranscriptAvailable",
            ErrorKind::ContextBuildFailure => "ContextBuildFailure",
            ErrorKind::InferenceServiceError => "InferenceServiceError",
            ErrorKind::EmptyInferenceResponse => "EmptyInferenceResponse",
            ErrorKind::ConversationRecordingFailure => "ConversationRecordingFailure",
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::Internal => "Internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl WarechatError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            WarechatError::ChunkNotFound(_) => ErrorKind::ChunkNotFound,
            WarechatError::TranscriptLocationAbsent(_) => ErrorKind::TranscriptLocationAbsent,
            WarechatError::TranscriptStoreUnavailable(_) => ErrorKind::TranscriptStoreUnavailable,
            WarechatError::TranscriptMergeFailure(_) => ErrorKind::TranscriptMergeFailure,
            WarechatError::NoTranscriptAvailable(_) => ErrorKind::NoTranscriptAvailable,
            WarechatError::ContextBuildFailure(_) => ErrorKind::ContextBuildFailure,
            WarechatError::InferenceService(_) => ErrorKind::InferenceServiceError,
            WarechatError::EmptyInferenceResponse(_) => ErrorKind::EmptyInferenceResponse,
            WarechatError::ConversationRecording(_) => ErrorKind::ConversationRecordingFailure,
            WarechatError::InvalidInput(_) => ErrorKind::InvalidInput,
            WarechatError::Config(_)
            | WarechatError::ObjectStore(_)
            | WarechatError::Io(_)
            | WarechatError::Json(_)
            | WarechatError::TomlParse(_)
            | WarechatError::Http(_)
            | WarechatError::Database(_) => ErrorKind::Internal,
        }
    }
}

/// Result type alias for Warechat operations.
pub type Result<T> = std::result::Result<T, WarechatError>;
