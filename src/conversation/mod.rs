//! Conversation history for chunk chats.
//!
//! A conversation is identified by a transaction id and scoped to one chunk.
//! Its log is append-only: turns are never reordered or edited.

mod memory;
mod sqlite;

pub use memory::MemoryConversationStore;
pub use sqlite::SqliteConversationStore;

use crate::chunk::ChunkKey;
use crate::config::{ConversationBackend, Settings};
use crate::error::{Result, WarechatError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Longest caller-supplied transaction id accepted.
const MAX_TRANSACTION_ID_LEN: usize = 128;

/// Identifier of one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    /// Generate a fresh random id (32 lowercase hex characters).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Validate a caller-supplied id.
    pub fn parse(value: &str) -> Result<Self> {
        let valid = !value.is_empty()
            && value.len() <= MAX_TRANSACTION_ID_LEN
            && value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(WarechatError::InvalidInput(format!(
                "transaction id must be 1-{} characters of [A-Za-z0-9_-]",
                MAX_TRANSACTION_ID_LEN
            )));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" | "human" => Ok(Role::User),
            "assistant" | "ai" => Ok(Role::Assistant),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Key of a stored conversation: the transaction id within its chunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    pub chunk: ChunkKey,
    pub transaction_id: TransactionId,
}

impl ConversationKey {
    pub fn new(chunk: ChunkKey, transaction_id: TransactionId) -> Self {
        Self {
            chunk,
            transaction_id,
        }
    }
}

/// Trait for conversation store implementations.
///
/// Implementations must allow concurrent use: distinct keys never block each
/// other for longer than a local operation, and appends to one key apply in
/// call order.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// All turns of a conversation, oldest first. Unknown keys yield an empty history.
    async fn get_history(&self, key: &ConversationKey) -> Result<Vec<Turn>>;

    /// Append turns to the end of a conversation as one unit.
    async fn append(&self, key: &ConversationKey, turns: &[Turn]) -> Result<()>;

    /// Append `turns`, writing `seed` ahead of them only if the conversation
    /// is still empty. Racing first calls for one key store the seed once.
    ///
    /// The default reads then appends and is not atomic; stores that can
    /// check and write under one lock or transaction override it.
    async fn append_seeded(&self, key: &ConversationKey, seed: &[Turn], turns: &[Turn]) -> Result<()> {
        if self.get_history(key).await?.is_empty() {
            let mut all = seed.to_vec();
            all.extend_from_slice(turns);
            return self.append(key, &all).await;
        }
        self.append(key, turns).await
    }
}

/// Build the configured conversation store.
pub fn create_conversation_store(settings: &Settings) -> Result<Arc<dyn ConversationStore>> {
    match settings.conversation.backend {
        ConversationBackend::Memory => Ok(Arc::new(MemoryConversationStore::new())),
        ConversationBackend::Sqlite => Ok(Arc::new(SqliteConversationStore::new(
            &settings.conversations_path(),
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_generated_ids_are_hex_and_unique() {
        let a = TransactionId::generate();
        let b = TransactionId::generate();
        assert_eq!(a.as_str().len(), 32);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
        assert!(TransactionId::parse(a.as_str()).is_ok());
    }

    #[test]
    fn test_caller_ids_are_validated() {
        assert!(TransactionId::parse("shift-7_review").is_ok());
        assert_eq!(TransactionId::parse("").unwrap_err().kind(), ErrorKind::InvalidInput);
        assert!(TransactionId::parse("has space").is_err());
        assert!(TransactionId::parse(&"x".repeat(129)).is_err());
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("Assistant".parse::<Role>().unwrap(), Role::Assistant);
        assert_eq!("human".parse::<Role>().unwrap(), Role::User);
        assert!("system".parse::<Role>().is_err());
    }

    #[test]
    fn test_turn_serializes_lowercase_role() {
        let json = serde_json::to_value(Turn::user("hi")).unwrap();
        assert_eq!(json["role"], "user");
    }
}
