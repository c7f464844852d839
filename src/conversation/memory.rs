//! In-memory conversation store.
//!
//! Each conversation has its own async lock, so appends to one transaction
//! are serialized while different transactions proceed independently. The
//! outer map lock is only held to look up or create an entry.

use super::{ConversationKey, ConversationStore, Turn};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

type Log = Arc<Mutex<Vec<Turn>>>;

/// In-memory conversation store.
pub struct MemoryConversationStore {
    conversations: RwLock<HashMap<ConversationKey, Log>>,
}

impl MemoryConversationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
        }
    }

    fn existing(&self, key: &ConversationKey) -> Option<Log> {
        let map = self.conversations.read().unwrap_or_else(|e| e.into_inner());
        map.get(key).cloned()
    }

    fn entry(&self, key: &ConversationKey) -> Log {
        if let Some(log) = self.existing(key) {
            return log;
        }
        let mut map = self.conversations.write().unwrap_or_else(|e| e.into_inner());
        map.entry(key.clone()).or_default().clone()
    }

    /// Number of conversations held.
    pub fn len(&self) -> usize {
        self.conversations
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn get_history(&self, key: &ConversationKey) -> Result<Vec<Turn>> {
        match self.existing(key) {
            Some(log) => Ok(log.lock().await.clone()),
            None => Ok(Vec::new()),
        }
    }

    async fn append(&self, key: &ConversationKey, turns: &[Turn]) -> Result<()> {
        let log = self.entry(key);
        log.lock().await.extend_from_slice(turns);
        Ok(())
    }

    async fn append_seeded(&self, key: &ConversationKey, seed: &[Turn], turns: &[Turn]) -> Result<()> {
        let log = self.entry(key);
        let mut log = log.lock().await;
        if log.is_empty() {
            log.extend_from_slice(seed);
        }
        log.extend_from_slice(turns);
        Ok(())
    }
}
