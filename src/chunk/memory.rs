//! In-memory chunk store.
//!
//! Useful for testing and demos.

use super::{Chunk, ChunkKey, ChunkResolver};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

/// In-memory chunk store.
pub struct MemoryChunkStore {
    chunks: RwLock<HashMap<ChunkKey, Chunk>>,
    lookups: AtomicUsize,
}

impl MemoryChunkStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(HashMap::new()),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Insert or replace a chunk record.
    pub fn insert(&self, chunk: Chunk) {
        let mut chunks = self.chunks.write().unwrap_or_else(|e| e.into_inner());
        chunks.insert(chunk.key.clone(), chunk);
    }

    /// Number of lookups served so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl Default for MemoryChunkStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChunkResolver for MemoryChunkStore {
    async fn find(&self, key: &ChunkKey) -> Result<Option<Chunk>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let chunks = self.chunks.read().unwrap_or_else(|e| e.into_inner());
        Ok(chunks.get(key).cloned())
    }
}
