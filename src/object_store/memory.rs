//! In-memory object store.
//!
//! Useful for testing. Objects keep insertion order so tests can control the
//! listing order the fetcher sees.

use super::{ObjectEntry, ObjectStore, ObjectStoreError, StoreResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

/// In-memory object store.
pub struct MemoryObjectStore {
    containers: RwLock<HashMap<String, Vec<(String, Vec<u8>)>>>,
    calls: AtomicUsize,
}

impl MemoryObjectStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            containers: RwLock::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Add or replace an object.
    pub fn put(&self, container: &str, name: &str, data: impl Into<Vec<u8>>) {
        let mut containers = self.containers.write().unwrap_or_else(|e| e.into_inner());
        let objects = containers.entry(container.to_string()).or_default();
        let data = data.into();
        match objects.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = data,
            None => objects.push((name.to_string(), data)),
        }
    }

    /// Total list and get calls served.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list(&self, container: &str, prefix: &str) -> StoreResult<Vec<ObjectEntry>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let containers = self.containers.read().unwrap_or_else(|e| e.into_inner());
        Ok(containers
            .get(container)
            .map(|objects| {
                objects
                    .iter()
                    .filter(|(name, _)| name.starts_with(prefix))
                    .map(|(name, data)| ObjectEntry::new(name.clone(), Some(data.len() as u64)))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get(&self, container: &str, name: &str) -> StoreResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let containers = self.containers.read().unwrap_or_else(|e| e.into_inner());
        containers
            .get(container)
            .and_then(|objects| objects.iter().find(|(n, _)| n == name))
            .map(|(_, data)| data.clone())
            .ok_or_else(|| ObjectStoreError::NotFound(format!("{}/{}", container, name)))
    }
}
