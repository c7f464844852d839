//! Local directory object store.
//!
//! Each container is a subdirectory of the root; object names are paths
//! relative to the container, always `/`-separated.

use super::{ObjectEntry, ObjectStore, ObjectStoreError, StoreResult};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Object store backed by a local directory tree.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a container-relative name, refusing anything that escapes it.
    fn resolve(&self, container: &str, name: &str) -> StoreResult<PathBuf> {
        let relative = Path::new(name);
        let escapes = Path::new(container)
            .components()
            .chain(relative.components())
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(ObjectStoreError::Permanent(format!(
                "invalid object path {}/{}",
                container, name
            )));
        }
        Ok(self.root.join(container).join(relative))
    }
}

fn io_error(err: std::io::Error, what: &str) -> ObjectStoreError {
    match err.kind() {
        std::io::ErrorKind::NotFound => ObjectStoreError::NotFound(what.to_string()),
        std::io::ErrorKind::PermissionDenied => {
            ObjectStoreError::Permanent(format!("{}: {}", what, err))
        }
        _ => ObjectStoreError::Transient(format!("{}: {}", what, err)),
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn list(&self, container: &str, prefix: &str) -> StoreResult<Vec<ObjectEntry>> {
        let container_dir = self.resolve(container, "")?;
        if !container_dir.is_dir() {
            debug!("Container directory {:?} does not exist", container_dir);
            return Ok(Vec::new());
        }

        let prefix = prefix.to_string();
        let entries = tokio::task::spawn_blocking(move || {
            let mut entries = Vec::new();
            for entry in WalkDir::new(&container_dir).sort_by_file_name() {
                let entry = entry.map_err(|e| ObjectStoreError::Transient(e.to_string()))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(relative) = entry.path().strip_prefix(&container_dir) else {
                    continue;
                };
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if name.starts_with(&prefix) {
                    let size = entry.metadata().ok().map(|m| m.len());
                    entries.push(ObjectEntry::new(name, size));
                }
            }
            Ok::<_, ObjectStoreError>(entries)
        })
        .await
        .map_err(|e| ObjectStoreError::Transient(format!("listing task failed: {}", e)))??;

        Ok(entries)
    }

    async fn get(&self, container: &str, name: &str) -> StoreResult<Vec<u8>> {
        let path = self.resolve(container, name)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| io_error(e, &format!("{}/{}", container, name)))
    }
}
