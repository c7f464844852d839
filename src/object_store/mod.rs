//! Object store abstraction for transcript parts.
//!
//! Provides a trait-based interface over blob services, with a local-directory
//! backend, an in-memory backend and Azure Blob Storage.

mod azure;
mod local;
mod memory;

pub use azure::{AzureBlobStore, AzureCredential};
pub use local::LocalObjectStore;
pub use memory::MemoryObjectStore;

use crate::config::{ObjectStoreProvider, Settings};
use crate::error::{Result, WarechatError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by object store backends.
///
/// The split decides retry behavior: only `Transient` failures are retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ObjectStoreError {
    /// Connectivity, throttling, timeouts or server-side failures.
    #[error("transient store failure: {0}")]
    Transient(String),

    #[error("object not found: {0}")]
    NotFound(String),

    /// Authorization, malformed requests and anything else that will not
    /// succeed on a retry.
    #[error("store request rejected: {0}")]
    Permanent(String),
}

impl ObjectStoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ObjectStoreError::Transient(_))
    }
}

/// Result type for object store calls.
pub type StoreResult<T> = std::result::Result<T, ObjectStoreError>;

/// A listed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    /// Full object name within its container.
    pub name: String,
    /// Size in bytes, when the backend reports it.
    pub size: Option<u64>,
}

impl ObjectEntry {
    pub fn new(name: impl Into<String>, size: Option<u64>) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

/// Trait for object store implementations.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List every object in `container` whose name starts with `prefix`,
    /// in the backend's listing order.
    async fn list(&self, container: &str, prefix: &str) -> StoreResult<Vec<ObjectEntry>>;

    /// Download one object.
    async fn get(&self, container: &str, name: &str) -> StoreResult<Vec<u8>>;
}

/// Classify a reqwest failure.
pub(crate) fn classify_reqwest(err: &reqwest::Error) -> ObjectStoreError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        ObjectStoreError::Transient(err.to_string())
    } else {
        ObjectStoreError::Permanent(err.to_string())
    }
}

/// Classify an HTTP status returned by a blob service.
pub(crate) fn classify_status(status: reqwest::StatusCode, detail: &str) -> ObjectStoreError {
    if status == reqwest::StatusCode::NOT_FOUND {
        ObjectStoreError::NotFound(detail.to_string())
    } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        ObjectStoreError::Transient(format!("{}: {}", status, detail))
    } else {
        ObjectStoreError::Permanent(format!("{}: {}", status, detail))
    }
}

/// Build the configured object store.
pub fn create_object_store(settings: &Settings) -> Result<Arc<dyn ObjectStore>> {
    match settings.object_store.provider {
        ObjectStoreProvider::Local => Ok(Arc::new(LocalObjectStore::new(
            settings.local_blob_root(),
        ))),
        ObjectStoreProvider::Azure => {
            let azure = &settings.azure;
            let account = azure.account_name.clone().ok_or_else(|| {
                WarechatError::Config(
                    "azure.account_name (or AZURE_STORAGE_ACCOUNT_NAME) is required".to_string(),
                )
            })?;

            let credential = match (&azure.sas_token, &azure.tenant_id, &azure.client_id, &azure.client_secret) {
                (Some(sas), _, _, _) => AzureCredential::SharedAccessSignature(sas.clone()),
                (None, Some(tenant), Some(client), Some(secret)) => AzureCredential::ClientSecret {
                    tenant_id: tenant.clone(),
                    client_id: client.clone(),
                    client_secret: secret.clone(),
                },
                _ => {
                    return Err(WarechatError::Config(
                        "Azure credentials missing: set a SAS token or tenant/client id/secret"
                            .to_string(),
                    ))
                }
            };

            let store = AzureBlobStore::new(
                &account,
                credential,
                Duration::from_secs(settings.object_store.timeout_secs),
            )?;
            Ok(Arc::new(store))
        }
    }
}
