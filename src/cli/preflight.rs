//! Pre-flight checks before chat operations.
//!
//! Validates that credentials and the chunk database are available before
//! starting a request that would otherwise fail midway.

use crate::config::{ObjectStoreProvider, Settings};
use crate::error::{Result, WarechatError};
use crate::openai::is_api_key_configured;

/// Run pre-flight checks for answering questions.
///
/// Returns Ok(()) if all checks pass, or an error describing what's missing.
pub fn check(settings: &Settings) -> Result<()> {
    check_api_key(settings)?;
    check_object_store(settings)?;
    check_chunk_db(settings)?;
    Ok(())
}

/// Check if the inference API key is configured.
fn check_api_key(settings: &Settings) -> Result<()> {
    if is_api_key_configured(&settings.inference) {
        return Ok(());
    }
    Err(WarechatError::Config(format!(
        "{} not set. Set it with: export {}='sk-...'",
        settings.inference.api_key_env, settings.inference.api_key_env
    )))
}

/// Check that the configured object store has what it needs to connect.
fn check_object_store(settings: &Settings) -> Result<()> {
    match settings.object_store.provider {
        ObjectStoreProvider::Local => {
            let root = settings.local_blob_root();
            if !root.is_dir() {
                return Err(WarechatError::Config(format!(
                    "local object store root {:?} does not exist",
                    root
                )));
            }
        }
        ObjectStoreProvider::Azure => {
            let azure = &settings.azure;
            if azure.account_name.as_deref().unwrap_or("").is_empty() {
                return Err(WarechatError::Config(
                    "AZURE_STORAGE_ACCOUNT_NAME not set".to_string(),
                ));
            }
            let has_sas = azure.sas_token.as_deref().is_some_and(|t| !t.is_empty());
            let has_secret = [&azure.tenant_id, &azure.client_id, &azure.client_secret]
                .iter()
                .all(|v| v.as_deref().is_some_and(|s| !s.is_empty()));
            if !has_sas && !has_secret {
                return Err(WarechatError::Config(
                    "Azure credentials missing: set AZURE_STORAGE_SAS_TOKEN, or AZURE_TENANT_ID, AZURE_CLIENT_ID and AZURE_CLIENT_SECRET".to_string(),
                ));
            }
        }
    }
    Ok(())
}

/// Check that the chunk database exists.
fn check_chunk_db(settings: &Settings) -> Result<()> {
    let path = settings.chunks_path();
    if path.exists() {
        Ok(())
    } else {
        Err(WarechatError::Config(format!(
            "chunk database {:?} not found. Register chunks with: warechat chunk add",
            path
        )))
    }
}
