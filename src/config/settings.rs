//! Configuration settings for Warechat.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub chunks: ChunkStoreSettings,
    pub object_store: ObjectStoreSettings,
    pub azure: AzureSettings,
    pub inference: InferenceSettings,
    pub context: ContextSettings,
    pub conversation: ConversationSettings,
    pub server: ServerSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.warechat".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

/// Chunk metadata store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkStoreSettings {
    /// Path to the SQLite database holding chunk records.
    pub sqlite_path: String,
}

impl Default for ChunkStoreSettings {
    fn default() -> Self {
        Self {
            sqlite_path: "~/.warechat/chunks.db".to_string(),
        }
    }
}

/// Object store backend type.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ObjectStoreProvider {
    /// Azure Blob Storage (default).
    #[default]
    Azure,
    /// A local directory; each container is a subdirectory.
    Local,
}

impl std::str::FromStr for ObjectStoreProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "azure" | "blob" => Ok(ObjectStoreProvider::Azure),
            "local" | "fs" => Ok(ObjectStoreProvider::Local),
            _ => Err(format!("Unknown object store provider: {}", s)),
        }
    }
}

impl std::fmt::Display for ObjectStoreProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectStoreProvider::Azure => write!(f, "azure"),
            ObjectStoreProvider::Local => write!(f, "local"),
        }
    }
}

/// Transcript object store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectStoreSettings {
    /// Backend (azure, local).
    pub provider: ObjectStoreProvider,
    /// Root directory for the local provider.
    pub local_root: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Attempts per list/get call, including the first.
    pub max_attempts: u32,
    /// Initial retry delay in milliseconds; doubles per attempt.
    pub base_delay_ms: u64,
    /// Upper bound on a single retry delay in milliseconds.
    pub max_delay_ms: u64,
    /// Maximum part downloads in flight for one chunk.
    pub max_concurrent_fetches: usize,
    /// Transcript parts end with this suffix.
    pub part_suffix: String,
    /// Regex with one capture group yielding a part's ordering key. Objects
    /// that do not match are not parts.
    pub ordering_pattern: String,
}

impl Default for ObjectStoreSettings {
    fn default() -> Self {
        Self {
            provider: ObjectStoreProvider::Azure,
            local_root: "~/.warechat/blobs".to_string(),
            timeout_secs: 30,
            max_attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 4_000,
            max_concurrent_fetches: 4,
            part_suffix: ".json".to_string(),
            ordering_pattern: r"chunk_start-(\d+)".to_string(),
        }
    }
}

/// Azure Blob Storage credentials.
///
/// Either a SAS token or a service principal (tenant, client id, secret) is
/// required. Values from the environment override the file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AzureSettings {
    pub account_name: Option<String>,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub sas_token: Option<String>,
}

/// Inference service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    /// Model used when a request does not name one.
    pub model: String,
    /// Base URL of an OpenAI-compatible endpoint (None = OpenAI).
    pub api_base: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Default maximum output tokens.
    pub max_tokens: u32,
    /// Default sampling temperature.
    pub temperature: f32,
    /// Default nucleus sampling parameter.
    pub top_p: f32,
    /// Timeout for one inference round-trip in seconds.
    pub timeout_secs: u64,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            api_base: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            max_tokens: 1000,
            temperature: 0.7,
            top_p: 0.9,
            timeout_secs: 120,
        }
    }
}

/// Prompt context budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    /// Maximum characters of assembled context.
    pub max_chars: usize,
    /// Maximum prior turns carried into the context.
    pub max_history_turns: usize,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            max_chars: 100_000,
            max_history_turns: 20,
        }
    }
}

/// Conversation store backend type.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConversationBackend {
    /// Process memory; conversations are lost on restart.
    #[default]
    Memory,
    /// SQLite file.
    Sqlite,
}

/// Conversation store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationSettings {
    pub backend: ConversationBackend,
    /// Path to SQLite database (for sqlite backend).
    pub sqlite_path: String,
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            backend: ConversationBackend::Memory,
            sqlite_path: "~/.warechat/conversations.db".to_string(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    ///
    /// Environment overrides are applied after the file is read.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        let mut settings = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Settings::default()
        };

        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Overlay secrets and account names from the environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let overlay = |slot: &mut Option<String>, key: &str| {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *slot = Some(value);
            }
        };

        overlay(&mut self.azure.account_name, "AZURE_STORAGE_ACCOUNT_NAME");
        overlay(&mut self.azure.tenant_id, "AZURE_TENANT_ID");
        overlay(&mut self.azure.client_id, "AZURE_CLIENT_ID");
        overlay(&mut self.azure.client_secret, "AZURE_CLIENT_SECRET");
        overlay(&mut self.azure.sas_token, "AZURE_STORAGE_SAS_TOKEN");
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::WarechatError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("warechat")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded chunk database path.
    pub fn chunks_path(&self) -> PathBuf {
        Self::expand_path(&self.chunks.sqlite_path)
    }

    /// Get the expanded conversation database path.
    pub fn conversations_path(&self) -> PathBuf {
        Self::expand_path(&self.conversation.sqlite_path)
    }

    /// Get the expanded local object store root.
    pub fn local_blob_root(&self) -> PathBuf {
        Self::expand_path(&self.object_store.local_root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.inference.max_tokens, 1000);
        assert!((settings.inference.temperature - 0.7).abs() < f32::EPSILON);
        assert!((settings.inference.top_p - 0.9).abs() < f32::EPSILON);
        assert_eq!(settings.context.max_chars, 100_000);
        assert_eq!(settings.object_store.max_attempts, 3);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [object_store]
            provider = "local"
            local_root = "/srv/blobs"

            [context]
            max_chars = 2000
            "#,
        )
        .unwrap();

        assert_eq!(settings.object_store.provider, ObjectStoreProvider::Local);
        assert_eq!(settings.object_store.part_suffix, ".json");
        assert_eq!(settings.context.max_chars, 2000);
        assert_eq!(settings.context.max_history_turns, 20);
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut settings = Settings::default();
        settings.azure.tenant_id = Some("from-file".to_string());

        settings.apply_env(|key| match key {
            "AZURE_TENANT_ID" => Some("from-env".to_string()),
            "AZURE_CLIENT_ID" => Some(String::new()),
            _ => None,
        });

        assert_eq!(settings.azure.tenant_id.as_deref(), Some("from-env"));
        assert_eq!(settings.azure.client_id, None);
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!("Azure".parse::<ObjectStoreProvider>().unwrap(), ObjectStoreProvider::Azure);
        assert_eq!("fs".parse::<ObjectStoreProvider>().unwrap(), ObjectStoreProvider::Local);
        assert!("s3".parse::<ObjectStoreProvider>().is_err());
    }
}
