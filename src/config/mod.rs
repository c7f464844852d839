//! Configuration module for Warechat.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{ChatPrompts, Prompts};
pub use settings::{
    AzureSettings, ChunkStoreSettings, ContextSettings, ConversationBackend,
    ConversationSettings, GeneralSettings, InferenceSettings, ObjectStoreProvider,
    ObjectStoreSettings, PromptSettings, ServerSettings, Settings,
};
