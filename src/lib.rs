//! Warechat - conversational Q&A over warehouse camera transcripts
//!
//! Operators ask questions about one recorded video segment ("chunk") and
//! get answers grounded in that chunk's transcript. Follow-up questions that
//! reuse a transaction id see the earlier turns.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `chunk` - Chunk records and transcript locations
//! - `object_store` - Blob storage abstraction (Azure Blob, local directory)
//! - `transcript` - Fetching and merging multi-part transcripts
//! - `conversation` - Conversation history stores
//! - `context` - Prompt context assembly within a size budget
//! - `inference` - Generative model gateway
//! - `orchestrator` - The chat pipeline
//! - `config` - Configuration management
//!
//! # Example
//!
//! ```rust,no_run
//! use warechat::chunk::ChunkKey;
//! use warechat::config::Settings;
//! use warechat::orchestrator::{ChatOrchestrator, ChatRequest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = ChatOrchestrator::from_settings(&settings)?;
//!
//!     let chunk = ChunkKey::new("WH001", "CAM07", "chunk_0042");
//!     let reply = orchestrator
//!         .chat(ChatRequest::new(chunk, "How many forklifts passed the dock?"))
//!         .await?;
//!     println!("{} ({})", reply.answer, reply.transaction_id);
//!
//!     Ok(())
//! }
//! ```

pub mod chunk;
pub mod cli;
pub mod config;
pub mod context;
pub mod conversation;
pub mod error;
pub mod inference;
pub mod object_store;
pub mod openai;
pub mod orchestrator;
pub mod transcript;

pub use error::{ErrorKind, Result, WarechatError};
