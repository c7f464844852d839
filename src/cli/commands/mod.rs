//! CLI command implementations.

mod ask;
mod chat;
mod chunk;
mod config;
mod serve;

pub use ask::run_ask;
pub use chat::run_chat;
pub use chunk::run_chunk;
pub use config::run_config;
pub use serve::{run_serve, CHAT_ROUTE};
