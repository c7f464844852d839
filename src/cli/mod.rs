//! CLI module for Warechat.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use crate::chunk::ChunkKey;
use crate::inference::InferenceOverrides;
use clap::{Args, Parser, Subcommand};

/// Warechat - ask questions about recorded warehouse camera footage
///
/// Answers are grounded in the transcript of one recorded chunk, and
/// follow-up questions within a session see the earlier turns.
#[derive(Parser, Debug)]
#[command(name = "warechat")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Identifies one recorded chunk.
#[derive(Args, Debug, Clone)]
pub struct ChunkArgs {
    /// Warehouse id
    pub warehouse_id: String,

    /// Camera id
    pub cam_id: String,

    /// Chunk id
    pub chunk_id: String,
}

impl ChunkArgs {
    pub fn key(&self) -> ChunkKey {
        ChunkKey::new(&self.warehouse_id, &self.cam_id, &self.chunk_id)
    }
}

/// Inference parameters that override the configured defaults.
#[derive(Args, Debug, Clone, Default)]
pub struct InferenceArgs {
    /// Model to answer with
    #[arg(short, long)]
    pub model: Option<String>,

    /// Maximum answer length in tokens
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Sampling temperature (0.0-2.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Nucleus sampling probability (0.0-1.0]
    #[arg(long)]
    pub top_p: Option<f32>,
}

impl InferenceArgs {
    pub fn overrides(&self) -> InferenceOverrides {
        InferenceOverrides {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask one question about a chunk
    Ask {
        #[command(flatten)]
        chunk: ChunkArgs,

        /// The question to ask
        question: String,

        /// Continue an existing conversation
        #[arg(short, long)]
        transaction_id: Option<String>,

        #[command(flatten)]
        inference: InferenceArgs,

        /// Print the full reply as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start an interactive chat session about a chunk
    Chat {
        #[command(flatten)]
        chunk: ChunkArgs,

        #[command(flatten)]
        inference: InferenceArgs,
    },

    /// Start the HTTP chat API
    Serve {
        /// Host to bind to (defaults to server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (defaults to server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage chunk records
    Chunk {
        #[command(subcommand)]
        action: ChunkAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ChunkAction {
    /// Register or update a chunk record
    Add {
        #[command(flatten)]
        chunk: ChunkArgs,

        /// Blob URL of a transcript part, or of the folder holding them
        #[arg(long)]
        transcripts_url: Option<String>,

        /// Blob URL of the video itself
        #[arg(long)]
        video_url: Option<String>,

        /// Recording start (RFC 3339)
        #[arg(long)]
        started_at: Option<String>,

        /// Recording end (RFC 3339)
        #[arg(long)]
        ended_at: Option<String>,
    },

    /// Show a chunk record
    Show {
        #[command(flatten)]
        chunk: ChunkArgs,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Show configuration file path
    Path,
}
