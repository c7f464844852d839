//! Interactive chat about one chunk.

use crate::cli::preflight;
use crate::cli::{ChunkArgs, InferenceArgs, Output};
use crate::config::Settings;
use crate::conversation::TransactionId;
use crate::orchestrator::{ChatOrchestrator, ChatRequest};
use anyhow::Result;
use console::style;
use std::io::{self, BufRead, Write};

/// Run the interactive chat command.
///
/// Every question in a session shares one transaction id, so the pipeline
/// carries earlier turns forward.
pub async fn run_chat(chunk: &ChunkArgs, inference: &InferenceArgs, settings: Settings) -> Result<()> {
    // Pre-flight checks
    if let Err(e) = preflight::check(&settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let orchestrator = ChatOrchestrator::from_settings(&settings)?;
    let key = chunk.key();

    let record = orchestrator.chunk(&key).await?;
    let mut transaction_id = TransactionId::generate();

    println!("\n{}", style("Warechat").bold().cyan());
    println!("{}", style(format!("Chunk {}", record.key)).dim());
    println!(
        "{}\n",
        style("Type your questions, or 'exit' to quit. Use 'clear' to start a new conversation.").dim()
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{} ", style("You:").green().bold());
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }

        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            Output::info("Goodbye!");
            break;
        }

        if input.eq_ignore_ascii_case("clear") {
            transaction_id = TransactionId::generate();
            Output::info("Started a new conversation.");
            continue;
        }

        let mut request = ChatRequest::new(key.clone(), input)
            .with_transaction_id(transaction_id.as_str());
        request.inference = inference.overrides();

        match orchestrator.chat(request).await {
            Ok(reply) => {
                println!("\n{} {}\n", style("AI:").cyan().bold(), reply.answer);
                if reply.partial_transcript {
                    Output::warning("Some transcript parts were unavailable.");
                }
            }
            Err(failure) => {
                Output::error(&format!("{} ({})", failure, failure.kind()));
            }
        }
    }

    Ok(())
}
