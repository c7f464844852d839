//! Ask command implementation.

use crate::cli::preflight;
use crate::cli::{ChunkArgs, InferenceArgs, Output};
use crate::config::Settings;
use crate::orchestrator::{ChatOrchestrator, ChatReply, ChatRequest};
use anyhow::Result;

/// Run the ask command.
pub async fn run_ask(
    chunk: &ChunkArgs,
    question: &str,
    transaction_id: Option<String>,
    inference: &InferenceArgs,
    json: bool,
    settings: Settings,
) -> Result<()> {
    // Pre-flight checks
    if let Err(e) = preflight::check(&settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let orchestrator = ChatOrchestrator::from_settings(&settings)?;

    let mut request = ChatRequest::new(chunk.key(), question);
    request.transaction_id = transaction_id;
    request.inference = inference.overrides();

    let spinner = Output::spinner("Reading transcript...");

    match orchestrator.chat(request).await {
        Ok(reply) => {
            spinner.finish_and_clear();

            if json {
                println!("{}", serde_json::to_string_pretty(&reply)?);
            } else {
                print_reply(&reply);
            }
        }
        Err(failure) => {
            spinner.finish_and_clear();
            Output::error(&format!("{} ({})", failure, failure.kind()));
            if let Some(id) = &failure.transaction_id {
                Output::kv("Transaction", id.as_str());
            }
            return Err(failure.into());
        }
    }

    Ok(())
}

fn print_reply(reply: &ChatReply) {
    println!("\n{}\n", reply.answer);

    if reply.partial_transcript {
        Output::warning("Some transcript parts were unavailable; the answer may be incomplete.");
    }

    Output::kv("Transaction", reply.transaction_id.as_str());
    Output::kv("Model", &reply.model);
    if let Some(usage) = reply.usage {
        Output::kv(
            "Tokens",
            &format!(
                "{} in / {} out",
                usage.input_tokens, usage.output_tokens
            ),
        );
    }
    if !reply.recorded {
        Output::warning("This turn was not saved; follow-up questions will not see it.");
    }
}
