//! Chunk record management.

use crate::chunk::{Chunk, ChunkResolver, SqliteChunkStore, TranscriptLocation};
use crate::cli::output::format_duration;
use crate::cli::{ChunkAction, ChunkArgs, Output};
use crate::config::Settings;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

/// Run the chunk command.
pub async fn run_chunk(action: &ChunkAction, settings: Settings) -> Result<()> {
    let store = SqliteChunkStore::new(&settings.chunks_path())?;

    match action {
        ChunkAction::Add {
            chunk,
            transcripts_url,
            video_url,
            started_at,
            ended_at,
        } => {
            let record = build_chunk(
                chunk,
                transcripts_url.clone(),
                video_url.clone(),
                started_at.as_deref(),
                ended_at.as_deref(),
            )?;

            if let Some(url) = &record.transcript_location {
                if let Err(e) = TranscriptLocation::parse(url) {
                    Output::warning(&format!("Transcript URL will not resolve: {}", e));
                }
            }

            store.upsert(&record)?;
            Output::success(&format!("Saved chunk {}", record.key));
        }

        ChunkAction::Show { chunk } => {
            let record = store.resolve(&chunk.key()).await?;
            print_chunk(&record);
        }
    }

    Ok(())
}

fn parse_time(value: Option<&str>, field: &str) -> Result<Option<DateTime<Utc>>> {
    value
        .map(|v| {
            DateTime::parse_from_rfc3339(v)
                .map(|t| t.with_timezone(&Utc))
                .with_context(|| format!("invalid {} '{}', expected RFC 3339", field, v))
        })
        .transpose()
}

fn build_chunk(
    args: &ChunkArgs,
    transcripts_url: Option<String>,
    video_url: Option<String>,
    started_at: Option<&str>,
    ended_at: Option<&str>,
) -> Result<Chunk> {
    let mut chunk = Chunk::new(args.key(), transcripts_url);
    chunk.video_url = video_url;
    chunk.started_at = parse_time(started_at, "started_at")?;
    chunk.ended_at = parse_time(ended_at, "ended_at")?;

    if let (Some(start), Some(end)) = (chunk.started_at, chunk.ended_at) {
        anyhow::ensure!(end >= start, "ended_at is before started_at");
    }
    Ok(chunk)
}

fn print_chunk(chunk: &Chunk) {
    Output::header(&format!("Chunk {}", chunk.key.chunk_id));
    Output::kv("Warehouse", &chunk.key.warehouse_id);
    Output::kv("Camera", &chunk.key.camera_id);
    if let Some(start) = chunk.started_at {
        Output::kv("Started", &start.to_rfc3339());
    }
    if let Some(end) = chunk.ended_at {
        Output::kv("Ended", &end.to_rfc3339());
    }
    if let Some(secs) = chunk.duration_seconds() {
        Output::kv("Duration", &format_duration(secs));
    }
    if let Some(video) = &chunk.video_url {
        Output::kv("Video", video);
    }
    match chunk.transcript_location.as_deref().map(TranscriptLocation::parse) {
        Some(Ok(location)) => Output::kv("Transcripts", &location.to_string()),
        Some(Err(e)) => Output::warning(&format!("{}", e)),
        None => Output::list_item("No transcript location"),
    }
}
