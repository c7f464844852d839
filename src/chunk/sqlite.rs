//! SQLite-backed chunk store.

use super::{Chunk, ChunkKey, ChunkResolver};
use crate::error::{Result, WarechatError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS wh_chunks (
    warehouse_id TEXT NOT NULL,
    cam_id TEXT NOT NULL,
    chunk_id TEXT NOT NULL,
    chunk_blob_url TEXT,
    transcripts_url TEXT,
    started_at TEXT,
    ended_at TEXT,
    PRIMARY KEY (warehouse_id, cam_id, chunk_id)
);
"#;

/// SQLite-backed chunk store.
pub struct SqliteChunkStore {
    conn: Mutex<Connection>,
}

impl SqliteChunkStore {
    /// Open (and create if needed) a chunk database.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Opened chunk store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory chunk store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| WarechatError::Config("chunk store lock poisoned".to_string()))
    }

    /// Insert or replace a chunk record.
    pub fn upsert(&self, chunk: &Chunk) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO wh_chunks
                (warehouse_id, cam_id, chunk_id, chunk_blob_url, transcripts_url, started_at, ended_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                chunk.key.warehouse_id,
                chunk.key.camera_id,
                chunk.key.chunk_id,
                chunk.video_url,
                chunk.transcript_location,
                chunk.started_at.map(|t| t.to_rfc3339()),
                chunk.ended_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        debug!("Stored chunk {}", chunk.key);
        Ok(())
    }
}

fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|t| t.with_timezone(&Utc))
}

#[async_trait]
impl ChunkResolver for SqliteChunkStore {
    async fn find(&self, key: &ChunkKey) -> Result<Option<Chunk>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                r#"
                SELECT chunk_blob_url, transcripts_url, started_at, ended_at
                FROM wh_chunks
                WHERE warehouse_id = ?1 AND cam_id = ?2 AND chunk_id = ?3
                "#,
                params![key.warehouse_id, key.camera_id, key.chunk_id],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.map(|(video_url, transcripts_url, started_at, ended_at)| Chunk {
            key: key.clone(),
            started_at: parse_timestamp(started_at),
            ended_at: parse_timestamp(ended_at),
            video_url,
            transcript_location: transcripts_url.filter(|s| !s.trim().is_empty()),
        }))
    }
}
