//! SQLite-backed conversation store.
//!
//! Turns survive restarts. Appends run in a transaction so a question and
//! its answer land together.

use super::{ConversationKey, ConversationStore, Role, Turn};
use crate::error::{Result, WarechatError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS conversation_turns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    transaction_id TEXT NOT NULL,
    warehouse_id TEXT NOT NULL,
    cam_id TEXT NOT NULL,
    chunk_id TEXT NOT NULL,
    role TEXT NOT NULL,
    text TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_turns_conversation
    ON conversation_turns(transaction_id, warehouse_id, cam_id, chunk_id, id);
"#;

/// SQLite-backed conversation store.
pub struct SqliteConversationStore {
    conn: Mutex<Connection>,
}

impl SqliteConversationStore {
    /// Open (and create if needed) a conversation database.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Opened conversation store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory conversation store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| {
            WarechatError::ConversationRecording("conversation store lock poisoned".to_string())
        })
    }
}

fn insert_turns(tx: &Transaction<'_>, key: &ConversationKey, turns: &[Turn]) -> Result<()> {
    let mut stmt = tx.prepare(
        r#"
        INSERT INTO conversation_turns
            (transaction_id, warehouse_id, cam_id, chunk_id, role, text, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )?;
    for turn in turns {
        stmt.execute(params![
            key.transaction_id.as_str(),
            key.chunk.warehouse_id,
            key.chunk.camera_id,
            key.chunk.chunk_id,
            turn.role.as_str(),
            turn.text,
            turn.timestamp.to_rfc3339(),
        ])?;
    }
    Ok(())
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn get_history(&self, key: &ConversationKey) -> Result<Vec<Turn>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT role, text, created_at
            FROM conversation_turns
            WHERE transaction_id = ?1 AND warehouse_id = ?2 AND cam_id = ?3 AND chunk_id = ?4
            ORDER BY id ASC
            "#,
        )?;

        let rows = stmt.query_map(
            params![
                key.transaction_id.as_str(),
                key.chunk.warehouse_id,
                key.chunk.camera_id,
                key.chunk.chunk_id
            ],
            |row| {
                let role = row.get::<_, String>(0)?.parse::<Role>().map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        0,
                        Type::Text,
                        format!("conversation_turns.role: {}", e).into(),
                    )
                })?;
                Ok((role, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            },
        )?;

        let mut turns = Vec::new();
        for row in rows {
            let (role, text, created_at) = row?;
            let timestamp = match DateTime::parse_from_rfc3339(&created_at) {
                Ok(t) => t.with_timezone(&Utc),
                Err(e) => {
                    warn!(
                        "Unreadable timestamp '{}' on turn of {}: {}; using current time",
                        created_at, key.transaction_id, e
                    );
                    Utc::now()
                }
            };
            turns.push(Turn {
                role,
                text,
                timestamp,
            });
        }

        Ok(turns)
    }

    async fn append(&self, key: &ConversationKey, turns: &[Turn]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        insert_turns(&tx, key, turns)?;
        tx.commit()?;

        debug!("Appended {} turns to {}", turns.len(), key.transaction_id);
        Ok(())
    }

    async fn append_seeded(&self, key: &ConversationKey, seed: &[Turn], turns: &[Turn]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let existing: i64 = tx.query_row(
            r#"
            SELECT COUNT(*) FROM conversation_turns
            WHERE transaction_id = ?1 AND warehouse_id = ?2 AND cam_id = ?3 AND chunk_id = ?4
            "#,
            params![
                key.transaction_id.as_str(),
                key.chunk.warehouse_id,
                key.chunk.camera_id,
                key.chunk.chunk_id
            ],
            |row| row.get(0),
        )?;
        if existing == 0 {
            insert_turns(&tx, key, seed)?;
        }
        insert_turns(&tx, key, turns)?;
        tx.commit()?;

        debug!(
            "Appended {} turns to {} (seeded: {})",
            turns.len(),
            key.transaction_id,
            existing == 0
        );
        Ok(())
    }
}
