//! Chunk metadata lookup.
//!
//! A chunk is one recorded video segment from one camera. Records are written
//! by the upstream ingestion process; this crate only reads them.

mod memory;
mod sqlite;

pub use memory::MemoryChunkStore;
pub use sqlite::SqliteChunkStore;

use crate::error::{Result, WarechatError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Identity of a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkKey {
    pub warehouse_id: String,
    pub camera_id: String,
    pub chunk_id: String,
}

impl ChunkKey {
    pub fn new(
        warehouse_id: impl Into<String>,
        camera_id: impl Into<String>,
        chunk_id: impl Into<String>,
    ) -> Self {
        Self {
            warehouse_id: warehouse_id.into(),
            camera_id: camera_id.into(),
            chunk_id: chunk_id.into(),
        }
    }
}

impl std::fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "warehouse_id={}, cam_id={}, chunk_id={}",
            self.warehouse_id, self.camera_id, self.chunk_id
        )
    }
}

/// A recorded video segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub key: ChunkKey,
    /// Start of the recorded segment.
    pub started_at: Option<DateTime<Utc>>,
    /// End of the recorded segment.
    pub ended_at: Option<DateTime<Utc>>,
    /// Location of the video blob itself.
    pub video_url: Option<String>,
    /// Blob URL of (any) transcript part, or of the folder holding them.
    pub transcript_location: Option<String>,
}

impl Chunk {
    /// Create a chunk with only an identity and transcript reference.
    pub fn new(key: ChunkKey, transcript_location: Option<String>) -> Self {
        Self {
            key,
            started_at: None,
            ended_at: None,
            video_url: None,
            transcript_location,
        }
    }

    /// Segment length in seconds, when both ends are known.
    pub fn duration_seconds(&self) -> Option<i64> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some((end - start).num_seconds()),
            _ => None,
        }
    }
}

/// Where a chunk's transcript parts live: a container and a folder prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptLocation {
    pub container: String,
    /// Folder prefix, always ending in `/`.
    pub prefix: String,
}

impl TranscriptLocation {
    /// Parse a blob URL such as
    /// `https://acct.blob.core.windows.net/container/2025-08-26/cam1/chunks/ts_chunk_start-0_file.json`.
    ///
    /// The first path segment is the container. A trailing `.json` file name
    /// is dropped so the prefix names its folder.
    pub fn parse(reference: &str) -> Result<Self> {
        let url = Url::parse(reference.trim()).map_err(|e| {
            WarechatError::TranscriptLocationAbsent(format!(
                "unparseable transcript location '{}': {}",
                reference, e
            ))
        })?;

        if url.scheme() != "https" {
            return Err(WarechatError::TranscriptLocationAbsent(format!(
                "unsupported transcript location scheme '{}'",
                url.scheme()
            )));
        }

        let mut segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        if segments.is_empty() {
            return Err(WarechatError::TranscriptLocationAbsent(format!(
                "transcript location '{}' has no container",
                reference
            )));
        }

        let container = segments.remove(0).to_string();

        if segments.last().is_some_and(|last| last.ends_with(".json")) {
            segments.pop();
        }

        let mut prefix = segments.join("/");
        if !prefix.is_empty() {
            prefix.push('/');
        }

        Ok(Self { container, prefix })
    }
}

impl std::fmt::Display for TranscriptLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.container, self.prefix)
    }
}

/// Read-only access to chunk records.
#[async_trait]
pub trait ChunkResolver: Send + Sync {
    /// Look up a chunk, returning `None` when no record matches.
    async fn find(&self, key: &ChunkKey) -> Result<Option<Chunk>>;

    /// Look up a chunk, failing with `ChunkNotFound` when no record matches.
    ///
    /// A chunk without a transcript location is returned as-is.
    async fn resolve(&self, key: &ChunkKey) -> Result<Chunk> {
        self.find(key)
            .await?
            .ok_or_else(|| WarechatError::ChunkNotFound(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_parse_file_url_uses_containing_folder() {
        let loc = TranscriptLocation::parse(
            "https://acct.blob.core.windows.net/cache-0e83/2025-08-26/loopcam1/abc/chunks/ts_abc_chunk_start-0-end-30_file.json",
        )
        .unwrap();
        assert_eq!(loc.container, "cache-0e83");
        assert_eq!(loc.prefix, "2025-08-26/loopcam1/abc/chunks/");
    }

    #[test]
    fn test_parse_folder_url() {
        let loc =
            TranscriptLocation::parse("https://acct.blob.core.windows.net/transcripts/wh1/cam2/")
                .unwrap();
        assert_eq!(loc.container, "transcripts");
        assert_eq!(loc.prefix, "wh1/cam2/");
    }

    #[test]
    fn test_parse_container_only() {
        let loc = TranscriptLocation::parse("https://acct.blob.core.windows.net/transcripts").unwrap();
        assert_eq!(loc.prefix, "");
    }

    #[test]
    fn test_parse_rejects_other_schemes() {
        let err = TranscriptLocation::parse("ftp://host/container/x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TranscriptLocationAbsent);

        let err = TranscriptLocation::parse("not a url").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TranscriptLocationAbsent);
    }

    #[tokio::test]
    async fn test_resolve_maps_miss_to_not_found() {
        let store = MemoryChunkStore::new();
        let err = store
            .resolve(&ChunkKey::new("WH001", "CAM1", "missing"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChunkNotFound);
    }

    #[tokio::test]
    async fn test_resolve_returns_chunk_without_location() {
        let store = MemoryChunkStore::new();
        let key = ChunkKey::new("WH001", "CAM1", "c1");
        store.insert(Chunk::new(key.clone(), None));

        let chunk = store.resolve(&key).await.unwrap();
        assert!(chunk.transcript_location.is_none());
    }
}
