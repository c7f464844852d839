//! Transcript retrieval and merging.
//!
//! A chunk's transcript is stored as several part files under one folder of
//! an object store. The fetcher lists and downloads them; the merger orders
//! and concatenates whatever was retrieved.

mod fetcher;
mod format;
mod merge;

pub use fetcher::{FetchedParts, PartSelector, RetryPolicy, TranscriptFetcher};
pub use format::render_part;
pub use merge::{merge, PART_SEPARATOR};

use serde::Serialize;

/// One retrieved transcript part.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptPart {
    /// Object name in the store.
    pub name: String,
    /// Sequence number extracted from the name; `None` sorts last.
    pub ordering_key: Option<u64>,
    /// Position in the store listing, used to break ties.
    pub listing_index: usize,
    /// Rendered text of the part.
    pub text: String,
}

/// A part that was listed but could not be used.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedPart {
    pub name: String,
    pub reason: String,
}

/// The ordered concatenation of a chunk's available parts.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MergedTranscript {
    pub text: String,
    /// Names of merged parts, in merge order.
    pub part_names: Vec<String>,
    /// Parts left out because they failed to download or decode.
    pub skipped: Vec<SkippedPart>,
}

impl MergedTranscript {
    /// True when no part was merged: the chunk has no transcript, as opposed
    /// to a transcript whose text happens to be empty.
    pub fn is_empty(&self) -> bool {
        self.part_names.is_empty()
    }

    /// True when some listed parts were skipped.
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty()
    }
}
