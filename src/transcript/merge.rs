//! Merging of transcript parts into one transcript.

use super::{MergedTranscript, SkippedPart, TranscriptPart};

/// Text placed between consecutive parts.
pub const PART_SEPARATOR: &str = "\n\n";

/// Merge parts into one transcript.
///
/// Parts are ordered by ordering key ascending and ties keep listing order.
/// The fetcher only admits keyed parts; any unkeyed part handed in directly
/// goes last. An empty input yields an empty-flagged
/// transcript rather than an error.
pub fn merge(mut parts: Vec<TranscriptPart>, skipped: Vec<SkippedPart>) -> MergedTranscript {
    parts.sort_by_key(|p| (p.ordering_key.is_none(), p.ordering_key, p.listing_index));

    let text = parts
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join(PART_SEPARATOR);

    MergedTranscript {
        text,
        part_names: parts.into_iter().map(|p| p.name).collect(),
        skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(name: &str, key: Option<u64>, listing_index: usize, text: &str) -> TranscriptPart {
        TranscriptPart {
            name: name.to_string(),
            ordering_key: key,
            listing_index,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_merge_orders_by_key_not_listing() {
        // Stored in order [2, 1].
        let parts = vec![
            part("c1_chunk_start-2.json", Some(2), 0, "...intro"),
            part("c1_chunk_start-1.json", Some(1), 1, "...continued"),
        ];

        let merged = merge(parts, Vec::new());
        assert_eq!(merged.text, format!("...continued{}...intro", PART_SEPARATOR));
        assert_eq!(merged.part_names, vec!["c1_chunk_start-1.json", "c1_chunk_start-2.json"]);
        assert!(!merged.is_empty());
        assert!(!merged.is_partial());
    }

    #[test]
    fn test_merge_numeric_not_lexical() {
        let parts = vec![
            part("chunk_start-30", Some(30), 0, "b"),
            part("chunk_start-120", Some(120), 1, "c"),
            part("chunk_start-0", Some(0), 2, "a"),
        ];
        assert_eq!(merge(parts, Vec::new()).text, "a\n\nb\n\nc");
    }

    #[test]
    fn test_merge_unkeyed_last_and_ties_by_listing() {
        let parts = vec![
            part("notes.json", None, 0, "unkeyed"),
            part("dup-b", Some(5), 2, "second"),
            part("dup-a", Some(5), 1, "first"),
        ];
        assert_eq!(merge(parts, Vec::new()).text, "first\n\nsecond\n\nunkeyed");
    }

    #[test]
    fn test_merge_empty_is_flagged() {
        let merged = merge(Vec::new(), Vec::new());
        assert!(merged.is_empty());
        assert_eq!(merged.text, "");
    }

    #[test]
    fn test_empty_text_part_is_still_a_transcript() {
        let merged = merge(vec![part("p", Some(0), 0, "")], Vec::new());
        assert!(!merged.is_empty());
    }

    #[test]
    fn test_merge_records_skipped() {
        let skipped = vec![SkippedPart {
            name: "bad.json".to_string(),
            reason: "invalid JSON".to_string(),
        }];
        let merged = merge(vec![part("p", Some(0), 0, "ok")], skipped);
        assert!(merged.is_partial());
        assert_eq!(merged.skipped[0].name, "bad.json");
    }
}
