//! Rendering of stored transcript part files into prompt text.
//!
//! A part file is JSON: an array of records or a single record. Each record
//! is an object of labelled observations, rendered key by key in sorted
//! order under a banner line.

use crate::error::Result;
use serde_json::Value;

const BANNER_FILL: &str = "**************";

/// Render one part file to text.
pub fn render_part(bytes: &[u8]) -> Result<String> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let value: Value = serde_json::from_slice(bytes)?;

    let records = match value {
        Value::Array(items) => items,
        other => vec![other],
    };

    let blocks: Vec<String> = records.iter().flat_map(render_record).collect();
    Ok(blocks.join("\n\n"))
}

fn render_record(record: &Value) -> Vec<String> {
    match record {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            keys.into_iter()
                .map(|key| format!("{}{}{}\n{}", BANNER_FILL, key, BANNER_FILL, render_value(&map[key])))
                .collect()
        }
        Value::Null => Vec::new(),
        other => vec![render_value(other)],
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
