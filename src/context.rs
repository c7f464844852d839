//! Prompt context assembly.
//!
//! Combines a chunk's merged transcript, its metadata and prior turns into
//! the context sent to the inference service, within a size budget.

use crate::chunk::Chunk;
use crate::config::{ContextSettings, Prompts};
use crate::conversation::{Role, Turn};
use crate::error::{Result, WarechatError};
use crate::transcript::MergedTranscript;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Size limits for an assembled context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContextBudget {
    /// Maximum characters across system prompt, history and question.
    pub max_chars: usize,
    /// Maximum number of prior turns.
    pub max_history_turns: usize,
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self::from(&ContextSettings::default())
    }
}

impl From<&ContextSettings> for ContextBudget {
    fn from(settings: &ContextSettings) -> Self {
        Self {
            max_chars: settings.max_chars,
            max_history_turns: settings.max_history_turns,
        }
    }
}

/// An assembled context.
#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    /// System prompt carrying the transcript and chunk metadata.
    pub system: String,
    /// Prior turns that fit the budget, oldest first.
    pub history: Vec<Turn>,
    /// The new question.
    pub question: String,
    /// Heading placed above the new question when it is sent.
    pub question_marker: String,
    /// Prior turns left out to respect the budget.
    pub dropped_turns: usize,
}

impl Context {
    /// Size in characters, as counted against the budget.
    pub fn char_len(&self) -> usize {
        self.system.chars().count()
            + self.question.chars().count()
            + self.history.iter().map(|t| t.text.chars().count()).sum::<usize>()
    }

    /// The new question under its heading, as sent in the final user message.
    pub fn question_block(&self) -> String {
        if self.question_marker.is_empty() {
            return self.question.clone();
        }
        format!("{}\n{}", self.question_marker, self.question)
    }
}

/// Builds contexts from prompt templates.
pub struct ContextBuilder {
    prompts: Prompts,
}

impl ContextBuilder {
    pub fn new(prompts: Prompts) -> Self {
        Self { prompts }
    }

    /// Assemble a context.
    ///
    /// The transcript and the question are always kept; prior turns are
    /// dropped oldest first until the budget holds, and a kept history
    /// always starts with a user turn. Fails with `ContextBuildFailure` when
    /// the transcript is empty and no history remains to ground an answer.
    pub fn build(
        &self,
        transcript: &MergedTranscript,
        chunk: Option<&Chunk>,
        history: &[Turn],
        question: &str,
        budget: &ContextBudget,
    ) -> Result<Context> {
        let mut vars = HashMap::new();
        vars.insert("video_context".to_string(), transcript.text.clone());
        vars.insert("video_metadata".to_string(), describe_chunk(chunk));
        let system = self.prompts.render_with_custom(&self.prompts.chat.system, &vars);

        let fixed = system.chars().count() + question.chars().count();
        let mut remaining = budget.max_chars.saturating_sub(fixed);

        let mut start = history.len();
        for (idx, turn) in history.iter().enumerate().rev() {
            if history.len() - idx > budget.max_history_turns {
                break;
            }
            let cost = turn.text.chars().count();
            if cost > remaining {
                break;
            }
            remaining -= cost;
            start = idx;
        }
        while start < history.len() && history[start].role != Role::User {
            start += 1;
        }

        let kept = history[start..].to_vec();
        let dropped_turns = history.len() - kept.len();

        if transcript.is_empty() && kept.is_empty() {
            return Err(WarechatError::ContextBuildFailure(
                "no transcript and no conversation history to ground an answer".to_string(),
            ));
        }

        if dropped_turns > 0 {
            debug!("Dropped {} oldest turns to fit context budget", dropped_turns);
        }

        Ok(Context {
            system,
            history: kept,
            question: question.to_string(),
            question_marker: self.prompts.chat.question_marker.clone(),
            dropped_turns,
        })
    }
}

fn describe_chunk(chunk: Option<&Chunk>) -> String {
    let Some(chunk) = chunk else {
        return "unavailable".to_string();
    };

    let mut lines = vec![
        format!("warehouse_id: {}", chunk.key.warehouse_id),
        format!("camera_id: {}", chunk.key.camera_id),
        format!("chunk_id: {}", chunk.key.chunk_id),
    ];
    if let Some(start) = chunk.started_at {
        lines.push(format!("recorded_from: {}", start.to_rfc3339()));
    }
    if let Some(end) = chunk.ended_at {
        lines.push(format!("recorded_until: {}", end.to_rfc3339()));
    }
    if let Some(secs) = chunk.duration_seconds() {
        lines.push(format!("duration_seconds: {}", secs));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkKey;
    use crate::config::ChatPrompts;
    use crate::error::ErrorKind;

    fn builder() -> ContextBuilder {
        let mut prompts = Prompts::default();
        prompts.chat = ChatPrompts {
            system: "CTX[{{video_context}}]".to_string(),
            question_marker: "### Q".to_string(),
        };
        ContextBuilder::new(prompts)
    }

    fn transcript(text: &str) -> MergedTranscript {
        MergedTranscript {
            text: text.to_string(),
            part_names: vec!["p0".to_string()],
            skipped: Vec::new(),
        }
    }

    fn history(n: usize) -> Vec<Turn> {
        (0..n)
            .flat_map(|i| [Turn::user(format!("q{}", i)), Turn::assistant(format!("a{}", i))])
            .collect()
    }

    fn budget(max_chars: usize, max_history_turns: usize) -> ContextBudget {
        ContextBudget {
            max_chars,
            max_history_turns,
        }
    }

    #[test]
    fn test_build_keeps_sections_apart() {
        let ctx = builder()
            .build(&transcript("forklift"), None, &history(1), "how many?", &budget(1000, 10))
            .unwrap();

        assert_eq!(ctx.system, "CTX[forklift]");
        let turns: Vec<_> = ctx.history.iter().map(|t| (t.role, t.text.as_str())).collect();
        assert_eq!(turns, vec![(Role::User, "q0"), (Role::Assistant, "a0")]);
        assert_eq!(ctx.question_block(), "### Q\nhow many?");
        assert_eq!(ctx.dropped_turns, 0);
    }

    #[test]
    fn test_question_block_without_marker_is_bare_question() {
        let mut ctx = builder()
            .build(&transcript("t"), None, &[], "where?", &budget(1000, 10))
            .unwrap();
        assert_eq!(ctx.question_block(), "### Q\nwhere?");

        ctx.question_marker.clear();
        assert_eq!(ctx.question_block(), "where?");
    }

    #[test]
    fn test_empty_transcript_and_history_fails() {
        let err = builder()
            .build(&MergedTranscript::default(), None, &[], "anything?", &budget(1000, 10))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ContextBuildFailure);
    }

    #[test]
    fn test_history_alone_can_ground() {
        let ctx = builder()
            .build(&MergedTranscript::default(), None, &history(1), "and then?", &budget(1000, 10))
            .unwrap();
        assert_eq!(ctx.history.len(), 2);
    }

    #[test]
    fn test_oldest_turns_dropped_first() {
        // Fixed part: "CTX[t]" (6) + "q?" (2) = 8; each turn costs 2.
        let ctx = builder()
            .build(&transcript("t"), None, &history(3), "q?", &budget(8 + 4, 10))
            .unwrap();

        let texts: Vec<_> = ctx.history.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["q2", "a2"]);
        assert_eq!(ctx.dropped_turns, 4);
        assert!(ctx.char_len() <= 12);
    }

    #[test]
    fn test_turn_limit_keeps_history_starting_with_user() {
        let ctx = builder()
            .build(&transcript("t"), None, &history(3), "q?", &budget(10_000, 3))
            .unwrap();

        // The three newest are a1, q2, a2; a leading assistant turn is dropped.
        let texts: Vec<_> = ctx.history.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["q2", "a2"]);
        assert_eq!(ctx.dropped_turns, 4);
    }

    #[test]
    fn test_transcript_and_question_survive_tiny_budget() {
        let ctx = builder()
            .build(&transcript("long transcript"), None, &history(2), "question", &budget(5, 10))
            .unwrap();
        assert!(ctx.system.contains("long transcript"));
        assert_eq!(ctx.question, "question");
        assert!(ctx.history.is_empty());
    }

    #[test]
    fn test_metadata_rendered_into_default_prompt() {
        let builder = ContextBuilder::new(Prompts::default());
        let chunk = Chunk::new(ChunkKey::new("WH001", "CAM7", "chunk_1"), None);
        let ctx = builder
            .build(&transcript("bags stacked"), Some(&chunk), &[], "q", &ContextBudget::default())
            .unwrap();
        assert!(ctx.system.contains("camera_id: CAM7"));
        assert!(ctx.system.contains("bags stacked"));
        assert!(!ctx.system.contains("{{"));
    }
}
