// ============================================================
// Layer 3 — SQuAD Domain Types
// ============================================================
// Two views of the same data live here:
//
//   1. The on-disk JSON schema (SquadFile → articles →
//      paragraphs → qas → answers), deserialised by serde.
//   2. The flattened SquadExample: one question against one
//      context, with its gold answer. This is what the rest
//      of the pipeline works with.
//
// All offsets are CHARACTER offsets into the context, the way
// SQuAD counts `answer_start`. Never byte offsets.
//
// Reference: Rajpurkar et al. (2016) SQuAD
//            Rust Book §8 (Strings in Rust)

use serde::{Deserialize, Serialize};
use std::ops::Range;

// ─── On-disk schema ──────────────────────────────────────────────────────────

/// Top level of a SQuAD v1.1 / v2.0 JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquadFile {
    #[serde(default)]
    pub version: Option<String>,
    pub data:    Vec<SquadArticle>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquadArticle {
    #[serde(default)]
    pub title:      String,
    pub paragraphs: Vec<SquadParagraph>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquadParagraph {
    pub context: String,
    pub qas:     Vec<SquadQa>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquadQa {
    pub id:       String,
    pub question: String,
    #[serde(default)]
    pub answers:  Vec<SquadAnswer>,
    /// Only present in v2.0 files
    #[serde(default)]
    pub is_impossible: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquadAnswer {
    pub text:         String,
    pub answer_start: usize,
}

// ─── Flattened example ───────────────────────────────────────────────────────

/// The gold answer used as the training target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldAnswer {
    pub text:       String,
    /// Character offset of the first answer character in the context
    pub char_start: usize,
}

/// One question against one context passage.
/// Immutable once loaded; the processor turns it into one or
/// more Features and never modifies it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SquadExample {
    pub qas_id:        String,
    pub question:      String,
    pub context:       String,
    /// The answer used for training. None for unanswerable
    /// questions and for inference-only inputs.
    pub answer:        Option<GoldAnswer>,
    /// Every reference answer text. Used by evaluation,
    /// which takes the best score over all of them.
    pub all_answers:   Vec<String>,
    pub is_impossible: bool,
}

impl SquadExample {
    /// Build an inference-only example (no gold answer)
    pub fn unlabelled(
        qas_id:   impl Into<String>,
        question: impl Into<String>,
        context:  impl Into<String>,
    ) -> Self {
        Self {
            qas_id:        qas_id.into(),
            question:      question.into(),
            context:       context.into(),
            answer:        None,
            all_answers:   Vec::new(),
            is_impossible: false,
        }
    }

    /// Character range [start, end) of the gold answer in the context
    pub fn answer_char_range(&self) -> Option<Range<usize>> {
        self.answer.as_ref().map(|a| {
            let len = a.text.chars().count();
            a.char_start..a.char_start + len
        })
    }
}

/// Slice a string by character positions [start, end).
/// Out-of-range positions are clamped, never panic.
pub fn char_slice(text: &str, start: usize, end: usize) -> String {
    text.chars()
        .skip(start)
        .take(end.saturating_sub(start))
        .collect()
}
