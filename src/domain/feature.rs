// ============================================================
// Layer 3 — Feature Domain Type
// ============================================================
// A Feature is one (question, context-window) pair turned
// into fixed-length model input:
//
//   [CLS] question [SEP] context-window [SEP] [PAD] ...
//
// Besides the model inputs it keeps the bookkeeping needed to
// go back from token positions to text:
//   - example_index  → which SquadExample it came from
//   - token_offsets  → character range of each context token
//   - token_is_max_context → whether this window is the best
//     window to predict that token from
//
// Example:
//   Question: "What color is the sky?"
//   Context:  "The sky is blue."
//   Answer:   token span covering "blue" → answer_span
//
// Reference: Devlin et al. (2019) - BERT paper §4.2 (SQuAD)

use serde::{Deserialize, Serialize};

use crate::domain::squad::char_slice;

/// An inclusive token span [start, end] indexing into input_ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSpan {
    pub start: usize,
    pub end:   usize,
}

/// Fixed-length model input for one context window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    /// Running id, unique across one processing pass
    pub unique_id:      usize,
    /// Position of the source SquadExample in the example list
    pub example_index:  usize,
    /// Which window of the example's context this is (0-based)
    pub window_index:   usize,
    pub input_ids:      Vec<u32>,
    /// 1 = real token, 0 = padding
    pub attention_mask: Vec<u32>,
    /// 0 = [CLS] question [SEP], 1 = context window [SEP]
    pub token_type_ids: Vec<u32>,
    /// Gold answer span. None when the answer is not fully
    /// inside this window, the question is unanswerable,
    /// or the answer could not be located.
    pub answer_span:    Option<TokenSpan>,
    /// Character offsets into the context for every position.
    /// None for [CLS], question, [SEP] and padding positions.
    pub token_offsets:  Vec<Option<(usize, usize)>>,
    pub token_is_max_context: Vec<bool>,
}

impl Feature {
    /// Whether position `pos` holds a context token
    pub fn is_context_token(&self, pos: usize) -> bool {
        matches!(self.token_offsets.get(pos), Some(Some(_)))
    }

    /// Original context text covered by token positions [start, end].
    /// Returns None if either end is not a context token.
    pub fn span_text(&self, context: &str, start: usize, end: usize) -> Option<String> {
        let (char_start, _) = (*self.token_offsets.get(start)?)?;
        let (_, char_end)   = (*self.token_offsets.get(end)?)?;
        if char_end < char_start {
            return None;
        }
        Some(char_slice(context, char_start, char_end))
    }
}

// Gold-span views used to check the processor's output
#[cfg(test)]
impl Feature {
    /// Original context text of the gold answer span, if present
    pub fn answer_text(&self, context: &str) -> Option<String> {
        let span = self.answer_span?;
        self.span_text(context, span.start, span.end)
    }

    /// Token ids of the gold answer span, if present
    pub fn answer_ids(&self) -> Option<&[u32]> {
        let span = self.answer_span?;
        self.input_ids.get(span.start..=span.end)
    }
}
