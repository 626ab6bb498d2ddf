// ============================================================
// Layer 4 — SQuAD Feature Processor
// ============================================================
// Converts SquadExamples into fixed-length Features:
//
//   1. Tokenize the question (truncated to max_query_length)
//   2. Tokenize the context, keeping character offsets
//   3. Map the gold answer's character range to token indices
//   4. Cut the context tokens into overlapping windows
//   5. For each window build
//        [CLS] question [SEP] window [SEP] [PAD]...
//      with attention mask, segment ids and the answer span
//      (absent when the window does not hold the whole answer)
//
// Features come out grouped by example, in example order. The
// example → feature relation is one-to-many and positional:
// every feature stores the index of its example.
//
// Reference: Devlin et al. (2019) BERT §4.2
//            Rust Book §13 (Iterators and Closures)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokenizers::Tokenizer;

use crate::data::chunker::{Chunker, DocSpan};
use crate::data::loader::SquadLoader;
use crate::domain::feature::{Feature, TokenSpan};
use crate::domain::squad::{char_slice, SquadExample};
use crate::domain::traits::ExampleSource;
use crate::infra::tokenizer_store::configure_for_reader;

/// Everything that decides how text becomes features.
/// Saved inside the exported artifact so inference rebuilds
/// exactly the same inputs the reader was trained on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorSettings {
    pub do_lower_case:           bool,
    pub is_training:             bool,
    pub max_seq_length:          usize,
    pub doc_stride:              usize,
    pub max_query_length:        usize,
    pub version_2_with_negative: bool,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            do_lower_case:           true,
            is_training:             true,
            max_seq_length:          384,
            doc_stride:              128,
            max_query_length:        64,
            version_2_with_negative: false,
        }
    }
}

impl ProcessorSettings {
    /// Same settings with the training flag replaced
    pub fn for_training(&self, is_training: bool) -> Self {
        Self { is_training, ..self.clone() }
    }
}

pub struct SquadProcessor {
    tokenizer: Tokenizer,
    settings:  ProcessorSettings,
    cls_id:    u32,
    sep_id:    u32,
    pad_id:    u32,
}

impl SquadProcessor {
    /// The tokenizer is copied and its lower-casing set to
    /// `settings.do_lower_case`.
    pub fn new(tokenizer: &Tokenizer, settings: ProcessorSettings) -> Result<Self> {
        if settings.doc_stride == 0 {
            anyhow::bail!("doc_stride must be positive");
        }
        if settings.max_seq_length <= settings.max_query_length + 3 {
            anyhow::bail!(
                "max_seq_length ({}) must exceed max_query_length ({}) + 3",
                settings.max_seq_length, settings.max_query_length
            );
        }

        let tokenizer = configure_for_reader(tokenizer, settings.do_lower_case)?;
        let special = |name: &str| {
            tokenizer
                .token_to_id(name)
                .with_context(|| format!("Tokenizer has no {name} token"))
        };
        let cls_id = special("[CLS]")?;
        let sep_id = special("[SEP]")?;
        let pad_id = special("[PAD]")?;

        Ok(Self { tokenizer, settings, cls_id, sep_id, pad_id })
    }

    /// Read a SQuAD file and convert it.
    /// Returns the examples and their features, both in file order.
    pub fn process_file(&self, path: &Path) -> Result<(Vec<SquadExample>, Vec<Feature>)> {
        tracing::info!("Creating features from dataset file at '{}'", path.display());
        let loader = SquadLoader::new(
            path,
            self.settings.is_training,
            self.settings.version_2_with_negative,
        );
        let examples = loader.load_examples()?;
        let features = self.convert_examples(&examples)?;
        Ok((examples, features))
    }

    pub fn convert_examples(&self, examples: &[SquadExample]) -> Result<Vec<Feature>> {
        let mut features  = Vec::with_capacity(examples.len());
        let mut unique_id = 0usize;
        let mut absent    = 0usize;

        for (example_index, example) in examples.iter().enumerate() {
            let converted = self.convert_example(example_index, example, &mut unique_id)?;
            if converted.is_empty() {
                tracing::warn!("'{}' produced no features (empty context?)", example.qas_id);
            }
            absent += converted.iter().filter(|f| f.answer_span.is_none()).count();
            features.extend(converted);
        }

        tracing::info!(
            "Converted {} examples into {} features ({} without an answer span)",
            examples.len(), features.len(), absent
        );
        Ok(features)
    }

    fn convert_example(
        &self,
        example_index: usize,
        example:       &SquadExample,
        unique_id:     &mut usize,
    ) -> Result<Vec<Feature>> {
        let s = &self.settings;

        let q_enc = self.tokenizer
            .encode(example.question.as_str(), false)
            .map_err(|e| anyhow::anyhow!("Tokenisation error in '{}': {e}", example.qas_id))?;
        let mut query_ids = q_enc.get_ids().to_vec();
        query_ids.truncate(s.max_query_length);

        let c_enc = self.tokenizer
            .encode_char_offsets(example.context.as_str(), false)
            .map_err(|e| anyhow::anyhow!("Tokenisation error in '{}': {e}", example.qas_id))?;
        let context_ids     = c_enc.get_ids();
        let context_offsets = c_enc.get_offsets();

        let gold = if s.is_training && !example.is_impossible {
            locate_answer(example, context_offsets)
        } else {
            None
        };

        // [CLS] + question + [SEP] ... [SEP]
        let max_tokens_for_doc = s.max_seq_length - query_ids.len() - 3;
        let chunker = Chunker::new(max_tokens_for_doc, s.doc_stride);
        let spans   = chunker.chunk(context_ids.len());

        let mut features = Vec::with_capacity(spans.len());
        for (window_index, span) in spans.iter().enumerate() {
            let mut input_ids      = Vec::with_capacity(s.max_seq_length);
            let mut token_type_ids = Vec::with_capacity(s.max_seq_length);
            let mut token_offsets  = Vec::with_capacity(s.max_seq_length);
            let mut token_is_max   = Vec::with_capacity(s.max_seq_length);

            input_ids.push(self.cls_id);
            input_ids.extend_from_slice(&query_ids);
            input_ids.push(self.sep_id);
            token_type_ids.resize(input_ids.len(), 0);
            token_offsets.resize(input_ids.len(), None);
            token_is_max.resize(input_ids.len(), false);

            let context_offset = input_ids.len();
            for pos in span.start..span.end() {
                input_ids.push(context_ids[pos]);
                token_type_ids.push(1);
                token_offsets.push(Some(context_offsets[pos]));
                token_is_max.push(Chunker::is_max_context(&spans, window_index, pos));
            }
            input_ids.push(self.sep_id);
            token_type_ids.push(1);
            token_offsets.push(None);
            token_is_max.push(false);

            let mut attention_mask = vec![1u32; input_ids.len()];
            input_ids.resize(s.max_seq_length, self.pad_id);
            attention_mask.resize(s.max_seq_length, 0);
            token_type_ids.resize(s.max_seq_length, 0);
            token_offsets.resize(s.max_seq_length, None);
            token_is_max.resize(s.max_seq_length, false);

            let answer_span = gold.and_then(|g| window_span(g, span, context_offset));

            features.push(Feature {
                unique_id: *unique_id,
                example_index,
                window_index,
                input_ids,
                attention_mask,
                token_type_ids,
                answer_span,
                token_offsets,
                token_is_max_context: token_is_max,
            });
            *unique_id += 1;
        }

        Ok(features)
    }
}

/// Gold answer as (first, last) context-token index.
/// None, with a warning, when the stated offset does not point
/// at the answer text or no token overlaps it.
fn locate_answer(example: &SquadExample, offsets: &[(usize, usize)]) -> Option<(usize, usize)> {
    let answer = example.answer.as_ref()?;
    let range  = example.answer_char_range()?;

    let actual = char_slice(&example.context, range.start, range.end);
    if collapse_whitespace(&actual) != collapse_whitespace(&answer.text) {
        tracing::warn!(
            "Could not find answer in '{}': '{}' vs. '{}'",
            example.qas_id, actual, answer.text
        );
        return None;
    }

    let start = offsets.iter().position(|&(_, end)| end > range.start)?;
    let end   = offsets.iter().rposition(|&(begin, _)| begin < range.end)?;
    if start > end || offsets[start].0 >= range.end {
        tracing::warn!("Answer of '{}' covers no token", example.qas_id);
        return None;
    }
    Some((start, end))
}

/// Answer position inside one window, or None if the window
/// does not contain the whole answer.
fn window_span(gold: (usize, usize), span: &DocSpan, context_offset: usize) -> Option<TokenSpan> {
    let (start, end) = gold;
    if !(span.contains(start) && span.contains(end)) {
        return None;
    }
    Some(TokenSpan {
        start: start - span.start + context_offset,
        end:   end - span.start + context_offset,
    })
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
