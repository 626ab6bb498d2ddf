// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Answers questions with a Reader:
//
//   1. Build inference-mode features (same settings as training)
//   2. Run the model on every window, in batches
//   3. Per example, search the n-best start × end logits of
//      every window for the best valid span
//   4. Map the span back to the original context text through
//      the token character offsets
//
// A span is valid when both ends are context tokens, the start
// token is in its max-context window, end ≥ start, and it is
// at most max_answer_length tokens long.
//
// With SQuAD v2.0 the [CLS] position scores "no answer"; the
// reader abstains (empty text) when
//   null_score - best_span_score > null_score_diff_threshold
//
// Reference: Devlin et al. (2019) BERT §4.2–4.3

use anyhow::{Context, Result};
use burn::{data::dataloader::batcher::Batcher, prelude::*};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::data::{batcher::QaBatcher, dataset::QaSample, processor::SquadProcessor};
use crate::domain::{
    feature::Feature,
    prediction::{Prediction, ScoredSpan},
    squad::SquadExample,
    traits::QuestionAnswerer,
};
use crate::ml::error::ReaderError;
use crate::ml::reader::Reader;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceSettings {
    pub n_best_size:               usize,
    pub max_answer_length:         usize,
    pub null_score_diff_threshold: f32,
    pub eval_batch_size:           usize,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            n_best_size:               20,
            max_answer_length:         30,
            null_score_diff_threshold: 0.0,
            eval_batch_size:           8,
        }
    }
}

/// Start and end logits of one feature, unpadded to seq_len
struct FeatureLogits {
    start: Vec<f32>,
    end:   Vec<f32>,
}

struct Candidate {
    feature: usize,
    start:   usize,
    end:     usize,
    score:   f32,
}

pub struct Inferencer<B: Backend> {
    reader:    Reader<B>,
    processor: SquadProcessor,
    settings:  InferenceSettings,
}

impl<B: Backend> Inferencer<B> {
    pub fn new(reader: Reader<B>, settings: InferenceSettings) -> Result<Self> {
        if settings.n_best_size == 0 || settings.eval_batch_size == 0 {
            anyhow::bail!("n_best_size and eval_batch_size must be positive");
        }
        let processor = SquadProcessor::new(
            reader.tokenizer(),
            reader.settings().for_training(false),
        )?;
        Ok(Self { reader, processor, settings })
    }

    pub fn predict(&self, question: &str, context: &str) -> Result<Prediction> {
        let example = SquadExample::unlabelled("0", question, context);
        self.predict_examples(std::slice::from_ref(&example))?
            .pop()
            .context("No prediction produced")
    }

    /// One prediction per example, in example order
    pub fn predict_examples(&self, examples: &[SquadExample]) -> Result<Vec<Prediction>> {
        let features = self.processor.convert_examples(examples)?;
        let logits   = self.run_features(&features)?;

        let mut by_example: Vec<Vec<usize>> = vec![Vec::new(); examples.len()];
        for (i, f) in features.iter().enumerate() {
            by_example[f.example_index].push(i);
        }

        Ok(examples
            .iter()
            .zip(by_example)
            .map(|(example, indices)| self.best_answer(example, &indices, &features, &logits))
            .collect())
    }

    fn run_features(&self, features: &[Feature]) -> Result<Vec<FeatureLogits>> {
        let batcher = QaBatcher::<B>::new(self.reader.device().clone());
        let model   = self.reader.model();
        let mut out = Vec::with_capacity(features.len());

        for chunk in features.chunks(self.settings.eval_batch_size) {
            let batch = batcher.batch(chunk.iter().map(QaSample::from).collect());
            let [batch_size, seq_len] = batch.input_ids.dims();
            let output = model.forward(batch.input_ids, batch.token_type_ids, batch.attention_mask);

            let start = to_vec(output.start_logits)?;
            let end   = to_vec(output.end_logits)?;
            for row in 0..batch_size {
                let range = row * seq_len..(row + 1) * seq_len;
                out.push(FeatureLogits {
                    start: start[range.clone()].to_vec(),
                    end:   end[range].to_vec(),
                });
            }
        }
        Ok(out)
    }

    fn best_answer(
        &self,
        example:  &SquadExample,
        indices:  &[usize],
        features: &[Feature],
        logits:   &[FeatureLogits],
    ) -> Prediction {
        let s = &self.settings;
        let with_null = self.reader.settings().version_2_with_negative;

        let mut candidates = Vec::new();
        let mut null_score = f32::INFINITY;

        for &fi in indices {
            let (feature, fl) = (&features[fi], &logits[fi]);

            // Smallest [CLS] score over the windows
            null_score = null_score.min(fl.start[0] + fl.end[0]);

            for &start in &top_k(&fl.start, s.n_best_size) {
                for &end in &top_k(&fl.end, s.n_best_size) {
                    if !feature.is_context_token(start) || !feature.is_context_token(end) {
                        continue;
                    }
                    if !feature.token_is_max_context[start] {
                        continue;
                    }
                    if end < start || end - start + 1 > s.max_answer_length {
                        continue;
                    }
                    candidates.push(Candidate {
                        feature: fi,
                        start,
                        end,
                        score: fl.start[start] + fl.end[end],
                    });
                }
            }
        }
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

        // ── n-best list, one entry per distinct text ──────────────────────────
        let mut seen   = HashSet::new();
        let mut n_best: Vec<(String, f32)> = Vec::new();
        for c in &candidates {
            if n_best.len() >= s.n_best_size {
                break;
            }
            let Some(text) = features[c.feature].span_text(&example.context, c.start, c.end) else {
                continue;
            };
            if seen.insert(text.clone()) {
                n_best.push((text, c.score));
            }
        }

        let best_span = n_best.iter().find(|(text, _)| !text.is_empty()).cloned();
        let score     = best_span.as_ref().map(|(_, sc)| *sc).unwrap_or(f32::NEG_INFINITY);

        let null_score = (with_null && null_score.is_finite()).then_some(null_score);
        if let Some(null) = null_score {
            if !seen.contains("") {
                n_best.push((String::new(), null));
                n_best.sort_by(|a, b| b.1.total_cmp(&a.1));
            }
        }

        let text = match (best_span, null_score) {
            (None, _) => String::new(),
            (Some(_), Some(null)) if null - score > s.null_score_diff_threshold => String::new(),
            (Some((text, _)), _) => text,
        };

        let probabilities = softmax(&n_best.iter().map(|(_, sc)| *sc).collect::<Vec<_>>());
        let n_best = n_best
            .into_iter()
            .zip(probabilities)
            .map(|((text, score), probability)| ScoredSpan { text, score, probability })
            .collect();

        tracing::debug!("'{}' → '{}' (score {:.3})", example.qas_id, text, score);
        Prediction { qas_id: example.qas_id.clone(), text, score, null_score, n_best }
    }
}

impl<B: Backend> QuestionAnswerer for Inferencer<B> {
    fn answer(&self, question: &str, context: &str) -> Result<Prediction> {
        self.predict(question, context)
    }
}

fn to_vec<B: Backend>(t: Tensor<B, 2>) -> Result<Vec<f32>, ReaderError> {
    t.into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| ReaderError::Data(format!("{e:?}")))
}

/// Indices of the `k` largest values, largest first
fn top_k(values: &[f32], k: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..values.len()).collect();
    indices.sort_by(|&a, &b| values[b].total_cmp(&values[a]));
    indices.truncate(k);
    indices
}

fn softmax(scores: &[f32]) -> Vec<f32> {
    let Some(max) = scores.iter().copied().reduce(f32::max) else {
        return Vec::new();
    };
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::feature::TokenSpan;
    use crate::test_support::{sky_example, tiny_reader};
    use burn::backend::NdArray;

    #[test]
    fn test_top_k_orders_by_value() {
        assert_eq!(top_k(&[0.1, 3.0, -1.0, 2.0], 2), vec![1, 3]);
        assert_eq!(top_k(&[1.0], 5), vec![0]);
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let p = softmax(&[1.0, 2.0, 3.0]);
        assert!((p.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(p[2] > p[1] && p[1] > p[0]);
        assert!(softmax(&[]).is_empty());
    }

    fn fixed_feature() -> Feature {
        // [CLS] q [SEP] the sky is blue . [SEP]
        Feature {
            unique_id:      0,
            example_index:  0,
            window_index:   0,
            input_ids:      vec![2, 11, 3, 5, 6, 7, 8, 10, 3],
            attention_mask: vec![1; 9],
            token_type_ids: vec![0, 0, 0, 1, 1, 1, 1, 1, 1],
            answer_span:    None::<TokenSpan>,
            token_offsets:  vec![
                None, None, None,
                Some((0, 3)), Some((4, 7)), Some((8, 10)), Some((11, 15)), Some((15, 16)),
                None,
            ],
            token_is_max_context: vec![false, false, false, true, true, true, true, true, false],
        }
    }

    fn inferencer(v2: bool) -> Inferencer<NdArray> {
        let reader = tiny_reader::<NdArray>(&Default::default());
        let mut settings = reader.settings().clone();
        settings.version_2_with_negative = v2;
        let (model, config, _, tokenizer) = reader.into_parts();
        let reader = Reader::pretrained(
            model, config, settings, tokenizer, Default::default(),
            crate::domain::stage::Placement::Host,
        ).unwrap();
        Inferencer::new(reader, InferenceSettings::default()).unwrap()
    }

    fn logits(start_at: usize, end_at: usize, cls: f32) -> FeatureLogits {
        let mut start = vec![0.0; 9];
        let mut end   = vec![0.0; 9];
        start[start_at] = 5.0;
        end[end_at]     = 5.0;
        start[0] = cls;
        end[0]   = cls;
        FeatureLogits { start, end }
    }

    #[test]
    fn test_best_span_maps_back_to_context_text() {
        let inf = inferencer(false);
        let example = sky_example();
        let p = inf.best_answer(&example, &[0], &[fixed_feature()], &[logits(6, 6, 0.0)]);
        assert_eq!(p.text, "blue");
        assert_eq!(p.score, 10.0);
        assert!(p.null_score.is_none());
        assert_eq!(p.n_best[0].text, "blue");
    }

    #[test]
    fn test_reversed_and_question_spans_are_skipped() {
        let inf = inferencer(false);
        let example = sky_example();
        // Best start ("blue") is after best end ("sky"), and the top
        // start logit sits on a question token
        let mut fl = logits(6, 4, 0.0);
        fl.start[1] = 9.0;
        fl.start[4] = 1.0;
        let p = inf.best_answer(&example, &[0], &[fixed_feature()], &[fl]);
        // [sky, sky] = 1 + 5 beats [blue, blue] = 5 + 0
        assert_eq!(p.text, "sky");
        assert_eq!(p.score, 6.0);
    }

    #[test]
    fn test_null_answer_wins_when_cls_scores_higher() {
        let inf = inferencer(true);
        let example = sky_example();
        let p = inf.best_answer(&example, &[0], &[fixed_feature()], &[logits(6, 6, 8.0)]);
        assert_eq!(p.text, "");
        assert_eq!(p.null_score, Some(16.0));
        assert!(p.n_best.iter().any(|s| s.text.is_empty()));

        let p = inf.best_answer(&example, &[0], &[fixed_feature()], &[logits(6, 6, 1.0)]);
        assert_eq!(p.text, "blue");
    }

    #[test]
    fn test_predict_returns_a_context_substring() {
        let inf = inferencer(false);
        let p = inf.answer("What color is the sky?", "The sky is blue.").unwrap();
        assert_eq!(p.qas_id, "0");
        assert!("The sky is blue.".contains(&p.text));
        assert!(!p.n_best.is_empty());
        let total: f32 = p.n_best.iter().map(|s| s.probability).sum();
        assert!((total - 1.0).abs() < 1e-4);
    }
}
