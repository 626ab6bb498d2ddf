use serde::{Deserialize, Serialize};

/// One candidate answer with its raw score (start + end logit)
/// and its softmax probability among the n-best candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredSpan {
    pub text:        String,
    pub score:       f32,
    pub probability: f32,
}

/// The reader's answer for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub qas_id: String,
    /// Best answer text; empty when the reader abstains
    pub text:   String,
    /// Score of the best non-null span (NEG_INFINITY if none)
    pub score:  f32,
    /// Score of the [CLS] "no answer" span (v2.0 only)
    pub null_score: Option<f32>,
    pub n_best: Vec<ScoredSpan>,
}

impl Prediction {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}
