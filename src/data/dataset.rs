use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::domain::feature::Feature;

/// One fully tokenised and padded training sample.
/// Sequence format: [CLS] question [SEP] context [SEP] [PAD]...
///
/// Windows without the answer point both positions at 0, the
/// [CLS] slot, which is how the model learns "not in here".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaSample {
    pub input_ids:      Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub token_type_ids: Vec<u32>,
    pub start_position: usize,
    pub end_position:   usize,
}

impl From<&Feature> for QaSample {
    fn from(feature: &Feature) -> Self {
        let (start_position, end_position) = feature
            .answer_span
            .map(|span| (span.start, span.end))
            .unwrap_or((0, 0));

        Self {
            input_ids:      feature.input_ids.clone(),
            attention_mask: feature.attention_mask.clone(),
            token_type_ids: feature.token_type_ids.clone(),
            start_position,
            end_position,
        }
    }
}

pub struct QaDataset {
    samples: Vec<QaSample>,
}

impl QaDataset {
    pub fn new(samples: Vec<QaSample>) -> Self { Self { samples } }

    pub fn from_features(features: &[Feature]) -> Self {
        Self::new(features.iter().map(QaSample::from).collect())
    }
}

impl Dataset<QaSample> for QaDataset {
    fn get(&self, index: usize) -> Option<QaSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
