// ============================================================
// Layer 4 — Q&A Batcher
// ============================================================
// Stacks QaSamples into the five tensors one forward/backward
// pass needs. Every feature already has max_seq_length tokens,
// so rows are concatenated and reshaped to [N, S] with no
// padding step here. Span positions become [N] vectors; an
// absent span is already position 0 ([CLS]).
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::TensorData,
};

use crate::data::dataset::QaSample;

// ─── QaBatch ──────────────────────────────────────────────────────────────────
/// A batch of Q&A samples ready for the model forward pass.
/// All tensors have batch_size as their first dimension.
#[derive(Debug, Clone)]
pub struct QaBatch<B: Backend> {
    /// [batch_size, seq_len]
    pub input_ids: Tensor<B, 2, Int>,

    /// [batch_size, seq_len], 1 = real token, 0 = padding
    pub attention_mask: Tensor<B, 2, Int>,

    /// [batch_size, seq_len], 0 = question segment, 1 = context segment
    pub token_type_ids: Tensor<B, 2, Int>,

    /// [batch_size]
    pub start_positions: Tensor<B, 1, Int>,

    /// [batch_size]
    pub end_positions: Tensor<B, 1, Int>,
}

// ─── QaBatcher ────────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct QaBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> QaBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    fn matrix(&self, items: &[QaSample], field: fn(&QaSample) -> &[u32]) -> Tensor<B, 2, Int> {
        let batch_size = items.len();
        let seq_len    = items.first().map(|s| field(s).len()).unwrap_or(0);
        let flat: Vec<i64> = items
            .iter()
            .flat_map(|s| field(s).iter().map(|&x| x as i64))
            .collect();
        Tensor::from_data(TensorData::new(flat, [batch_size, seq_len]), &self.device)
    }

    fn vector(&self, items: &[QaSample], field: fn(&QaSample) -> usize) -> Tensor<B, 1, Int> {
        let values: Vec<i64> = items.iter().map(|s| field(s) as i64).collect();
        let len = values.len();
        Tensor::from_data(TensorData::new(values, [len]), &self.device)
    }
}

// ─── Burn Batcher Trait Implementation ────────────────────────────────────────
impl<B: Backend> Batcher<QaSample, QaBatch<B>> for QaBatcher<B> {
    fn batch(&self, items: Vec<QaSample>) -> QaBatch<B> {
        QaBatch {
            input_ids:       self.matrix(&items, |s| s.input_ids.as_slice()),
            attention_mask:  self.matrix(&items, |s| s.attention_mask.as_slice()),
            token_type_ids:  self.matrix(&items, |s| s.token_type_ids.as_slice()),
            start_positions: self.vector(&items, |s| s.start_position),
            end_positions:   self.vector(&items, |s| s.end_position),
        }
    }
}
