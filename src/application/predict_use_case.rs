// ============================================================
// Layer 2 — Predict Use Case
// ============================================================
// Answers a single question against a context with an
// exported reader (bert_qa_vCPU.mpk). Everything runs on the
// host backend; no accelerator is needed.

use anyhow::{Context, Result};
use burn::backend::ndarray::NdArrayDevice;
use std::path::Path;

use crate::domain::{prediction::Prediction, traits::QuestionAnswerer};
use crate::ml::{
    exporter::{load_artifact, HostBackend},
    inferencer::{InferenceSettings, Inferencer},
};

pub struct PredictUseCase {
    inferencer: Inferencer<HostBackend>,
}

impl PredictUseCase {
    pub fn new(artifact: &Path, settings: InferenceSettings) -> Result<Self> {
        let reader = load_artifact(artifact, &NdArrayDevice::Cpu)
            .with_context(|| format!("Cannot load reader '{}'. Have you run 'train' first?", artifact.display()))?;
        let inferencer = Inferencer::new(reader, settings)?;
        Ok(Self { inferencer })
    }

    pub fn answer(&self, question: &str, context: &str) -> Result<Prediction> {
        if question.trim().is_empty() {
            anyhow::bail!("Question is empty");
        }
        if context.trim().is_empty() {
            anyhow::bail!("Context is empty");
        }
        self.inferencer.answer(question, context)
    }
}
