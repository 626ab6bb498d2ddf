// ============================================================
// Layer 2 — Evaluate Use Case
// ============================================================
// Scores readers on a SQuAD dev file:
//
//   Step 1: Load the dev examples (inference mode)
//   Step 2: Predict every question            (Layer 5 - ml)
//   Step 3: Write predictions / n-best JSON   (output_dir)
//   Step 4: Exact match and F1                (Layer 4 - data)
//           v2.0 adds HasAns / NoAns splits and the best
//           null threshold found by sweeping the null odds
//
// The exported bert_qa_vCPU.mpk is always evaluated. With
// all_checkpoints set, every checkpoint-{step}/ of the run is
// evaluated as well, each writing predictions_{step}.json.

use anyhow::{Context, Result};
use burn::backend::ndarray::NdArrayDevice;
use serde::Serialize;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use crate::data::{
    loader::SquadLoader,
    squad_metrics::{evaluate, ScoredQuestion, SquadEval},
};
use crate::domain::{prediction::Prediction, stage::Placement, traits::ExampleSource};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{
    exporter::{artifact_path, load_artifact, HostBackend},
    inferencer::{InferenceSettings, Inferencer},
    pretrained::load_reader,
    reader::Reader,
};

#[derive(Debug, Clone, Serialize)]
pub struct EvalResult {
    /// "final" for the exported reader, otherwise the checkpoint step
    pub label:       String,
    pub scores:      SquadEval,
    pub predictions: PathBuf,
}

pub struct EvaluateUseCase {
    output_dir:      PathBuf,
    settings:        InferenceSettings,
    all_checkpoints: bool,
}

impl EvaluateUseCase {
    pub fn new(output_dir: impl Into<PathBuf>, settings: InferenceSettings, all_checkpoints: bool) -> Self {
        Self { output_dir: output_dir.into(), settings, all_checkpoints }
    }

    pub fn execute(&self, dev_file: &Path) -> Result<Vec<EvalResult>> {
        let device = NdArrayDevice::Cpu;
        let mut results = Vec::new();

        if self.all_checkpoints {
            let checkpoints = CheckpointManager::new(&self.output_dir)?;
            let steps = checkpoints.list_steps()?;
            tracing::info!("Evaluating checkpoints {:?}", steps);

            for step in steps {
                let args   = checkpoints.load_step_args(step)?;
                let reader = load_reader::<HostBackend>(
                    &checkpoints.checkpoint_dir(step),
                    args.processor_settings().for_training(false),
                    &device,
                    Placement::Host,
                )?;
                results.push(self.evaluate_reader(reader, dev_file, &step.to_string())?);
            }
        }

        let artifact = artifact_path(&self.output_dir);
        let reader = load_artifact(&artifact, &device)
            .with_context(|| format!("Cannot load reader '{}'. Have you run 'train' first?", artifact.display()))?;
        results.push(self.evaluate_reader(reader, dev_file, "final")?);

        for r in &results {
            tracing::info!(
                "Results [{}]: exact = {:.2}, f1 = {:.2}, total = {}",
                r.label, r.scores.overall.exact, r.scores.overall.f1, r.scores.overall.total
            );
            if let Some(best) = &r.scores.best {
                tracing::info!(
                    "Results [{}]: best_exact = {:.2} (thresh {:.3}), best_f1 = {:.2} (thresh {:.3})",
                    r.label, best.best_exact, best.best_exact_thresh, best.best_f1, best.best_f1_thresh
                );
            }
        }
        Ok(results)
    }

    fn evaluate_reader(&self, reader: Reader<HostBackend>, dev_file: &Path, label: &str) -> Result<EvalResult> {
        let v2 = reader.settings().version_2_with_negative;
        let examples = SquadLoader::new(dev_file, false, v2).load_examples()?;

        let inferencer  = Inferencer::new(reader, self.settings.clone())?;
        let predictions = inferencer.predict_examples(&examples)?;

        let suffix = if label == "final" { String::new() } else { format!("_{label}") };
        let predictions_path = self.output_dir.join(format!("predictions{suffix}.json"));
        write_predictions(&predictions, &predictions_path)?;
        write_nbest(&predictions, &self.output_dir.join(format!("nbest_predictions{suffix}.json")))?;
        if v2 {
            write_null_odds(&predictions, &self.output_dir.join(format!("null_odds{suffix}.json")))?;
        }

        let questions: Vec<ScoredQuestion<'_>> = examples
            .iter()
            .zip(&predictions)
            .map(|(e, p)| ScoredQuestion {
                prediction: p.text.as_str(),
                golds:      e.all_answers.as_slice(),
                null_odds:  p.null_score.map(|null| null - p.score),
            })
            .collect();
        let scores = evaluate(&questions);

        Ok(EvalResult { label: label.to_string(), scores, predictions: predictions_path })
    }
}

/// `{qas_id: answer}`, the format the official evaluation script reads
pub fn write_predictions(predictions: &[Prediction], path: &Path) -> Result<()> {
    let map: BTreeMap<&str, &str> = predictions
        .iter()
        .map(|p| (p.qas_id.as_str(), p.text.as_str()))
        .collect();
    write_json(path, &map)
}

fn write_nbest(predictions: &[Prediction], path: &Path) -> Result<()> {
    let map: BTreeMap<&str, _> = predictions
        .iter()
        .map(|p| (p.qas_id.as_str(), &p.n_best))
        .collect();
    write_json(path, &map)
}

// null score minus best span score, per question
fn write_null_odds(predictions: &[Prediction], path: &Path) -> Result<()> {
    let map: BTreeMap<&str, f32> = predictions
        .iter()
        .filter_map(|p| p.null_score.map(|null| (p.qas_id.as_str(), null - p.score)))
        .collect();
    write_json(path, &map)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Cannot write '{}'", path.display()))?;
    tracing::info!("Wrote '{}'", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::TrainConfig;
    use crate::test_support::{sky_squad_json, tiny_reader, write_tiny_artifact};

    #[test]
    fn test_writes_predictions_and_scores_every_question() {
        let dir = tempfile::tempdir().unwrap();
        write_tiny_artifact(dir.path());
        let dev = dir.path().join("dev.json");
        fs::write(&dev, sky_squad_json()).unwrap();

        let results = EvaluateUseCase::new(dir.path(), InferenceSettings::default(), false)
            .execute(&dev)
            .unwrap();
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(r.label, "final");
        assert_eq!(r.scores.overall.total, 1);
        assert!((0.0..=100.0).contains(&r.scores.overall.f1));
        // v1.1 reader: all questions answerable, no null odds to sweep
        assert_eq!(r.scores.has_ans.map(|s| s.total), Some(1));
        assert!(r.scores.no_ans.is_none());
        assert!(r.scores.best.is_none());

        let json: BTreeMap<String, String> =
            serde_json::from_str(&fs::read_to_string(&r.predictions).unwrap()).unwrap();
        assert!(json.contains_key("sky-1"));
        assert!(dir.path().join("nbest_predictions.json").exists());
    }

    #[test]
    fn test_all_checkpoints_are_evaluated() {
        let dir = tempfile::tempdir().unwrap();
        write_tiny_artifact(dir.path());
        let dev = dir.path().join("dev.json");
        fs::write(&dev, sky_squad_json()).unwrap();

        let reader = tiny_reader::<HostBackend>(&NdArrayDevice::Cpu);
        let args   = TrainConfig {
            max_seq_length:   reader.settings().max_seq_length,
            doc_stride:       reader.settings().doc_stride,
            max_query_length: reader.settings().max_query_length,
            ..TrainConfig::default()
        };
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        ckpt.save_step(50, reader.model(), reader.config(), reader.tokenizer(), &args).unwrap();

        let results = EvaluateUseCase::new(dir.path(), InferenceSettings::default(), true)
            .execute(&dev)
            .unwrap();
        let labels: Vec<&str> = results.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["50", "final"]);
        assert!(dir.path().join("predictions_50.json").exists());
    }

    #[test]
    fn test_missing_reader_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let dev = dir.path().join("dev.json");
        fs::write(&dev, sky_squad_json()).unwrap();
        assert!(EvaluateUseCase::new(dir.path(), InferenceSettings::default(), false)
            .execute(&dev)
            .is_err());
    }
}
