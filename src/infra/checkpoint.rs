// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Owns the training output directory:
//
//   output_dir/
//     train_config.json         ← the TrainConfig of the run
//     metrics.csv               ← see infra::metrics
//     checkpoint-50/
//       model.mpk.gz            ← weights (full precision, gzipped)
//       config.json             ← BertConfig
//       tokenizer.json          ← tokenizer
//       training_args.json      ← TrainConfig at save time
//     checkpoint-100/
//     ...
//
// A checkpoint directory has the same layout as a pretrained
// model directory, so ml::pretrained::load_reader can read it
// back, for evaluation or to seed a new run.
//
// One directory holds one run. A new run refuses a non-empty
// directory unless told to overwrite it, and then starts by
// removing the previous run's checkpoints and metrics.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder, Recorder},
};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tokenizers::Tokenizer;

use crate::application::train_use_case::TrainConfig;
use crate::infra::metrics::METRICS_FILE;
use crate::infra::tokenizer_store::TokenizerStore;
use crate::ml::model::{BertConfig, BertQaModel};
use crate::ml::pretrained::{CONFIG_FILE, MODEL_STEM};

pub const TRAIN_CONFIG_FILE:  &str = "train_config.json";
pub const TRAINING_ARGS_FILE: &str = "training_args.json";
const CHECKPOINT_PREFIX:      &str = "checkpoint-";

/// Manages saving and loading of step checkpoints.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Open an existing (or new) output directory as is
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create output directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Open `dir` for a fresh training run.
    /// Fails if `dir` already has content and `overwrite` is false.
    pub fn for_new_run(dir: impl AsRef<Path>, overwrite: bool) -> Result<Self> {
        let dir = dir.as_ref();
        let has_content = match fs::read_dir(dir) {
            Ok(mut entries) => entries.next().is_some(),
            Err(_)          => false,
        };

        if has_content {
            if !overwrite {
                anyhow::bail!(
                    "Output directory '{}' already exists and is not empty. \
                     Use --overwrite-output-dir to replace its contents.",
                    dir.display()
                );
            }
            let mgr = Self::new(dir)?;
            mgr.clear_previous_run()?;
            return Ok(mgr);
        }

        Self::new(dir)
    }

    // Removes the checkpoint-* directories and metrics.csv of an
    // earlier run; anything else in the directory is left alone
    fn clear_previous_run(&self) -> Result<()> {
        for step in self.list_steps()? {
            let ckpt = self.checkpoint_dir(step);
            fs::remove_dir_all(&ckpt)
                .with_context(|| format!("Cannot remove old checkpoint '{}'", ckpt.display()))?;
        }
        let metrics = self.dir.join(METRICS_FILE);
        if metrics.exists() {
            fs::remove_file(&metrics)
                .with_context(|| format!("Cannot remove old metrics '{}'", metrics.display()))?;
        }
        tracing::warn!("Overwriting previous run in '{}'", self.dir.display());
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn checkpoint_dir(&self, step: usize) -> PathBuf {
        self.dir.join(format!("{CHECKPOINT_PREFIX}{step}"))
    }

    /// Write `model` and everything needed to reload it into checkpoint-{step}/
    pub fn save_step<B: Backend>(
        &self,
        step:      usize,
        model:     &BertQaModel<B>,
        config:    &BertConfig,
        tokenizer: &Tokenizer,
        args:      &TrainConfig,
    ) -> Result<PathBuf> {
        let dir = self.checkpoint_dir(step);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;

        let path = dir.join(MODEL_STEM);
        NamedMpkGzFileRecorder::<FullPrecisionSettings>::new()
            .record(model.clone().into_record(), path.clone())
            .map_err(|e| anyhow::anyhow!("Failed to save checkpoint to '{}': {e:?}", path.display()))?;

        config
            .save(dir.join(CONFIG_FILE))
            .with_context(|| format!("Cannot write model config into '{}'", dir.display()))?;
        TokenizerStore::new(&dir).save(tokenizer)?;
        write_json(&dir.join(TRAINING_ARGS_FILE), args)?;

        tracing::info!("Saved model checkpoint to '{}'", dir.display());
        Ok(dir)
    }

    /// Steps of every checkpoint in the directory, ascending
    pub fn list_steps(&self) -> Result<Vec<usize>> {
        let mut steps: Vec<usize> = fs::read_dir(&self.dir)
            .with_context(|| format!("Cannot list '{}'", self.dir.display()))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(|name| name.strip_prefix(CHECKPOINT_PREFIX))
                    .and_then(|step| step.parse().ok())
            })
            .collect();
        steps.sort_unstable();
        Ok(steps)
    }

    /// TrainConfig that was in effect when checkpoint-{step} was written
    pub fn load_step_args(&self, step: usize) -> Result<TrainConfig> {
        read_json(&self.checkpoint_dir(step).join(TRAINING_ARGS_FILE))
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        write_json(&self.dir.join(TRAIN_CONFIG_FILE), cfg)
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Cannot write '{}'", path.display()))?;
    tracing::debug!("Wrote '{}'", path.display());
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Cannot read '{}'", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("'{}' is not valid", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::stage::Placement;
    use crate::ml::pretrained::load_reader;
    use crate::test_support::{tiny_reader, tiny_settings};
    use burn::backend::NdArray;

    fn head_bias<B: Backend>(model: &BertQaModel<B>) -> Vec<f32> {
        model.qa_outputs.bias.as_ref().unwrap().val().into_data().convert::<f32>().to_vec().unwrap()
    }

    #[test]
    fn test_config_is_written_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = CheckpointManager::new(dir.path()).unwrap();

        let cfg = TrainConfig { num_train_epochs: 7, ..TrainConfig::default() };
        mgr.save_config(&cfg).unwrap();
        let back: TrainConfig = read_json(&dir.path().join(TRAIN_CONFIG_FILE)).unwrap();
        assert_eq!(back.num_train_epochs, 7);
    }

    #[test]
    fn test_step_checkpoint_reloads_as_pretrained_dir() {
        let dir    = tempfile::tempdir().unwrap();
        let device = Default::default();
        let mgr    = CheckpointManager::new(dir.path()).unwrap();
        let reader = tiny_reader::<NdArray>(&device);

        for step in [100, 50] {
            mgr.save_step(step, reader.model(), reader.config(), reader.tokenizer(), &TrainConfig::default())
                .unwrap();
        }
        // A stray directory that is not a checkpoint
        fs::create_dir(dir.path().join("checkpoint-latest")).unwrap();
        assert_eq!(mgr.list_steps().unwrap(), vec![50, 100]);

        let ckpt = mgr.checkpoint_dir(50);
        assert!(ckpt.join("model.mpk.gz").exists());
        assert!(mgr.load_step_args(50).is_ok());

        let reloaded = load_reader::<NdArray>(&ckpt, tiny_settings(), &device, Placement::Host).unwrap();
        assert_eq!(reloaded.config().num_hidden_layers, reader.config().num_hidden_layers);
        // Stored at full precision: weights come back bit for bit
        assert_eq!(head_bias(reloaded.model()), head_bias(reader.model()));
    }

    #[test]
    fn test_new_run_refuses_a_used_directory() {
        let dir = tempfile::tempdir().unwrap();
        // Empty (or missing) directories are fine
        assert!(CheckpointManager::for_new_run(dir.path(), false).is_ok());
        assert!(CheckpointManager::for_new_run(dir.path().join("fresh"), false).is_ok());

        fs::write(dir.path().join(METRICS_FILE), "step,epoch,learning_rate,loss\n").unwrap();
        assert!(CheckpointManager::for_new_run(dir.path(), false).is_err());
        // Nothing was removed by the refusal
        assert!(dir.path().join(METRICS_FILE).exists());
    }

    #[test]
    fn test_overwrite_clears_previous_checkpoints_and_metrics() {
        let dir    = tempfile::tempdir().unwrap();
        let reader = tiny_reader::<NdArray>(&Default::default());
        let old    = CheckpointManager::new(dir.path()).unwrap();
        old.save_step(1, reader.model(), reader.config(), reader.tokenizer(), &TrainConfig::default())
            .unwrap();
        fs::write(dir.path().join(METRICS_FILE), "step,epoch,learning_rate,loss\n1,1,0.1,2.0\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "kept").unwrap();

        let mgr = CheckpointManager::for_new_run(dir.path(), true).unwrap();
        assert!(mgr.list_steps().unwrap().is_empty());
        assert!(!dir.path().join(METRICS_FILE).exists());
        assert!(dir.path().join("notes.txt").exists());
    }
}
