// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full fine-tuning pipeline in order:
//
//   Step 0: Claim the output directory        (Layer 6 - infra)
//   Step 1: Persist the run configuration     (Layer 6 - infra)
//   Step 2: Load the pretrained reader        (Layer 5 - ml)
//   Step 3: Turn the SQuAD file into features (Layer 4 - data)
//   Step 4: Fine-tune                         (Layer 5 - ml)
//   Step 5: Relocate the weights to the host  (Layer 5 - ml)
//   Step 6: Persist bert_qa_vCPU.mpk          (Layer 5 - ml)
//
// Each step's output is the next step's input; any error
// stops the run.
//
// Reference: Burn Book §5 (Training)

use anyhow::{Context, Result};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::data::processor::{ProcessorSettings, SquadProcessor};
use crate::domain::stage::Placement;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{
    exporter::{persist, relocate_to_host},
    pretrained::load_reader,
    trainer::{fit, TrainSummary},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run.
// Saved as train_config.json at the start of a run and as
// training_args.json inside every checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Pretrained model directory (config.json, vocab, weights)
    pub model_dir:   String,
    /// SQuAD training file
    pub train_file:  String,
    pub output_dir:  String,
    /// Replace the previous run in a non-empty output_dir
    pub overwrite_output_dir: bool,

    pub do_lower_case:           bool,
    pub is_training:             bool,
    pub max_seq_length:          usize,
    pub doc_stride:              usize,
    pub max_query_length:        usize,
    pub version_2_with_negative: bool,

    pub train_batch_size:            usize,
    pub learning_rate:               f64,
    pub num_train_epochs:            usize,
    pub gradient_accumulation_steps: usize,
    pub weight_decay:                f64,
    pub adam_epsilon:                f64,
    pub max_grad_norm:               f64,
    pub warmup_steps:                usize,
    /// Stop after this many optimizer steps, overriding num_train_epochs
    pub max_steps:                   Option<usize>,
    /// 0 disables metrics rows
    pub logging_steps:               usize,
    /// 0 disables step checkpoints
    pub save_steps:                  usize,
    pub seed:                        u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        let features = ProcessorSettings::default();
        Self {
            model_dir:  "models/bert-base-uncased".to_string(),
            train_file: "data/squad/train-v1.1.json".to_string(),
            output_dir: "output".to_string(),
            overwrite_output_dir: false,

            do_lower_case:           features.do_lower_case,
            is_training:             true,
            max_seq_length:          features.max_seq_length,
            doc_stride:              features.doc_stride,
            max_query_length:        features.max_query_length,
            version_2_with_negative: features.version_2_with_negative,

            train_batch_size:            8,
            learning_rate:               5e-5,
            num_train_epochs:            3,
            gradient_accumulation_steps: 1,
            weight_decay:                0.0,
            adam_epsilon:                1e-8,
            max_grad_norm:               1.0,
            warmup_steps:                0,
            max_steps:                   None,
            logging_steps:               50,
            save_steps:                  50,
            seed:                        42,
        }
    }
}

impl TrainConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("'{}' is not a valid training config", path.display()))
    }

    pub fn processor_settings(&self) -> ProcessorSettings {
        ProcessorSettings {
            do_lower_case:           self.do_lower_case,
            is_training:             self.is_training,
            max_seq_length:          self.max_seq_length,
            doc_stride:              self.doc_stride,
            max_query_length:        self.max_query_length,
            version_2_with_negative: self.version_2_with_negative,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.train_batch_size == 0 {
            anyhow::bail!("train_batch_size must be positive");
        }
        if self.gradient_accumulation_steps == 0 {
            anyhow::bail!("gradient_accumulation_steps must be positive");
        }
        if self.num_train_epochs == 0 && self.max_steps.is_none() {
            anyhow::bail!("num_train_epochs must be positive");
        }
        if self.max_steps == Some(0) {
            anyhow::bail!("max_steps must be positive when set");
        }
        if !(self.learning_rate > 0.0) {
            anyhow::bail!("learning_rate must be positive, got {}", self.learning_rate);
        }
        if !self.is_training {
            anyhow::bail!("is_training must be set for a training run");
        }
        Ok(())
    }
}

/// What a finished run produced
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub summary:  TrainSummary,
    pub artifact: PathBuf,
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Run the whole pipeline on backend `B`
    pub fn execute<B: AutodiffBackend>(&self, device: &B::Device, placement: Placement) -> Result<TrainOutcome> {
        let cfg = &self.config;
        cfg.validate()?;
        B::seed(cfg.seed);

        // ── Step 0: Output directory ──────────────────────────────────────────
        let checkpoints = CheckpointManager::for_new_run(&cfg.output_dir, cfg.overwrite_output_dir)?;

        // ── Step 1: Save config ───────────────────────────────────────────────
        checkpoints.save_config(cfg)?;

        // ── Step 2: Pretrained reader ─────────────────────────────────────────
        let settings = cfg.processor_settings();
        let reader = load_reader::<B>(Path::new(&cfg.model_dir), settings.clone(), device, placement)?;

        // ── Step 3: Features ──────────────────────────────────────────────────
        let processor = SquadProcessor::new(reader.tokenizer(), settings)?;
        let (examples, features) = processor.process_file(Path::new(&cfg.train_file))?;
        tracing::info!("{} examples → {} features", examples.len(), features.len());

        // ── Step 4: Fine-tune (Layer 5) ───────────────────────────────────────
        let (fine_tuned, summary) = fit(reader, &features, cfg, &checkpoints)?;
        tracing::info!(
            "global_step = {}, average loss = {:.4}",
            summary.global_step, summary.average_loss
        );

        // ── Step 5 + 6: Export ────────────────────────────────────────────────
        let host = relocate_to_host(fine_tuned)?;
        let (artifact, _) = persist(host, Path::new(&cfg.output_dir))?;

        Ok(TrainOutcome { summary, artifact })
    }
}
