// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Fine-tunes a Pretrained reader on SQuAD features with AdamW.
//
// Key Burn insight:
//   - Training runs on an AutodiffBackend (Autodiff<Wgpu> on GPU)
//   - model.valid() strips autodiff and returns the model on
//     B::InnerBackend; that is what the fine-tuned Reader holds
//
// One optimizer step = gradient_accumulation_steps batches.
// The last step of an epoch may use fewer batches, so every
// sample is seen exactly once per epoch.
//
// Learning rate: linear warmup then linear decay to 0 at t_total.
//
// Reference: Burn Book §5, Loshchilov & Hutter (2019) AdamW

use anyhow::Result;
use burn::{
    data::dataloader::DataLoaderBuilder,
    grad_clipping::GradientClippingConfig,
    module::AutodiffModule,
    optim::{AdamWConfig, GradientsAccumulator, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use indicatif::{ProgressBar, ProgressStyle};

use crate::application::train_use_case::TrainConfig;
use crate::data::{batcher::QaBatcher, dataset::QaDataset};
use crate::domain::{feature::Feature, stage::ModelStage};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{MetricsLogger, StepMetrics},
};
use crate::ml::{model::BertQaModel, reader::Reader};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainSummary {
    /// Optimizer steps taken
    pub global_step:  usize,
    /// Mean training loss over all steps
    pub average_loss: f64,
}

// ─── Learning-rate schedule ───────────────────────────────────────────────────
/// lr(step) for 0-based `step`:
///   step <  warmup: base * (step + 1) / warmup
///   step >= warmup: base * (total - step) / (total - warmup)
#[derive(Debug, Clone, Copy)]
pub struct LinearWarmupSchedule {
    pub base_lr: f64,
    pub warmup:  usize,
    pub total:   usize,
}

impl LinearWarmupSchedule {
    pub fn lr_at(&self, step: usize) -> f64 {
        if step < self.warmup {
            self.base_lr * (step + 1) as f64 / self.warmup as f64
        } else {
            let remaining = self.total.saturating_sub(step) as f64;
            let span      = self.total.saturating_sub(self.warmup).max(1) as f64;
            self.base_lr * remaining / span
        }
    }
}

/// Fine-tune `reader` on `features`.
/// Returns the reader on the inner (non-autodiff) backend in stage FineTuned.
pub fn fit<B: AutodiffBackend>(
    reader:      Reader<B>,
    features:    &[Feature],
    cfg:         &TrainConfig,
    checkpoints: &CheckpointManager,
) -> Result<(Reader<B::InnerBackend>, TrainSummary)> {
    reader.require_stage(ModelStage::Pretrained, "fine-tune")?;
    cfg.validate()?;
    if features.is_empty() {
        anyhow::bail!("No training features: nothing to fine-tune on");
    }

    let device    = reader.device().clone();
    let placement = reader.placement();
    let (mut model, config, settings, tokenizer) = reader.into_parts();

    // ── Schedule ──────────────────────────────────────────────────────────────
    let accum             = cfg.gradient_accumulation_steps;
    let batches_per_epoch = features.len().div_ceil(cfg.train_batch_size);
    let steps_per_epoch   = batches_per_epoch.div_ceil(accum);
    let t_total           = cfg.max_steps.unwrap_or(steps_per_epoch * cfg.num_train_epochs);
    let epochs            = t_total.div_ceil(steps_per_epoch);
    let schedule = LinearWarmupSchedule {
        base_lr: cfg.learning_rate,
        warmup:  cfg.warmup_steps,
        total:   t_total,
    };

    tracing::info!("***** Running training *****");
    tracing::info!("  Num features = {}", features.len());
    tracing::info!("  Num epochs = {}", epochs);
    tracing::info!("  Batch size = {} (x{} accumulation)", cfg.train_batch_size, accum);
    tracing::info!("  Total optimization steps = {}", t_total);
    tracing::info!("  Device = {:?} ({})", device, placement);

    // ── AdamW with gradient-norm clipping ─────────────────────────────────────
    let mut optim = AdamWConfig::new()
        .with_epsilon(cfg.adam_epsilon as f32)
        .with_weight_decay(cfg.weight_decay as f32)
        .with_grad_clipping(Some(GradientClippingConfig::Norm(cfg.max_grad_norm as f32)))
        .init();

    // ── Data loader: seeded shuffle, no worker threads ────────────────────────
    let loader = DataLoaderBuilder::new(QaBatcher::<B>::new(device.clone()))
        .batch_size(cfg.train_batch_size)
        .shuffle(cfg.seed)
        .build(QaDataset::from_features(features));

    let metrics  = MetricsLogger::new(checkpoints.dir())?;
    let progress = ProgressBar::new(t_total as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} steps | {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut global_step  = 0usize;
    let mut total_loss   = 0.0f64;
    let mut logging_loss = 0.0f64;

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in 1..=epochs {
        let mut accumulator = GradientsAccumulator::<BertQaModel<B>>::new();
        let mut pending     = 0usize;
        let mut step_loss   = 0.0f64;
        let mut epoch_loss  = 0.0f64;
        let mut epoch_steps = 0usize;

        for (i, batch) in loader.iter().enumerate() {
            let (loss, _) = model.forward_loss(
                batch.input_ids,
                batch.token_type_ids,
                batch.attention_mask,
                batch.start_positions,
                batch.end_positions,
            );
            step_loss += loss.clone().into_scalar().elem::<f64>();
            pending   += 1;

            // Backward pass; the loss is scaled so accumulated
            // gradients average over the step's batches
            let in_step = batches_in_step(i, accum, batches_per_epoch);
            let grads   = (loss / in_step as f64).backward();
            accumulator.accumulate(&model, GradientsParams::from_grads(grads, &model));

            if pending < accum && i + 1 < batches_per_epoch {
                continue;
            }

            // ── Optimizer step ───────────────────────────────────────────────
            let lr = schedule.lr_at(global_step);
            model  = optim.step(lr, model, accumulator.grads());
            global_step += 1;

            let loss_val = step_loss / pending as f64;
            total_loss  += loss_val;
            epoch_loss  += loss_val;
            epoch_steps += 1;
            pending   = 0;
            step_loss = 0.0;

            progress.inc(1);
            progress.set_message(format!("epoch {epoch} loss {loss_val:.4}"));

            if cfg.logging_steps > 0 && global_step % cfg.logging_steps == 0 {
                metrics.log(&StepMetrics {
                    step:          global_step,
                    epoch,
                    learning_rate: lr,
                    loss:          (total_loss - logging_loss) / cfg.logging_steps as f64,
                })?;
                logging_loss = total_loss;
            }

            if cfg.save_steps > 0 && global_step % cfg.save_steps == 0 {
                checkpoints.save_step(global_step, &model, &config, &tokenizer, cfg)?;
            }

            if global_step >= t_total {
                break;
            }
        }

        println!(
            "Epoch {:>3}/{} | train_loss={:.4} | steps={}",
            epoch, epochs, epoch_loss / epoch_steps.max(1) as f64, global_step,
        );
        if global_step >= t_total {
            break;
        }
    }
    progress.finish_and_clear();

    let summary = TrainSummary {
        global_step,
        average_loss: total_loss / global_step.max(1) as f64,
    };
    tracing::info!("Training complete!");

    let reader = Reader::from_parts(
        model.valid(), config, settings, tokenizer, device, placement, ModelStage::FineTuned,
    )?;
    Ok((reader, summary))
}

/// Batches that make up the optimizer step containing `batch_index`.
/// The last step of an epoch may be short.
fn batches_in_step(batch_index: usize, accum: usize, batches_per_epoch: usize) -> usize {
    let first = batch_index / accum * accum;
    accum.min(batches_per_epoch - first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::processor::SquadProcessor;
    use crate::test_support::{sky_example, tiny_reader};
    use burn::backend::{Autodiff, NdArray};

    type B = Autodiff<NdArray>;

    fn config(epochs: usize) -> TrainConfig {
        TrainConfig {
            max_seq_length:   32,
            doc_stride:       8,
            max_query_length: 8,
            train_batch_size: 1,
            learning_rate:    1e-3,
            num_train_epochs: epochs,
            logging_steps:    1,
            save_steps:       0,
            ..TrainConfig::default()
        }
    }

    fn features(reader: &Reader<B>) -> Vec<Feature> {
        let processor = SquadProcessor::new(reader.tokenizer(), reader.settings().clone()).unwrap();
        processor.convert_examples(&[sky_example()]).unwrap()
    }

    fn head_weights<BB: Backend>(reader: &Reader<BB>) -> Vec<f32> {
        reader.model().qa_outputs.weight.val().into_data().convert::<f32>().to_vec().unwrap()
    }

    #[test]
    fn test_schedule_warmup_then_linear_decay() {
        let s = LinearWarmupSchedule { base_lr: 1.0, warmup: 2, total: 6 };
        let lrs: Vec<f64> = (0..6).map(|i| s.lr_at(i)).collect();
        assert_eq!(lrs, vec![0.5, 1.0, 1.0, 0.75, 0.5, 0.25]);
        // Never zero on a step that is taken
        assert!(lrs.iter().all(|&lr| lr > 0.0));
    }

    #[test]
    fn test_schedule_without_warmup() {
        let s = LinearWarmupSchedule { base_lr: 2.0, warmup: 0, total: 4 };
        assert_eq!(s.lr_at(0), 2.0);
        assert_eq!(s.lr_at(3), 0.5);
    }

    #[test]
    fn test_two_epochs_change_the_parameters() {
        let dir    = tempfile::tempdir().unwrap();
        let ckpt   = CheckpointManager::new(dir.path()).unwrap();
        let reader = tiny_reader::<B>(&Default::default());
        let feats  = features(&reader);
        let before = head_weights(&reader);

        let (trained, summary) = fit(reader, &feats, &config(2), &ckpt).unwrap();
        assert_eq!(trained.stage(), ModelStage::FineTuned);
        assert_eq!(summary.global_step, 2);
        assert!(summary.average_loss.is_finite());
        assert_ne!(head_weights(&trained), before);

        // One metrics row per step
        let csv = std::fs::read_to_string(dir.path().join("metrics.csv")).unwrap();
        assert_eq!(csv.lines().count(), 3);
    }

    #[test]
    fn test_checkpoints_every_save_steps() {
        let dir    = tempfile::tempdir().unwrap();
        let ckpt   = CheckpointManager::new(dir.path()).unwrap();
        let reader = tiny_reader::<B>(&Default::default());
        let feats  = features(&reader);

        let cfg = TrainConfig { save_steps: 1, ..config(2) };
        fit(reader, &feats, &cfg, &ckpt).unwrap();
        assert_eq!(ckpt.list_steps().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_max_steps_stops_early() {
        let dir    = tempfile::tempdir().unwrap();
        let ckpt   = CheckpointManager::new(dir.path()).unwrap();
        let reader = tiny_reader::<B>(&Default::default());
        let mut feats = features(&reader);
        feats.extend(features(&reader));

        let cfg = TrainConfig { max_steps: Some(3), ..config(10) };
        let (_, summary) = fit(reader, &feats, &cfg, &ckpt).unwrap();
        assert_eq!(summary.global_step, 3);
    }

    #[test]
    fn test_short_last_step_counts_its_own_batches() {
        // 3 batches, 2 per step: the last step holds one batch
        let counts: Vec<usize> = (0..3).map(|i| batches_in_step(i, 2, 3)).collect();
        assert_eq!(counts, vec![2, 2, 1]);
        assert_eq!(batches_in_step(0, 1, 3), 1);
        assert_eq!(batches_in_step(2, 4, 3), 3);
    }

    #[test]
    fn test_gradient_accumulation_steps_per_epoch() {
        let dir    = tempfile::tempdir().unwrap();
        let ckpt   = CheckpointManager::new(dir.path()).unwrap();
        let reader = tiny_reader::<B>(&Default::default());
        let feats: Vec<Feature> = (0..3).flat_map(|_| features(&reader)).collect();
        assert_eq!(feats.len(), 3);

        // 3 batches of 1, two per optimizer step → 2 steps per epoch
        let cfg = TrainConfig { gradient_accumulation_steps: 2, ..config(2) };
        let (_, summary) = fit(reader, &feats, &cfg, &ckpt).unwrap();
        assert_eq!(summary.global_step, 4);
        assert!(summary.average_loss.is_finite());

        let csv = std::fs::read_to_string(dir.path().join("metrics.csv")).unwrap();
        assert_eq!(csv.lines().count(), 5);
    }

    #[test]
    fn test_empty_features_are_rejected() {
        let dir    = tempfile::tempdir().unwrap();
        let ckpt   = CheckpointManager::new(dir.path()).unwrap();
        let reader = tiny_reader::<B>(&Default::default());
        assert!(fit(reader, &[], &config(1), &ckpt).is_err());
    }

    #[test]
    fn test_fine_tuned_reader_cannot_be_fit_again() {
        let dir    = tempfile::tempdir().unwrap();
        let ckpt   = CheckpointManager::new(dir.path()).unwrap();
        let reader = tiny_reader::<B>(&Default::default())
            .advance(ModelStage::FineTuned)
            .unwrap();
        let feats = features(&reader);
        assert!(fit(reader, &feats, &config(1), &ckpt).is_err());
    }
}
