// ============================================================
// Layer 5 — Pretrained Weights
// ============================================================
// Builds a Pretrained reader from a model directory:
//
//   model_dir/
//     config.json                 ← HF BertConfig (required)
//     tokenizer.json | vocab.txt  ← tokenizer (required)
//     model.mpk                   ← burn record, full precision
//     model.mpk.gz                ← burn record, full precision, gzipped (step checkpoints)
//     pytorch_model.bin           ← HF PyTorch weights (encoder only)
//
// The first weights file found, in the order above, wins.
// A burn record holds the whole span model; the PyTorch file
// only has the encoder, so its span head starts random.
//
// Reference: Burn Book §7 (Importing PyTorch models)

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, NamedMpkGzFileRecorder, Recorder},
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use std::path::Path;

use crate::data::processor::ProcessorSettings;
use crate::domain::stage::Placement;
use crate::infra::tokenizer_store::TokenizerStore;
use crate::ml::error::ReaderError;
use crate::ml::model::{BertConfig, BertModelRecord, BertQaModel, BertQaModelRecord};
use crate::ml::reader::Reader;

pub const CONFIG_FILE:      &str = "config.json";
/// Stem of model.mpk / model.mpk.gz; recorders add the extension
pub const MODEL_STEM:       &str = "model";
pub const PYTORCH_WEIGHTS:  &str = "pytorch_model.bin";

/// HuggingFace key → field path in BertModel
const KEY_REMAP: [(&str, &str); 8] = [
    (r"^bert\.",                              ""),
    (r"attention\.self\.(query|key|value)",   "attention.$1"),
    (r"attention\.output\.dense",             "attention.output"),
    (r"attention\.output\.LayerNorm",         "attention_norm"),
    (r"intermediate\.dense",                  "intermediate"),
    (r"layer\.([0-9]+)\.output\.dense",       "layer.$1.output"),
    (r"layer\.([0-9]+)\.output\.LayerNorm",   "layer.$1.output_norm"),
    (r"embeddings\.LayerNorm",                "embeddings.layer_norm"),
];

pub fn load_config(dir: &Path) -> Result<BertConfig> {
    let path = dir.join(CONFIG_FILE);
    let config = BertConfig::load(&path)
        .map_err(|e| anyhow::anyhow!("Cannot read model config '{}': {e:?}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// Load config, tokenizer and weights from `dir` into a Pretrained reader
pub fn load_reader<B: Backend>(
    dir:       &Path,
    settings:  ProcessorSettings,
    device:    &B::Device,
    placement: Placement,
) -> Result<Reader<B>> {
    let config    = load_config(dir)?;
    let tokenizer = TokenizerStore::new(dir).load(settings.do_lower_case)?;
    let model     = load_weights::<B>(dir, &config, device)
        .with_context(|| format!("Cannot load weights from '{}'", dir.display()))?;

    tracing::info!(
        "Loaded BERT from '{}': {} layers, hidden {}, {} parameters",
        dir.display(), config.num_hidden_layers, config.hidden_size, model.num_params()
    );

    Ok(Reader::pretrained(model, config, settings, tokenizer, device.clone(), placement)?)
}

pub fn load_weights<B: Backend>(
    dir:    &Path,
    config: &BertConfig,
    device: &B::Device,
) -> Result<BertQaModel<B>, ReaderError> {
    let stem = dir.join(MODEL_STEM);

    if dir.join("model.mpk").exists() {
        tracing::debug!("Reading burn record '{}.mpk'", stem.display());
        let record: BertQaModelRecord<B> = NamedMpkFileRecorder::<FullPrecisionSettings>::new()
            .load(stem, device)
            .map_err(ReaderError::record)?;
        return Ok(config.init_qa(device).load_record(record));
    }

    if dir.join("model.mpk.gz").exists() {
        tracing::debug!("Reading gzipped record '{}.mpk.gz'", stem.display());
        let record: BertQaModelRecord<B> = NamedMpkGzFileRecorder::<FullPrecisionSettings>::new()
            .load(stem, device)
            .map_err(ReaderError::record)?;
        return Ok(config.init_qa(device).load_record(record));
    }

    let pytorch = dir.join(PYTORCH_WEIGHTS);
    if pytorch.exists() {
        return import_pytorch_encoder(&pytorch, config, device);
    }

    Err(ReaderError::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("no model.mpk, model.mpk.gz or {PYTORCH_WEIGHTS} in '{}'", dir.display()),
    )))
}

/// Encoder weights from a HuggingFace checkpoint, span head random
fn import_pytorch_encoder<B: Backend>(
    path:   &Path,
    config: &BertConfig,
    device: &B::Device,
) -> Result<BertQaModel<B>, ReaderError> {
    tracing::info!("Importing PyTorch weights from '{}'", path.display());

    let args = KEY_REMAP
        .iter()
        .fold(LoadArgs::new(path.to_path_buf()), |args, (from, to)| args.with_key_remap(from, to));

    let record: BertModelRecord<B> = PyTorchFileRecorder::<FullPrecisionSettings>::default()
        .load(args, device)
        .map_err(ReaderError::record)?;

    let encoder = config.init_encoder(device).load_record(record);
    tracing::info!("Span head (qa_outputs) initialised randomly");
    Ok(config.with_encoder(encoder, device))
}
