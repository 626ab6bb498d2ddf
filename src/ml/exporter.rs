// ============================================================
// Layer 5 — Exporter
// ============================================================
// Turns a fine-tuned reader into the single CPU artifact that
// inference loads:
//
//   relocate_to_host   FineTuned (any device) → RelocatedToHost (NdArray)
//   persist            RelocatedToHost        → Persisted, writes bert_qa_vCPU.mpk
//   load_artifact      bert_qa_vCPU.mpk       → Persisted reader on the host
//
// Relocation serialises the weights into an in-memory record at
// full precision and loads that record on the host backend, so
// the host reader computes exactly the same logits.
//
// The artifact is a versioned record, not a dump of the model
// object: an architecture tag, a format version, the placement,
// BertConfig / ProcessorSettings / tokenizer as JSON strings,
// and the named parameter tensors.
//
// Reference: Burn Book §5 (Records)

use burn::{
    backend::{ndarray::NdArrayDevice, NdArray},
    prelude::*,
    record::{BinBytesRecorder, FullPrecisionSettings, NamedMpkFileRecorder, Record, Recorder},
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tokenizers::Tokenizer;

use crate::data::processor::ProcessorSettings;
use crate::domain::stage::{ModelStage, Placement};
use crate::ml::error::ReaderError;
use crate::ml::model::{BertConfig, BertQaModelRecord};
use crate::ml::reader::Reader;

/// The CPU backend exported readers live on
pub type HostBackend = NdArray<f32>;

/// A reader loaded from (or written to) an export artifact
pub type ExportedReader = Reader<HostBackend>;

pub const ARCHITECTURE:   &str  = "bert-span-qa";
pub const FORMAT_VERSION: usize = 1;
/// Stem of the exported file; the recorder adds `.mpk`
pub const ARTIFACT_STEM:  &str  = "bert_qa_vCPU";

#[derive(Record)]
pub struct ReaderArtifactRecord<B: Backend> {
    pub architecture:   String,
    pub format_version: usize,
    pub placement:      String,
    pub config_json:    String,
    pub settings_json:  String,
    pub tokenizer_json: String,
    pub model:          BertQaModelRecord<B>,
}

pub fn artifact_path(output_dir: &Path) -> PathBuf {
    output_dir.join(format!("{ARTIFACT_STEM}.mpk"))
}

/// Move a fine-tuned reader's weights to host memory.
/// Consumes the handle; the returned one is the only valid one.
pub fn relocate_to_host<B: Backend>(reader: Reader<B>) -> Result<ExportedReader, ReaderError> {
    reader.require_stage(ModelStage::FineTuned, "relocate")?;
    let from = reader.placement();
    let (model, config, settings, tokenizer) = reader.into_parts();

    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    let bytes = Recorder::<B>::record(&recorder, model.into_record(), ())
        .map_err(ReaderError::record)?;

    let device = NdArrayDevice::Cpu;
    let record: BertQaModelRecord<HostBackend> = Recorder::<HostBackend>::load(&recorder, bytes, &device)
        .map_err(ReaderError::record)?;
    let model = config.init_qa::<HostBackend>(&device).load_record(record);

    tracing::info!("Relocated reader weights from {} to {}", from, Placement::Host);
    Reader::from_parts(
        model, config, settings, tokenizer, device,
        Placement::Host, ModelStage::RelocatedToHost,
    )
}

/// Write the reader to `output_dir/bert_qa_vCPU.mpk`.
/// Nothing else is written.
pub fn persist(
    reader:     ExportedReader,
    output_dir: &Path,
) -> Result<(PathBuf, ExportedReader), ReaderError> {
    reader.require_stage(ModelStage::RelocatedToHost, "persist")?;
    fs::create_dir_all(output_dir)?;

    let artifact = ReaderArtifactRecord::<HostBackend> {
        architecture:   ARCHITECTURE.to_string(),
        format_version: FORMAT_VERSION,
        placement:      reader.placement().tag().to_string(),
        config_json:    serde_json::to_string(reader.config())?,
        settings_json:  serde_json::to_string(reader.settings())?,
        tokenizer_json: reader
            .tokenizer()
            .to_string(false)
            .map_err(|e| ReaderError::Tokenizer(e.to_string()))?,
        model:          reader.model().clone().into_record(),
    };
    let path = write_artifact(artifact, output_dir)?;

    tracing::info!("Saved reader to '{}'", path.display());
    Ok((path, reader.advance(ModelStage::Persisted)?))
}

pub(crate) fn write_artifact(
    artifact:   ReaderArtifactRecord<HostBackend>,
    output_dir: &Path,
) -> Result<PathBuf, ReaderError> {
    NamedMpkFileRecorder::<FullPrecisionSettings>::new()
        .record(artifact, output_dir.join(ARTIFACT_STEM))
        .map_err(ReaderError::record)?;
    Ok(artifact_path(output_dir))
}

/// Read an artifact written by `persist`
pub fn load_artifact(path: &Path, device: &NdArrayDevice) -> Result<ExportedReader, ReaderError> {
    if !path.exists() {
        return Err(ReaderError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no reader artifact at '{}'", path.display()),
        )));
    }

    let record: ReaderArtifactRecord<HostBackend> = NamedMpkFileRecorder::<FullPrecisionSettings>::new()
        .load(path.to_path_buf(), device)
        .map_err(ReaderError::record)?;

    if record.architecture != ARCHITECTURE {
        return Err(ReaderError::ArchitectureMismatch {
            expected: ARCHITECTURE.to_string(),
            found:    record.architecture,
        });
    }
    if record.format_version != FORMAT_VERSION {
        return Err(ReaderError::UnsupportedVersion {
            expected: FORMAT_VERSION,
            found:    record.format_version,
        });
    }
    if record.placement != Placement::Host.tag() {
        return Err(ReaderError::Config(format!(
            "artifact placement '{}' is not '{}'", record.placement, Placement::Host
        )));
    }

    let config: BertConfig          = serde_json::from_str(&record.config_json)?;
    let settings: ProcessorSettings = serde_json::from_str(&record.settings_json)?;
    let tokenizer = Tokenizer::from_str(&record.tokenizer_json)
        .map_err(|e| ReaderError::Tokenizer(e.to_string()))?;
    let model = config.init_qa::<HostBackend>(device).load_record(record.model);

    tracing::info!("Loaded reader artifact '{}'", path.display());
    Reader::from_parts(
        model, config, settings, tokenizer, device.clone(),
        Placement::Host, ModelStage::Persisted,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::QaModelOutput;
    use crate::test_support::{tiny_reader, sample_inputs};

    type Inner = NdArray<f32>;

    fn fine_tuned() -> Reader<Inner> {
        tiny_reader::<Inner>(&Default::default())
            .advance(ModelStage::FineTuned)
            .unwrap()
    }

    fn logits<B: Backend>(reader: &Reader<B>) -> (Vec<f32>, Vec<f32>) {
        let [ids, types, mask] = sample_inputs::<B>(reader.device());
        let QaModelOutput { start_logits, end_logits } = reader.model().forward(ids, types, mask);
        (
            start_logits.into_data().to_vec().unwrap(),
            end_logits.into_data().to_vec().unwrap(),
        )
    }

    #[test]
    fn test_relocation_preserves_logits_exactly() {
        let reader = fine_tuned();
        let before = logits(&reader);

        let host = relocate_to_host(reader).unwrap();
        assert_eq!(host.placement(), Placement::Host);
        assert_eq!(host.stage(), ModelStage::RelocatedToHost);
        assert_eq!(logits(&host), before);
    }

    #[test]
    fn test_relocating_a_pretrained_reader_is_rejected() {
        let reader = tiny_reader::<Inner>(&Default::default());
        let err = relocate_to_host(reader).unwrap_err();
        assert!(matches!(err, ReaderError::InvalidTransition { operation: "relocate", .. }));
    }

    #[test]
    fn test_persist_writes_one_file_and_reloads_identically() {
        let dir  = tempfile::tempdir().unwrap();
        let host = relocate_to_host(fine_tuned()).unwrap();
        let expected = logits(&host);

        let (path, persisted) = persist(host, dir.path()).unwrap();
        assert_eq!(persisted.stage(), ModelStage::Persisted);
        assert_eq!(path, artifact_path(dir.path()));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);

        let loaded = load_artifact(&path, &NdArrayDevice::Cpu).unwrap();
        assert_eq!(loaded.settings(), persisted.settings());
        assert_eq!(logits(&loaded), expected);
    }

    #[test]
    fn test_persist_requires_relocation_first() {
        let dir = tempfile::tempdir().unwrap();
        let res = persist(fine_tuned(), dir.path());
        assert!(matches!(res, Err(ReaderError::InvalidTransition { .. })));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_foreign_tag_and_version_are_rejected() {
        let host = relocate_to_host(fine_tuned()).unwrap();
        let artifact = |architecture: &str, format_version: usize| ReaderArtifactRecord::<HostBackend> {
            architecture: architecture.to_string(),
            format_version,
            placement:      "cpu".to_string(),
            config_json:    serde_json::to_string(host.config()).unwrap(),
            settings_json:  serde_json::to_string(host.settings()).unwrap(),
            tokenizer_json: host.tokenizer().to_string(false).unwrap(),
            model:          host.model().clone().into_record(),
        };

        let dir = tempfile::tempdir().unwrap();
        let path = write_artifact(artifact("gpt2", FORMAT_VERSION), dir.path()).unwrap();
        assert!(matches!(
            load_artifact(&path, &NdArrayDevice::Cpu),
            Err(ReaderError::ArchitectureMismatch { .. })
        ));

        let path = write_artifact(artifact(ARCHITECTURE, FORMAT_VERSION + 1), dir.path()).unwrap();
        assert!(matches!(
            load_artifact(&path, &NdArrayDevice::Cpu),
            Err(ReaderError::UnsupportedVersion { found, .. }) if found == FORMAT_VERSION + 1
        ));
    }

    #[test]
    fn test_missing_artifact_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let res = load_artifact(&artifact_path(dir.path()), &NdArrayDevice::Cpu);
        assert!(matches!(res, Err(ReaderError::Io(_))));
    }
}
