#![recursion_limit = "256"]

mod cli;
mod application;
mod domain;
mod data;
mod ml;
mod infra;

use anyhow::Result;
use cli::Cli;
use clap::Parser;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("squad_reader=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    cli.run()
}

/// Tiny models and fixtures shared by the unit tests
#[cfg(test)]
pub(crate) mod test_support {
    use burn::{
        prelude::*,
        record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
    };
    use std::path::{Path, PathBuf};
    use tokenizers::Tokenizer;

    use crate::data::processor::ProcessorSettings;
    use crate::domain::squad::{GoldAnswer, SquadExample};
    use crate::domain::stage::{ModelStage, Placement};
    use crate::infra::tokenizer_store::{build_word_piece, VOCAB_FILE};
    use crate::ml::{
        exporter::{persist, relocate_to_host, HostBackend},
        model::{BertConfig, BertQaModel},
        pretrained::{CONFIG_FILE, MODEL_STEM},
        reader::Reader,
    };

    pub fn tiny_vocab() -> Vec<String> {
        [
            "[PAD]", "[UNK]", "[CLS]", "[SEP]", "[MASK]", "the", "sky", "is", "blue", "##s", ".",
            "what", "color", "grass", "green", "?",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    pub fn tiny_tokenizer() -> Tokenizer {
        build_word_piece(&tiny_vocab(), true).unwrap()
    }

    pub fn tiny_bert_config() -> BertConfig {
        BertConfig::new()
            .with_vocab_size(16)
            .with_hidden_size(16)
            .with_num_hidden_layers(2)
            .with_num_attention_heads(2)
            .with_intermediate_size(32)
            .with_max_position_embeddings(64)
    }

    pub fn tiny_settings() -> ProcessorSettings {
        ProcessorSettings {
            max_seq_length:   32,
            doc_stride:       8,
            max_query_length: 8,
            is_training:      true,
            ..ProcessorSettings::default()
        }
    }

    pub fn tiny_reader<B: Backend>(device: &B::Device) -> Reader<B> {
        Reader::pretrained(
            tiny_bert_config().init_qa::<B>(device),
            tiny_bert_config(),
            tiny_settings(),
            tiny_tokenizer(),
            device.clone(),
            Placement::Host,
        )
        .unwrap()
    }

    /// [CLS] what color is the sky ? [SEP] the sky is blue . [SEP], padded to 16,
    /// plus a shorter second row
    pub fn sample_inputs<B: Backend>(device: &B::Device) -> [Tensor<B, 2, Int>; 3] {
        let ids: Vec<i64> = vec![
            2, 11, 12, 7, 5, 6, 15, 3, 5, 6, 7, 8, 10, 3, 0, 0,
            2, 11, 7, 5, 13, 15, 3, 5, 13, 7, 14, 3, 0, 0, 0, 0,
        ];
        let types: Vec<i64> = vec![
            0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1, 0, 0,
            0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 0, 0, 0, 0,
        ];
        let mask: Vec<i64> = ids.iter().map(|&id| i64::from(id != 0)).collect();

        let tensor = |v: Vec<i64>| Tensor::<B, 2, Int>::from_data(TensorData::new(v, [2, 16]), device);
        [tensor(ids), tensor(types), tensor(mask)]
    }

    pub fn sky_example() -> SquadExample {
        SquadExample {
            qas_id:        "sky".to_string(),
            question:      "What color is the sky?".to_string(),
            context:       "The sky is blue.".to_string(),
            answer:        Some(GoldAnswer { text: "blue".to_string(), char_start: 11 }),
            all_answers:   vec!["blue".to_string()],
            is_impossible: false,
        }
    }

    pub fn sky_squad_json() -> String {
        serde_json::json!({
            "version": "1.1",
            "data": [{
                "title": "Sky",
                "paragraphs": [{
                    "context": "The sky is blue.",
                    "qas": [{
                        "id": "sky-1",
                        "question": "What color is the sky?",
                        "answers": [{ "text": "blue", "answer_start": 11 }]
                    }]
                }]
            }]
        })
        .to_string()
    }

    /// A pretrained model directory in Burn's own record format
    pub fn write_tiny_model_dir<B: Backend>(dir: &Path, device: &B::Device) -> BertQaModel<B> {
        let config = tiny_bert_config();
        config.save(dir.join(CONFIG_FILE)).unwrap();
        std::fs::write(dir.join(VOCAB_FILE), tiny_vocab().join("\n")).unwrap();

        let model = config.init_qa::<B>(device);
        NamedMpkFileRecorder::<FullPrecisionSettings>::new()
            .record(model.clone().into_record(), dir.join(MODEL_STEM))
            .unwrap();
        model
    }

    /// Persist an untrained tiny reader as `dir/bert_qa_vCPU.mpk`
    pub fn write_tiny_artifact(dir: &Path) -> PathBuf {
        let reader = tiny_reader::<HostBackend>(&Default::default())
            .advance(ModelStage::FineTuned)
            .unwrap();
        let host = relocate_to_host(reader).unwrap();
        persist(host, dir).unwrap().0
    }
}
