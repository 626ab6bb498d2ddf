// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the four subcommands: `download`, `train`,
// `evaluate` and `predict`, and all their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, etc.)
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};
use crate::application::train_use_case::TrainConfig;
use crate::ml::inferencer::InferenceSettings;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download the SQuAD files and, optionally, a pretrained BERT
    Download(DownloadArgs),

    /// Fine-tune a pretrained BERT on a SQuAD training file
    Train(TrainArgs),

    /// Score the exported reader (and checkpoints) on a dev file
    Evaluate(EvaluateArgs),

    /// Answer one question against one context
    Predict(PredictArgs),
}

#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Where the SQuAD v1.1 / v2.0 JSON files go
    #[arg(long, default_value = "data/squad")]
    pub squad_dir: String,

    /// Hugging Face model id to fetch, e.g. bert-base-uncased
    #[arg(long)]
    pub model: Option<String>,

    #[arg(long, default_value = "models")]
    pub models_dir: String,
}

/// All arguments for the `train` command.
/// Each field becomes a --flag on the command line.
/// Flags left unset fall back to `--config`, then to the
/// TrainConfig defaults.
#[derive(Args, Debug, Default)]
pub struct TrainArgs {
    /// JSON file with a (partial) TrainConfig
    #[arg(long)]
    pub config: Option<String>,

    /// Train on the CPU (NdArray) instead of the GPU (Wgpu)
    #[arg(long)]
    pub cpu: bool,

    /// Pretrained model directory: config.json, vocab.txt and weights
    #[arg(long)]
    pub model_dir: Option<String>,

    #[arg(long)]
    pub train_file: Option<String>,

    /// Receives checkpoints, metrics.csv and bert_qa_vCPU.mpk
    #[arg(long)]
    pub output_dir: Option<String>,

    /// Replace the previous run in a non-empty --output-dir
    #[arg(long)]
    pub overwrite_output_dir: bool,

    /// Keep the original casing (cased BERT models)
    #[arg(long)]
    pub cased: bool,

    /// Train on SQuAD v2.0, where some questions have no answer
    #[arg(long)]
    pub version_2_with_negative: bool,

    /// Maximum number of tokens per input sequence
    /// Format: [CLS] question [SEP] context [SEP] + padding
    #[arg(long)]
    pub max_seq_length: Option<usize>,

    /// Tokens between the starts of consecutive context windows
    #[arg(long)]
    pub doc_stride: Option<usize>,

    #[arg(long)]
    pub max_query_length: Option<usize>,

    #[arg(long)]
    pub train_batch_size: Option<usize>,

    #[arg(long)]
    pub learning_rate: Option<f64>,

    #[arg(long)]
    pub num_train_epochs: Option<usize>,

    /// Batches per optimizer step
    #[arg(long)]
    pub gradient_accumulation_steps: Option<usize>,

    #[arg(long)]
    pub weight_decay: Option<f64>,

    #[arg(long)]
    pub adam_epsilon: Option<f64>,

    #[arg(long)]
    pub max_grad_norm: Option<f64>,

    #[arg(long)]
    pub warmup_steps: Option<usize>,

    /// Total optimizer steps; overrides --num-train-epochs
    #[arg(long)]
    pub max_steps: Option<usize>,

    #[arg(long)]
    pub logging_steps: Option<usize>,

    #[arg(long)]
    pub save_steps: Option<usize>,

    #[arg(long)]
    pub seed: Option<u64>,
}

impl TrainArgs {
    /// Apply the flags that were given on top of `base`
    pub fn apply(self, base: TrainConfig) -> TrainConfig {
        let mut cfg = base;
        macro_rules! set {
            ($($field:ident),* $(,)?) => {
                $( if let Some(v) = self.$field { cfg.$field = v; } )*
            };
        }
        set!(
            model_dir, train_file, output_dir,
            max_seq_length, doc_stride, max_query_length,
            train_batch_size, learning_rate, num_train_epochs,
            gradient_accumulation_steps, weight_decay, adam_epsilon,
            max_grad_norm, warmup_steps, logging_steps, save_steps, seed,
        );
        if self.max_steps.is_some() {
            cfg.max_steps = self.max_steps;
        }
        if self.overwrite_output_dir {
            cfg.overwrite_output_dir = true;
        }
        if self.cased {
            cfg.do_lower_case = false;
        }
        if self.version_2_with_negative {
            cfg.version_2_with_negative = true;
        }
        cfg
    }
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// This is the boundary between Layer 1 and Layer 2:
/// the application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        a.apply(TrainConfig::default())
    }
}

/// Flags shared by `evaluate` and `predict`
#[derive(Args, Debug, Clone)]
pub struct InferenceArgs {
    /// Candidate answers kept per question
    #[arg(long, default_value_t = 20)]
    pub n_best_size: usize,

    /// Longest answer, in tokens
    #[arg(long, default_value_t = 30)]
    pub max_answer_length: usize,

    /// v2.0 only: abstain when null score − best score exceeds this
    #[arg(long, default_value_t = 0.0)]
    pub null_score_diff_threshold: f32,

    #[arg(long, default_value_t = 8)]
    pub eval_batch_size: usize,
}

impl From<InferenceArgs> for InferenceSettings {
    fn from(a: InferenceArgs) -> Self {
        InferenceSettings {
            n_best_size:               a.n_best_size,
            max_answer_length:         a.max_answer_length,
            null_score_diff_threshold: a.null_score_diff_threshold,
            eval_batch_size:           a.eval_batch_size,
        }
    }
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    #[arg(long, default_value = "data/squad/dev-v1.1.json")]
    pub dev_file: String,

    /// Training output directory holding bert_qa_vCPU.mpk
    #[arg(long, default_value = "output")]
    pub output_dir: String,

    /// Also evaluate every checkpoint-{step}/ in the output directory
    #[arg(long)]
    pub eval_all_checkpoints: bool,

    #[command(flatten)]
    pub inference: InferenceArgs,
}

#[derive(Args, Debug)]
pub struct PredictArgs {
    #[arg(long)]
    pub question: String,

    /// The passage to search for the answer
    #[arg(long)]
    pub context: String,

    #[arg(long, default_value = "output/bert_qa_vCPU.mpk")]
    pub artifact: String,

    #[command(flatten)]
    pub inference: InferenceArgs,
}
