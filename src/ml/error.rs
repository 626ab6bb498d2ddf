use thiserror::Error;

use crate::domain::stage::ModelStage;

/// Errors raised by the reader lifecycle and the export artifact.
/// The application layer wraps these in anyhow with context.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("cannot {operation} a reader in stage '{stage}' (needs '{expected}')")]
    InvalidTransition {
        operation: &'static str,
        stage:     ModelStage,
        expected:  ModelStage,
    },

    #[error("artifact holds a '{found}' model, expected '{expected}'")]
    ArchitectureMismatch { expected: String, found: String },

    #[error("artifact format version {found} is not supported (expected {expected})")]
    UnsupportedVersion { expected: usize, found: usize },

    #[error("max_seq_length {max_seq_length} exceeds max_position_embeddings {max_position_embeddings}")]
    SequenceTooLong {
        max_seq_length:          usize,
        max_position_embeddings: usize,
    },

    #[error("unsupported model configuration: {0}")]
    Config(String),

    #[error("record error: {0}")]
    Record(String),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("tensor data error: {0}")]
    Data(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ReaderError {
    pub(crate) fn record(err: impl std::fmt::Debug) -> Self {
        Self::Record(format!("{err:?}"))
    }
}
