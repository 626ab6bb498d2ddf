// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns that don't belong in any specific
// business layer:
//
//   download.rs        — Fetches SQuAD files and pretrained
//                        BERT checkpoints over HTTP, skipping
//                        files that are already present.
//
//   tokenizer_store.rs — Loads the WordPiece tokenizer that
//                        belongs to a checkpoint (tokenizer.json
//                        or vocab.txt) and saves it next to
//                        training outputs.
//
//   checkpoint.rs      — Step checkpoints and the persisted
//                        TrainConfig of a run.
//
//   metrics.rs         — Training metrics logging to CSV.
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)

/// SQuAD and pretrained model downloads
pub mod download;

/// Step checkpoint saving and listing
pub mod checkpoint;

/// Tokenizer loading and saving
pub mod tokenizer_store;

/// Training metrics CSV logger
pub mod metrics;
