// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// This layer contains ALL Burn framework specific code.
// The application layer picks a backend and hands it in; the
// data layer only touches Burn through Dataset / Batcher.
//
// What's in this layer:
//
//   error.rs      — ReaderError, the typed failures of the
//                   reader lifecycle
//
//   model.rs      — BERT encoder + span head:
//                   • Word / position / token-type embeddings
//                   • Multi-head self-attention
//                   • Feed-forward networks (GELU activation)
//                   • Post-norm residual blocks
//                   • qa_outputs: hidden → (start, end) logits
//
//   reader.rs     — Reader<B>: weights + config + feature
//                   settings + tokenizer, with placement and
//                   lifecycle stage
//
//   pretrained.rs — Builds a Pretrained reader from a model
//                   directory (Burn record or PyTorch weights)
//
//   trainer.rs    — AdamW fine-tuning with warmup/decay,
//                   gradient accumulation and clipping
//
//   exporter.rs   — Relocation to the host backend and the
//                   single-file bert_qa_vCPU.mpk artifact
//
//   inferencer.rs — Windowed span decoding, n-best and the
//                   v2.0 null answer
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Devlin et al. (2019) BERT

pub mod error;

/// BERT encoder and span-prediction head
pub mod model;

/// Reader handle and lifecycle stage checks
pub mod reader;

/// Loading pretrained model directories
pub mod pretrained;

/// Fine-tuning loop
pub mod trainer;

/// Host relocation and artifact persistence
pub mod exporter;

/// Inference engine: features in, answers out
pub mod inferencer;
