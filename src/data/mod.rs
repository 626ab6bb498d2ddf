// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// This layer handles everything from SQuAD JSON files all
// the way to tensor batches, plus the answer scoring used
// when evaluating predictions.
//
//   train-v1.1.json
//       │
//       ▼
//   SquadLoader       → flattens articles/paragraphs/qas into examples
//       │
//       ▼
//   SquadProcessor    → tokenizes, windows (Chunker), locates answer spans
//       │
//       ▼
//   QaDataset         → implements Burn's Dataset trait
//       │
//       ▼
//   QaBatcher         → stacks samples into tensor batches
//       │
//       ▼
//   DataLoader        → feeds batches to the training loop
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads SQuAD JSON into examples
pub mod loader;

/// Splits long contexts into overlapping windows
pub mod chunker;

/// Turns examples into fixed-length features
pub mod processor;

/// Implements Burn's Dataset trait for Q&A samples
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Official SQuAD normalisation, exact match and F1
pub mod squad_metrics;

