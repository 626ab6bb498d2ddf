// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs, enums and traits describing the core
// concepts: SQuAD examples, model features, predictions and
// the reader's lifecycle.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O or network calls
//   - Only plain Rust structs, enums, and traits
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// SQuAD JSON schema and flattened examples
pub mod squad;

// Fixed-length token features derived from examples
pub mod feature;

// Answers produced by the reader
pub mod prediction;

// Reader lifecycle stages and parameter placement
pub mod stage;

// Core abstractions (traits) that other layers implement
pub mod traits;
