// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer talks to these traits, not to the
// concrete loader / inference engine:
//   - SquadLoader implements ExampleSource
//   - Inferencer  implements QuestionAnswerer
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;

use crate::domain::prediction::Prediction;
use crate::domain::squad::SquadExample;

// ─── ExampleSource ────────────────────────────────────────────────────────────
/// Any component that can produce SQuAD examples.
/// The order of the returned examples is significant: features
/// refer back to examples by position.
pub trait ExampleSource {
    fn load_examples(&self) -> Result<Vec<SquadExample>>;
}

// ─── QuestionAnswerer ─────────────────────────────────────────────────────────
/// Any component that can answer a question against a context.
pub trait QuestionAnswerer {
    fn answer(&self, question: &str, context: &str) -> Result<Prediction>;
}
