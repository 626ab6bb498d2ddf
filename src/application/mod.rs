// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// a specific goal (training, evaluating, or answering).
//
// Rules for this layer:
//   - No ML math or model code here
//   - No UI or printing here (that's Layer 1)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Fine-tune and export
pub mod train_use_case;

// Score exported readers and checkpoints on a dev file
pub mod evaluate_use_case;

// Answer one question against one context
pub mod predict_use_case;
