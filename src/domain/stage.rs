// ============================================================
// Layer 3 — Reader Lifecycle
// ============================================================
// The reader moves through a fixed sequence of stages:
//
//   Pretrained → FineTuned → RelocatedToHost → Persisted
//
// Each arrow is taken exactly once, in order. There is no way
// back. Placement records where the parameters physically live;
// it only ever changes together with the tensors themselves.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a reader's parameter tensors live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placement {
    /// GPU / accelerator memory (the wgpu backend)
    Accelerator,
    /// Host (CPU) memory
    Host,
}

impl Placement {
    /// Short tag used in artifact metadata and file names
    pub fn tag(&self) -> &'static str {
        match self {
            Placement::Accelerator => "gpu",
            Placement::Host        => "cpu",
        }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelStage {
    Pretrained,
    FineTuned,
    RelocatedToHost,
    Persisted,
}

impl ModelStage {
    /// The only stage reachable from this one, if any
    pub fn next(&self) -> Option<ModelStage> {
        match self {
            ModelStage::Pretrained      => Some(ModelStage::FineTuned),
            ModelStage::FineTuned       => Some(ModelStage::RelocatedToHost),
            ModelStage::RelocatedToHost => Some(ModelStage::Persisted),
            ModelStage::Persisted       => None,
        }
    }

    pub fn can_advance_to(&self, target: ModelStage) -> bool {
        self.next() == Some(target)
    }
}

impl fmt::Display for ModelStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelStage::Pretrained      => "pretrained",
            ModelStage::FineTuned       => "fine-tuned",
            ModelStage::RelocatedToHost => "relocated-to-host",
            ModelStage::Persisted       => "persisted",
        };
        f.write_str(name)
    }
}
