// ============================================================
// Layer 5 — Reader Handle
// ============================================================
// A Reader is everything needed to answer questions with a
// BERT span model: the weights, their BertConfig, the feature
// settings they were trained with, and the tokenizer.
//
// It also records where the weights live (Placement) and how
// far along its lifecycle it is (ModelStage):
//
//   Pretrained ──fit──▶ FineTuned ──relocate──▶ RelocatedToHost ──persist──▶ Persisted
//
// Stage operations check the stage first and fail with
// ReaderError::InvalidTransition instead of doing the wrong
// thing. Placement and device never change in place: moving
// the weights always produces a new Reader.

use burn::prelude::*;
use tokenizers::Tokenizer;

use crate::data::processor::ProcessorSettings;
use crate::domain::stage::{ModelStage, Placement};
use crate::ml::error::ReaderError;
use crate::ml::model::{BertConfig, BertQaModel};

#[derive(Debug)]
pub struct Reader<B: Backend> {
    model:     BertQaModel<B>,
    config:    BertConfig,
    settings:  ProcessorSettings,
    tokenizer: Tokenizer,
    device:    B::Device,
    placement: Placement,
    stage:     ModelStage,
}

impl<B: Backend> Reader<B> {
    /// A freshly loaded reader, ready for fine-tuning
    pub fn pretrained(
        model:     BertQaModel<B>,
        config:    BertConfig,
        settings:  ProcessorSettings,
        tokenizer: Tokenizer,
        device:    B::Device,
        placement: Placement,
    ) -> Result<Self, ReaderError> {
        Self::from_parts(model, config, settings, tokenizer, device, placement, ModelStage::Pretrained)
    }

    pub(crate) fn from_parts(
        model:     BertQaModel<B>,
        config:    BertConfig,
        settings:  ProcessorSettings,
        tokenizer: Tokenizer,
        device:    B::Device,
        placement: Placement,
        stage:     ModelStage,
    ) -> Result<Self, ReaderError> {
        config.validate()?;
        if settings.max_seq_length > config.max_position_embeddings {
            return Err(ReaderError::SequenceTooLong {
                max_seq_length:          settings.max_seq_length,
                max_position_embeddings: config.max_position_embeddings,
            });
        }
        Ok(Self { model, config, settings, tokenizer, device, placement, stage })
    }

    pub fn model(&self)     -> &BertQaModel<B>     { &self.model }
    pub fn config(&self)    -> &BertConfig         { &self.config }
    pub fn settings(&self)  -> &ProcessorSettings  { &self.settings }
    pub fn tokenizer(&self) -> &Tokenizer          { &self.tokenizer }
    pub fn device(&self)    -> &B::Device          { &self.device }
    pub fn placement(&self) -> Placement           { self.placement }
    pub fn stage(&self)     -> ModelStage          { self.stage }

    /// Fail unless the reader is in `expected` stage
    pub fn require_stage(&self, expected: ModelStage, operation: &'static str) -> Result<(), ReaderError> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(ReaderError::InvalidTransition { operation, stage: self.stage, expected })
        }
    }

    /// Move to the next lifecycle stage, which must be `to`
    pub(crate) fn advance(mut self, to: ModelStage) -> Result<Self, ReaderError> {
        if !self.stage.can_advance_to(to) {
            return Err(ReaderError::InvalidTransition {
                operation: "advance",
                stage:     self.stage,
                expected:  to,
            });
        }
        self.stage = to;
        Ok(self)
    }

    pub(crate) fn into_parts(self) -> (BertQaModel<B>, BertConfig, ProcessorSettings, Tokenizer) {
        (self.model, self.config, self.settings, self.tokenizer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{tiny_reader, tiny_settings};
    use burn::backend::NdArray;

    #[test]
    fn test_new_reader_is_pretrained() {
        let reader = tiny_reader::<NdArray>(&Default::default());
        assert_eq!(reader.stage(), ModelStage::Pretrained);
        assert!(reader.require_stage(ModelStage::Pretrained, "fit").is_ok());
    }

    #[test]
    fn test_wrong_stage_is_rejected() {
        let reader = tiny_reader::<NdArray>(&Default::default());
        let err = reader.require_stage(ModelStage::FineTuned, "relocate").unwrap_err();
        assert!(matches!(err, ReaderError::InvalidTransition { operation: "relocate", .. }));
    }

    #[test]
    fn test_advance_only_moves_forward_one_step() {
        let reader = tiny_reader::<NdArray>(&Default::default());
        let reader = reader.advance(ModelStage::FineTuned).unwrap();
        assert_eq!(reader.stage(), ModelStage::FineTuned);
        assert!(reader.advance(ModelStage::Persisted).is_err());
    }

    #[test]
    fn test_sequence_longer_than_positions_is_rejected() {
        let device = Default::default();
        let reader = tiny_reader::<NdArray>(&device);
        let (model, config, _, tokenizer) = reader.into_parts();
        let settings = ProcessorSettings { max_seq_length: 1000, ..tiny_settings() };
        let res = Reader::pretrained(model, config, settings, tokenizer, device, Placement::Host);
        assert!(matches!(res, Err(ReaderError::SequenceTooLong { .. })));
    }
}
