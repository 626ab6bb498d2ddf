// ============================================================
// Layer 5 — BERT Span-Extraction Model
// ============================================================
// A BERT encoder with a two-logit span head on top:
//
//   word + position + token-type embeddings → LayerNorm → dropout
//   N × encoder layer:
//       self-attention (padding masked) → dropout → Add & LayerNorm
//       dense → GELU → dense            → dropout → Add & LayerNorm
//   qa_outputs: Linear(hidden, 2) → start / end logit per token
//
// Field names follow the HuggingFace checkpoint layout closely
// enough that `ml::pretrained` can map pytorch_model.bin keys
// onto these structs with a handful of regex renames.
//
// Reference: Devlin et al. (2019) BERT
//            Vaswani et al. (2017) Attention Is All You Need
//            Burn Book §3 (Building Blocks)

use burn::{
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        loss::CrossEntropyLossConfig,
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        Initializer,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation::gelu,
};

use crate::ml::error::ReaderError;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally; do NOT add them again or you get conflicting impls.
//
// Field names match HuggingFace's config.json so the file loads directly;
// any extra keys in it are ignored. Defaults are bert-base-uncased.
#[derive(Config, Debug)]
pub struct BertConfig {
    #[config(default = 30522)]
    pub vocab_size: usize,
    #[config(default = 768)]
    pub hidden_size: usize,
    #[config(default = 12)]
    pub num_hidden_layers: usize,
    #[config(default = 12)]
    pub num_attention_heads: usize,
    #[config(default = 3072)]
    pub intermediate_size: usize,
    #[config(default = "String::from(\"gelu\")")]
    pub hidden_act: String,
    #[config(default = 0.1)]
    pub hidden_dropout_prob: f64,
    #[config(default = 0.1)]
    pub attention_probs_dropout_prob: f64,
    #[config(default = 512)]
    pub max_position_embeddings: usize,
    #[config(default = 2)]
    pub type_vocab_size: usize,
    #[config(default = 0.02)]
    pub initializer_range: f64,
    #[config(default = 1e-12)]
    pub layer_norm_eps: f64,
}

impl BertConfig {
    /// Reject configurations this model cannot represent
    pub fn validate(&self) -> Result<(), ReaderError> {
        if self.hidden_size % self.num_attention_heads != 0 {
            return Err(ReaderError::Config(format!(
                "hidden_size {} is not a multiple of num_attention_heads {}",
                self.hidden_size, self.num_attention_heads
            )));
        }
        // gelu_new is the tanh approximation; close enough to share weights
        if !matches!(self.hidden_act.as_str(), "gelu" | "gelu_new") {
            return Err(ReaderError::Config(format!(
                "hidden_act '{}' is not supported", self.hidden_act
            )));
        }
        Ok(())
    }

    fn initializer(&self) -> Initializer {
        Initializer::Normal { mean: 0.0, std: self.initializer_range }
    }

    pub fn init_encoder<B: Backend>(&self, device: &B::Device) -> BertModel<B> {
        let embeddings = BertEmbeddings {
            word_embeddings: EmbeddingConfig::new(self.vocab_size, self.hidden_size)
                .with_initializer(self.initializer())
                .init(device),
            position_embeddings: EmbeddingConfig::new(self.max_position_embeddings, self.hidden_size)
                .with_initializer(self.initializer())
                .init(device),
            token_type_embeddings: EmbeddingConfig::new(self.type_vocab_size, self.hidden_size)
                .with_initializer(self.initializer())
                .init(device),
            layer_norm: LayerNormConfig::new(self.hidden_size)
                .with_epsilon(self.layer_norm_eps)
                .init(device),
            dropout: DropoutConfig::new(self.hidden_dropout_prob).init(),
        };

        let layer = (0..self.num_hidden_layers)
            .map(|_| self.init_layer(device))
            .collect();

        BertModel { embeddings, encoder: BertEncoder { layer } }
    }

    fn init_layer<B: Backend>(&self, device: &B::Device) -> BertLayer<B> {
        let norm = || LayerNormConfig::new(self.hidden_size)
            .with_epsilon(self.layer_norm_eps)
            .init(device);
        BertLayer {
            attention: MultiHeadAttentionConfig::new(self.hidden_size, self.num_attention_heads)
                .with_dropout(self.attention_probs_dropout_prob)
                .with_initializer(self.initializer())
                .init(device),
            attention_norm: norm(),
            intermediate: LinearConfig::new(self.hidden_size, self.intermediate_size)
                .with_initializer(self.initializer())
                .init(device),
            output: LinearConfig::new(self.intermediate_size, self.hidden_size)
                .with_initializer(self.initializer())
                .init(device),
            output_norm: norm(),
            dropout: DropoutConfig::new(self.hidden_dropout_prob).init(),
        }
    }

    /// Encoder plus a freshly initialised span head
    pub fn init_qa<B: Backend>(&self, device: &B::Device) -> BertQaModel<B> {
        self.with_encoder(self.init_encoder(device), device)
    }

    /// Put a freshly initialised span head on an existing encoder
    pub fn with_encoder<B: Backend>(&self, bert: BertModel<B>, device: &B::Device) -> BertQaModel<B> {
        let qa_outputs = LinearConfig::new(self.hidden_size, 2)
            .with_initializer(self.initializer())
            .init(device);
        BertQaModel { bert, qa_outputs }
    }
}

// ─── Embeddings ───────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct BertEmbeddings<B: Backend> {
    pub word_embeddings:       Embedding<B>,
    pub position_embeddings:   Embedding<B>,
    pub token_type_embeddings: Embedding<B>,
    pub layer_norm:            LayerNorm<B>,
    pub dropout:               Dropout,
}

impl<B: Backend> BertEmbeddings<B> {
    pub fn forward(
        &self,
        input_ids:      Tensor<B, 2, Int>,
        token_type_ids: Tensor<B, 2, Int>,
    ) -> Tensor<B, 3> {
        let [batch_size, seq_len] = input_ids.dims();
        let device = input_ids.device();

        let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &device)
            .unsqueeze::<2>()
            .expand([batch_size, seq_len]);

        let x = self.word_embeddings.forward(input_ids)
            + self.position_embeddings.forward(positions)
            + self.token_type_embeddings.forward(token_type_ids);
        self.dropout.forward(self.layer_norm.forward(x))
    }
}

// ─── Encoder layer ────────────────────────────────────────────────────────────
// BERT is post-norm: the residual is added before the LayerNorm.
#[derive(Module, Debug)]
pub struct BertLayer<B: Backend> {
    pub attention:      MultiHeadAttention<B>,
    pub attention_norm: LayerNorm<B>,
    pub intermediate:   Linear<B>,
    pub output:         Linear<B>,
    pub output_norm:    LayerNorm<B>,
    pub dropout:        Dropout,
}

impl<B: Backend> BertLayer<B> {
    /// `mask_pad`: [batch, seq_len], true at padding positions
    pub fn forward(&self, x: Tensor<B, 3>, mask_pad: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let attn = self.attention
            .forward(MhaInput::self_attn(x.clone()).mask_pad(mask_pad))
            .context;
        let x = self.attention_norm.forward(x + self.dropout.forward(attn));

        let h = self.output.forward(gelu(self.intermediate.forward(x.clone())));
        self.output_norm.forward(x + self.dropout.forward(h))
    }
}

#[derive(Module, Debug)]
pub struct BertEncoder<B: Backend> {
    pub layer: Vec<BertLayer<B>>,
}

/// The pretrained part: embeddings + encoder (no pooler)
#[derive(Module, Debug)]
pub struct BertModel<B: Backend> {
    pub embeddings: BertEmbeddings<B>,
    pub encoder:    BertEncoder<B>,
}

impl<B: Backend> BertModel<B> {
    /// → hidden states [batch, seq_len, hidden]
    pub fn forward(
        &self,
        input_ids:      Tensor<B, 2, Int>,
        token_type_ids: Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
    ) -> Tensor<B, 3> {
        let mask_pad = attention_mask.equal_elem(0);
        let mut x = self.embeddings.forward(input_ids, token_type_ids);
        for layer in &self.encoder.layer {
            x = layer.forward(x, mask_pad.clone());
        }
        x
    }
}

// ─── Span head ────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct BertQaModel<B: Backend> {
    pub bert:       BertModel<B>,
    pub qa_outputs: Linear<B>,
}

pub struct QaModelOutput<B: Backend> {
    pub start_logits: Tensor<B, 2>,
    pub end_logits:   Tensor<B, 2>,
}

impl<B: Backend> BertQaModel<B> {
    /// All inputs [batch, seq_len] → start_logits, end_logits: [batch, seq_len]
    pub fn forward(
        &self,
        input_ids:      Tensor<B, 2, Int>,
        token_type_ids: Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
    ) -> QaModelOutput<B> {
        let [batch_size, seq_len] = input_ids.dims();
        let hidden = self.bert.forward(input_ids, token_type_ids, attention_mask);

        // Project to 2 logits per token then split into start / end.
        let logits = self.qa_outputs.forward(hidden); // [batch, seq_len, 2]
        let start_logits = logits.clone()
            .slice([0..batch_size, 0..seq_len, 0..1])
            .reshape([batch_size, seq_len]);
        let end_logits = logits
            .slice([0..batch_size, 0..seq_len, 1..2])
            .reshape([batch_size, seq_len]);

        QaModelOutput { start_logits, end_logits }
    }

    /// Loss = (CE_start + CE_end) / 2
    pub fn forward_loss(
        &self,
        input_ids:       Tensor<B, 2, Int>,
        token_type_ids:  Tensor<B, 2, Int>,
        attention_mask:  Tensor<B, 2, Int>,
        start_positions: Tensor<B, 1, Int>,
        end_positions:   Tensor<B, 1, Int>,
    ) -> (Tensor<B, 1>, QaModelOutput<B>) {
        let output = self.forward(input_ids, token_type_ids, attention_mask);
        let ce = CrossEntropyLossConfig::new().init(&output.start_logits.device());
        let loss = (ce.forward(output.start_logits.clone(), start_positions)
                  + ce.forward(output.end_logits.clone(),   end_positions)) / 2.0_f64;
        (loss, output)
    }
}
