// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Loads the WordPiece tokenizer that belongs to a pretrained
// BERT checkpoint and configures it for the reader.
//
// A model directory ships either a HuggingFace `tokenizer.json`
// or a plain `vocab.txt` (one token per line, id = line index).
// For vocab.txt we write the tokenizer JSON ourselves and load
// it; building it through JSON keeps us independent of the
// builder API differences between tokenizers releases.
//
// The reader always assembles [CLS] q [SEP] c [SEP] itself, so
// any padding / truncation baked into tokenizer.json is removed.
//
// Reference: Wu et al. (2016) WordPiece

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tokenizers::Tokenizer;

pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const VOCAB_FILE:     &str = "vocab.txt";

const SPECIAL_TOKENS: [&str; 5] = ["[PAD]", "[UNK]", "[CLS]", "[SEP]", "[MASK]"];

pub struct TokenizerStore {
    dir: PathBuf,
}

impl TokenizerStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    /// Load tokenizer.json if present, otherwise build one from vocab.txt.
    /// Lower-casing is forced on or off according to `do_lower_case`.
    pub fn load(&self, do_lower_case: bool) -> Result<Tokenizer> {
        let tok_path = self.dir.join(TOKENIZER_FILE);
        if tok_path.exists() {
            tracing::info!("Loading tokenizer from '{}'", tok_path.display());
            let tokenizer = Tokenizer::from_file(&tok_path)
                .map_err(|e| anyhow::anyhow!(
                    "Cannot load tokenizer from '{}': {}", tok_path.display(), e
                ))?;
            return configure_for_reader(&tokenizer, do_lower_case);
        }

        let vocab_path = self.dir.join(VOCAB_FILE);
        tracing::info!("Building WordPiece tokenizer from '{}'", vocab_path.display());
        let vocab = fs::read_to_string(&vocab_path)
            .with_context(|| format!(
                "No '{}' or '{}' in '{}'",
                TOKENIZER_FILE, VOCAB_FILE, self.dir.display()
            ))?;
        let tokens: Vec<String> = vocab.lines().map(|l| l.trim_end().to_string()).collect();
        build_word_piece(&tokens, do_lower_case)
    }

    /// Write the tokenizer next to the training outputs
    pub fn save(&self, tokenizer: &Tokenizer) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;
        let path = self.dir.join(TOKENIZER_FILE);
        tokenizer
            .save(&path, true)
            .map_err(|e| anyhow::anyhow!("Cannot save tokenizer to '{}': {e}", path.display()))?;
        tracing::debug!("Saved tokenizer to '{}'", path.display());
        Ok(path)
    }
}

/// Build a BERT WordPiece tokenizer from an ordered vocabulary.
/// Token ids are the positions in `vocab`.
pub fn build_word_piece(vocab: &[String], do_lower_case: bool) -> Result<Tokenizer> {
    let mut vocab_map = serde_json::Map::new();
    for (id, token) in vocab.iter().enumerate() {
        if token.is_empty() {
            continue;
        }
        // First occurrence wins, like the reference vocab loader
        vocab_map.entry(token.clone()).or_insert(json!(id));
    }

    // Special tokens must be in the vocabulary; we never invent ids
    let added_tokens: Vec<Value> = SPECIAL_TOKENS
        .iter()
        .filter_map(|tok| vocab_map.get(*tok).map(|id| json!({
            "id": id, "content": tok, "single_word": false, "lstrip": false,
            "rstrip": false, "normalized": false, "special": true
        })))
        .collect();

    if !vocab_map.contains_key("[UNK]") {
        anyhow::bail!("Vocabulary has no [UNK] token");
    }

    let tokenizer_json = json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": added_tokens,
        "normalizer": {
            "type": "BertNormalizer",
            "clean_text": true,
            "handle_chinese_chars": true,
            "strip_accents": null,
            "lowercase": do_lower_case
        },
        "pre_tokenizer": { "type": "BertPreTokenizer" },
        "post_processor": null,
        "decoder": { "type": "WordPiece", "prefix": "##", "cleanup": true },
        "model": {
            "type": "WordPiece",
            "unk_token": "[UNK]",
            "continuing_subword_prefix": "##",
            "max_input_chars_per_word": 100,
            "vocab": Value::Object(vocab_map)
        }
    });

    Tokenizer::from_str(&tokenizer_json.to_string())
        .map_err(|e| anyhow::anyhow!("Cannot build WordPiece tokenizer: {e}"))
}

/// Return a copy of `tokenizer` with lower-casing set to
/// `do_lower_case` and padding / truncation switched off.
pub fn configure_for_reader(tokenizer: &Tokenizer, do_lower_case: bool) -> Result<Tokenizer> {
    let raw = tokenizer
        .to_string(false)
        .map_err(|e| anyhow::anyhow!("Cannot serialise tokenizer: {e}"))?;
    let mut value: Value = serde_json::from_str(&raw)?;

    value["padding"]    = Value::Null;
    value["truncation"] = Value::Null;
    let normalizer = value["normalizer"].take();
    value["normalizer"] = with_lowercase(normalizer, do_lower_case);

    Tokenizer::from_str(&value.to_string())
        .map_err(|e| anyhow::anyhow!("Cannot rebuild tokenizer: {e}"))
}

fn with_lowercase(normalizer: Value, lowercase: bool) -> Value {
    let kind = normalizer.get("type").and_then(Value::as_str).map(str::to_owned);
    match kind.as_deref() {
        None if lowercase => json!({ "type": "Lowercase" }),
        None => Value::Null,
        Some("BertNormalizer") => {
            let mut n = normalizer;
            n["lowercase"] = json!(lowercase);
            n
        }
        Some("Lowercase") if !lowercase => Value::Null,
        Some("Lowercase") => normalizer,
        Some(_) if lowercase => json!({
            "type": "Sequence",
            "normalizers": [normalizer, { "type": "Lowercase" }]
        }),
        Some(other) => {
            tracing::warn!("Cannot disable lower-casing inside a '{other}' normalizer");
            normalizer
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> Vec<String> {
        ["[PAD]", "[UNK]", "[CLS]", "[SEP]", "[MASK]", "the", "sky", "is", "blue", "##s", "."]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_word_piece_ids_follow_vocab_order() {
        let tok = build_word_piece(&vocab(), true).unwrap();
        let enc = tok.encode("The sky is blues.", false).unwrap();
        assert_eq!(enc.get_ids(), &[5, 6, 7, 8, 9, 10]);
        assert_eq!(tok.token_to_id("[CLS]"), Some(2));
    }

    #[test]
    fn test_lowercase_flag_is_respected() {
        let tok = build_word_piece(&vocab(), false).unwrap();
        let enc = tok.encode("The", false).unwrap();
        // "The" is not in the cased vocabulary
        assert_eq!(enc.get_ids(), &[1]);

        let lowered = configure_for_reader(&tok, true).unwrap();
        assert_eq!(lowered.encode("The", false).unwrap().get_ids(), &[5]);
    }

    #[test]
    fn test_load_from_vocab_file_and_save() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(VOCAB_FILE), vocab().join("\n")).unwrap();

        let store = TokenizerStore::new(dir.path());
        let tok = store.load(true).unwrap();
        assert_eq!(tok.encode("sky", false).unwrap().get_ids(), &[6]);

        // Once saved, tokenizer.json takes precedence over vocab.txt
        store.save(&tok).unwrap();
        fs::remove_file(dir.path().join(VOCAB_FILE)).unwrap();
        let reloaded = store.load(true).unwrap();
        assert_eq!(reloaded.encode("blue", false).unwrap().get_ids(), &[8]);
    }

    #[test]
    fn test_missing_unk_is_an_error() {
        let v: Vec<String> = vec!["[PAD]".into(), "sky".into()];
        assert!(build_word_piece(&v, true).is_err());
    }
}
