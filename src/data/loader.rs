// ============================================================
// Layer 4 — SQuAD Loader
// ============================================================
// Reads a SQuAD-format JSON file and flattens it into one
// SquadExample per question, in file order.
//
// The file layout is:
//   data
//     └── articles
//           └── paragraphs (context)
//                 └── qas (question + answers)
//
// Malformed JSON is fatal. A single bad question (a training
// question without an answer, say) is logged and skipped so
// one noisy record never aborts a whole preprocessing pass.
//
// Reference: Rajpurkar et al. (2016) SQuAD
//            Rust Book §9 (Error Handling)

use anyhow::{Context, Result};
use std::{fs, path::PathBuf};

use crate::domain::squad::{GoldAnswer, SquadExample, SquadFile};
use crate::domain::traits::ExampleSource;

pub struct SquadLoader {
    path:                    PathBuf,
    is_training:             bool,
    version_2_with_negative: bool,
}

impl SquadLoader {
    pub fn new(path: impl Into<PathBuf>, is_training: bool, version_2_with_negative: bool) -> Self {
        Self { path: path.into(), is_training, version_2_with_negative }
    }

    /// Flatten an already-read SQuAD JSON document
    pub fn parse(&self, json: &str) -> Result<Vec<SquadExample>> {
        let file: SquadFile = serde_json::from_str(json)
            .with_context(|| format!("'{}' is not a valid SQuAD file", self.path.display()))?;

        if let Some(version) = &file.version {
            tracing::debug!("SQuAD file version {}", version);
        }

        let mut examples = Vec::new();
        let mut skipped  = 0usize;

        for article in &file.data {
            for paragraph in &article.paragraphs {
                for qa in &paragraph.qas {
                    let is_impossible = self.version_2_with_negative && qa.is_impossible;
                    let all_answers: Vec<String> =
                        qa.answers.iter().map(|a| a.text.clone()).collect();

                    let answer = if is_impossible {
                        None
                    } else {
                        match qa.answers.first() {
                            Some(a) => Some(GoldAnswer {
                                text:       a.text.clone(),
                                char_start: a.answer_start,
                            }),
                            None if self.is_training => {
                                tracing::warn!("Skipping '{}': training question has no answer", qa.id);
                                skipped += 1;
                                continue;
                            }
                            None => None,
                        }
                    };

                    if self.is_training && !is_impossible && qa.answers.len() > 1 {
                        tracing::debug!(
                            "'{}' has {} answers, training on the first",
                            qa.id, qa.answers.len()
                        );
                    }

                    examples.push(SquadExample {
                        qas_id:   qa.id.clone(),
                        question: qa.question.clone(),
                        context:  paragraph.context.clone(),
                        answer,
                        all_answers,
                        is_impossible,
                    });
                }
            }
        }

        tracing::info!(
            "Read {} examples from '{}' ({} skipped)",
            examples.len(), self.path.display(), skipped
        );
        Ok(examples)
    }
}

impl ExampleSource for SquadLoader {
    fn load_examples(&self) -> Result<Vec<SquadExample>> {
        let json = fs::read_to_string(&self.path)
            .with_context(|| format!("Cannot read SQuAD file '{}'", self.path.display()))?;
        self.parse(&json)
    }
}
