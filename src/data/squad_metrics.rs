// ============================================================
// Layer 4 — SQuAD Answer Normalisation and Scoring
// ============================================================
// The official SQuAD evaluation compares answers only after
// normalising them:
//
//   1. Lower-case
//   2. Remove punctuation
//   3. Remove the articles "a", "an", "the"
//   4. Collapse runs of whitespace into one space
//
// Two scores per question, each taking the max over all gold
// answers:
//   - exact match: normalised strings are equal
//   - F1: token-overlap F1 of the normalised strings
//
// An unanswerable question has no gold answers; it counts as
// the single gold answer "" so only an empty prediction scores.
//
// For v2.0 the scores are also split into answerable (HasAns)
// and unanswerable (NoAns) questions, and the null odds of each
// question are swept for the threshold that would have scored best.
//
// Reference: Rajpurkar et al. (2016) SQuAD, evaluate-v2.0.py
//            Rust Book §8 (Strings in Rust)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Normalise an answer string the way the official script does.
pub fn normalize_answer(text: &str) -> String {
    // ── Lower-case and drop punctuation ──────────────────────────────────────
    let cleaned: String = text
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| !is_punctuation(*c))
        .collect();

    // ── Drop articles and collapse whitespace ────────────────────────────────
    cleaned
        .split_whitespace()
        .filter(|w| !matches!(*w, "a" | "an" | "the"))
        .collect::<Vec<_>>()
        .join(" ")
}

// ASCII punctuation, which is what Python's string.punctuation holds
fn is_punctuation(c: char) -> bool {
    c.is_ascii_punctuation()
}

pub fn exact_match(prediction: &str, gold: &str) -> f64 {
    if normalize_answer(prediction) == normalize_answer(gold) { 1.0 } else { 0.0 }
}

pub fn f1_score(prediction: &str, gold: &str) -> f64 {
    let pred_norm = normalize_answer(prediction);
    let gold_norm = normalize_answer(gold);
    let pred_tokens: Vec<&str> = pred_norm.split_whitespace().collect();
    let gold_tokens: Vec<&str> = gold_norm.split_whitespace().collect();

    // If either is empty, F1 is 1 when both are empty and 0 otherwise
    if pred_tokens.is_empty() || gold_tokens.is_empty() {
        return if pred_tokens == gold_tokens { 1.0 } else { 0.0 };
    }

    let mut gold_counts: HashMap<&str, usize> = HashMap::new();
    for t in &gold_tokens {
        *gold_counts.entry(t).or_insert(0) += 1;
    }
    let mut common = 0usize;
    for t in &pred_tokens {
        if let Some(n) = gold_counts.get_mut(t) {
            if *n > 0 {
                *n -= 1;
                common += 1;
            }
        }
    }
    if common == 0 {
        return 0.0;
    }

    let precision = common as f64 / pred_tokens.len() as f64;
    let recall    = common as f64 / gold_tokens.len() as f64;
    2.0 * precision * recall / (precision + recall)
}

/// Max of `metric` over the gold answers ("" if there are none)
pub fn max_over_golds(prediction: &str, golds: &[String], metric: fn(&str, &str) -> f64) -> f64 {
    if golds.is_empty() {
        return metric(prediction, "");
    }
    golds
        .iter()
        .map(|g| metric(prediction, g))
        .fold(0.0, f64::max)
}

/// Aggregate scores, as percentages
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SquadScores {
    pub exact: f64,
    pub f1:    f64,
    pub total: usize,
}

/// Best scores reachable by re-tuning the null threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BestThreshold {
    pub best_exact:        f64,
    pub best_exact_thresh: f64,
    pub best_f1:           f64,
    pub best_f1_thresh:    f64,
}

/// Full evaluation: overall scores, the answerable / unanswerable
/// split, and the threshold sweep when null odds are known
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SquadEval {
    #[serde(flatten)]
    pub overall: SquadScores,
    #[serde(rename = "HasAns", skip_serializing_if = "Option::is_none")]
    pub has_ans: Option<SquadScores>,
    #[serde(rename = "NoAns", skip_serializing_if = "Option::is_none")]
    pub no_ans:  Option<SquadScores>,
    #[serde(flatten)]
    pub best:    Option<BestThreshold>,
}

/// One dev question as the evaluation sees it
#[derive(Debug, Clone, Copy)]
pub struct ScoredQuestion<'a> {
    pub prediction: &'a str,
    pub golds:      &'a [String],
    /// v2.0: null score minus best span score
    pub null_odds:  Option<f32>,
}

impl ScoredQuestion<'_> {
    fn has_answer(&self) -> bool {
        !self.golds.is_empty()
    }
}

/// Score every question
pub fn evaluate(questions: &[ScoredQuestion<'_>]) -> SquadEval {
    // ── Raw per-question scores ──────────────────────────────────────────────
    let exact: Vec<f64> = questions.iter().map(|q| max_over_golds(q.prediction, q.golds, exact_match)).collect();
    let f1:    Vec<f64> = questions.iter().map(|q| max_over_golds(q.prediction, q.golds, f1_score)).collect();

    let all: Vec<usize> = (0..questions.len()).collect();
    let (answerable, unanswerable): (Vec<usize>, Vec<usize>) =
        all.iter().partition(|&&i| questions[i].has_answer());
    let split = |idx: &[usize]| (!idx.is_empty()).then(|| aggregate(idx, &exact, &f1));

    // ── Threshold sweep, only when every question carries null odds ──────────
    let best = (!questions.is_empty() && questions.iter().all(|q| q.null_odds.is_some())).then(|| {
        let (best_exact, best_exact_thresh) = best_threshold(questions, &exact);
        let (best_f1, best_f1_thresh)       = best_threshold(questions, &f1);
        BestThreshold { best_exact, best_exact_thresh, best_f1, best_f1_thresh }
    });

    SquadEval {
        overall: aggregate(&all, &exact, &f1),
        has_ans: split(&answerable),
        no_ans:  split(&unanswerable),
        best,
    }
}

fn aggregate(idx: &[usize], exact: &[f64], f1: &[f64]) -> SquadScores {
    let total = idx.len();
    if total == 0 {
        return SquadScores { exact: 0.0, f1: 0.0, total };
    }
    let sum = |scores: &[f64]| idx.iter().map(|&i| scores[i]).sum::<f64>();
    SquadScores {
        exact: 100.0 * sum(exact) / total as f64,
        f1:    100.0 * sum(f1) / total as f64,
        total,
    }
}

// Start from "abstain on everything" and answer questions in order of
// increasing null odds; the best running total fixes the threshold.
// Abstaining is right exactly on the unanswerable questions.
fn best_threshold(questions: &[ScoredQuestion<'_>], scores: &[f64]) -> (f64, f64) {
    let odds = |i: usize| questions[i].null_odds.map_or(0.0, f64::from);

    let mut order: Vec<usize> = (0..questions.len()).collect();
    order.sort_by(|&a, &b| odds(a).total_cmp(&odds(b)));

    let mut current = questions.iter().filter(|q| !q.has_answer()).count() as f64;
    let mut best        = current;
    let mut best_thresh = 0.0;
    for i in order {
        let q = &questions[i];
        current += if q.has_answer() {
            scores[i]
        } else if q.prediction.is_empty() {
            0.0
        } else {
            -1.0
        };
        if current > best {
            best        = current;
            best_thresh = odds(i);
        }
    }
    (100.0 * best / questions.len() as f64, best_thresh)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_articles_punctuation_case() {
        assert_eq!(normalize_answer("The  Blue, sky!"), "blue sky");
        assert_eq!(normalize_answer("an apple a day"), "apple day");
        assert_eq!(normalize_answer("  "), "");
    }

    #[test]
    fn test_exact_match_after_normalisation() {
        assert_eq!(exact_match("the Blue.", "blue"), 1.0);
        assert_eq!(exact_match("blue sky", "blue"), 0.0);
    }

    #[test]
    fn test_f1_partial_overlap() {
        // pred: [blue, sky], gold: [blue] → p=0.5, r=1 → 2/3
        let f1 = f1_score("blue sky", "blue");
        assert!((f1 - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(f1_score("red", "blue"), 0.0);
    }

    #[test]
    fn test_empty_answers() {
        assert_eq!(f1_score("", ""), 1.0);
        assert_eq!(f1_score("blue", ""), 0.0);
        // No gold answers: only "" is right
        assert_eq!(max_over_golds("", &[], exact_match), 1.0);
        assert_eq!(max_over_golds("blue", &[], exact_match), 0.0);
    }

    #[test]
    fn test_score_takes_max_over_golds() {
        let golds_a = vec!["blue".to_string(), "light blue".to_string()];
        let golds_b = vec!["green".to_string()];
        let eval = evaluate(&[
            ScoredQuestion { prediction: "light blue", golds: &golds_a, null_odds: None },
            ScoredQuestion { prediction: "red",        golds: &golds_b, null_odds: None },
        ]);
        assert_eq!(eval.overall.total, 2);
        assert!((eval.overall.exact - 50.0).abs() < 1e-9);
        assert!((eval.overall.f1 - 50.0).abs() < 1e-9);
        // v1.1: every question is answerable, nothing to sweep
        assert_eq!(eval.has_ans, Some(eval.overall));
        assert!(eval.no_ans.is_none());
        assert!(eval.best.is_none());
    }

    #[test]
    fn test_v2_splits_and_best_threshold() {
        let blue  = vec!["blue".to_string()];
        let green = vec!["green".to_string()];
        let none: Vec<String> = Vec::new();
        let eval = evaluate(&[
            ScoredQuestion { prediction: "blue",  golds: &blue,  null_odds: Some(-5.0) },
            // Unanswerable, but the reader answered
            ScoredQuestion { prediction: "red",   golds: &none,  null_odds: Some(2.0) },
            ScoredQuestion { prediction: "green", golds: &green, null_odds: Some(1.0) },
            ScoredQuestion { prediction: "",      golds: &none,  null_odds: Some(-1.0) },
        ]);

        assert_eq!(eval.overall.total, 4);
        assert!((eval.overall.exact - 75.0).abs() < 1e-9);
        assert_eq!(eval.has_ans, Some(SquadScores { exact: 100.0, f1: 100.0, total: 2 }));
        assert_eq!(eval.no_ans, Some(SquadScores { exact: 50.0, f1: 50.0, total: 2 }));

        // Abstaining above odds 1.0 drops only the wrong "red"
        let best = eval.best.unwrap();
        assert!((best.best_exact - 100.0).abs() < 1e-9);
        assert_eq!(best.best_exact_thresh, 1.0);
        assert!((best.best_f1 - 100.0).abs() < 1e-9);
        assert_eq!(best.best_f1_thresh, 1.0);
    }

    #[test]
    fn test_best_threshold_can_mean_abstaining_everywhere() {
        let blue = vec!["blue".to_string()];
        let none: Vec<String> = Vec::new();
        let eval = evaluate(&[
            ScoredQuestion { prediction: "red",  golds: &blue, null_odds: Some(-2.0) },
            ScoredQuestion { prediction: "blue", golds: &none, null_odds: Some(-3.0) },
        ]);
        let best = eval.best.unwrap();
        // Answering never beats the one free no-answer point
        assert!((best.best_exact - 50.0).abs() < 1e-9);
        assert_eq!(best.best_exact_thresh, 0.0);
        assert!(eval.overall.exact.abs() < 1e-9);
    }

    #[test]
    fn test_split_scores_serialise_with_official_names() {
        let none: Vec<String> = Vec::new();
        let eval = evaluate(&[ScoredQuestion { prediction: "", golds: &none, null_odds: Some(0.5) }]);
        let json = serde_json::to_value(&eval).unwrap();
        assert_eq!(json["total"], 1);
        assert_eq!(json["NoAns"]["total"], 1);
        assert!(json.get("HasAns").is_none());
        assert!(json.get("best_f1_thresh").is_some());
    }
}
