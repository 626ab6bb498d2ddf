// ============================================================
// Layer 4 — Context Window Chunker
// ============================================================
// Splits a long tokenized context into overlapping windows.
//
// Why do we need windows?
//   BERT takes at most max_seq_length tokens, and the question
//   plus three special tokens already use some of them. Longer
//   contexts are cut into several windows; the stride keeps
//   consecutive windows overlapping so an answer near a
//   boundary appears whole in at least one of them.
//
// Example with max_tokens=5, stride=2 over 10 tokens:
//   Window 0: tokens 0-4
//   Window 1: tokens 2-6
//   Window 2: tokens 4-8
//   Window 3: tokens 6-9   ← last window reaches the end
//
// A token that appears in several windows is predicted from
// the window where it has the most context on both sides
// (see `is_max_context`).
//
// Reference: Devlin et al. (2019) BERT paper - sliding window approach

/// One window over the context tokens: [start, start + length)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocSpan {
    pub start:  usize,
    pub length: usize,
}

impl DocSpan {
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    pub fn contains(&self, position: usize) -> bool {
        position >= self.start && position < self.end()
    }
}

pub struct Chunker {
    /// Maximum number of context tokens per window
    max_tokens: usize,
    /// Maximum distance between the starts of two windows
    stride: usize,
}

impl Chunker {
    /// # Panics
    /// Panics if either argument is zero, which would never advance.
    pub fn new(max_tokens: usize, stride: usize) -> Self {
        assert!(max_tokens > 0, "max_tokens must be positive");
        assert!(stride > 0, "stride must be positive");
        Self { max_tokens, stride }
    }

    /// Windows covering `num_tokens` context tokens, in order
    pub fn chunk(&self, num_tokens: usize) -> Vec<DocSpan> {
        let mut spans = Vec::new();
        let mut start = 0usize;

        while start < num_tokens {
            let length = (num_tokens - start).min(self.max_tokens);
            spans.push(DocSpan { start, length });

            if start + length == num_tokens {
                break;
            }
            start += length.min(self.stride);
        }

        spans
    }

    /// Whether `spans[span_index]` is the window with the most
    /// surrounding context for token `position`.
    ///
    /// score = min(tokens to the left, tokens to the right) + 0.01 * window length
    pub fn is_max_context(spans: &[DocSpan], span_index: usize, position: usize) -> bool {
        let mut best: Option<(f64, usize)> = None;

        for (index, span) in spans.iter().enumerate() {
            if !span.contains(position) {
                continue;
            }
            let left  = position - span.start;
            let right = span.end() - 1 - position;
            let score = left.min(right) as f64 + 0.01 * span.length as f64;

            match best {
                Some((best_score, _)) if score <= best_score => {}
                _ => best = Some((score, index)),
            }
        }

        best.map(|(_, index)| index) == Some(span_index)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windows_overlap_by_stride() {
        let spans = Chunker::new(5, 2).chunk(10);
        let starts: Vec<usize> = spans.iter().map(|s| s.start).collect();
        assert_eq!(starts, vec![0, 2, 4, 6]);
        assert_eq!(spans.last().unwrap().end(), 10);
    }

    #[test]
    fn test_short_context_gives_one_window() {
        let spans = Chunker::new(100, 10).chunk(7);
        assert_eq!(spans, vec![DocSpan { start: 0, length: 7 }]);
    }

    #[test]
    fn test_empty_context_gives_no_windows() {
        assert!(Chunker::new(5, 2).chunk(0).is_empty());
    }

    #[test]
    fn test_stride_larger_than_window_does_not_skip_tokens() {
        // stride is capped by the window length
        let spans = Chunker::new(3, 10).chunk(7);
        let starts: Vec<usize> = spans.iter().map(|s| s.start).collect();
        assert_eq!(starts, vec![0, 3, 6]);
    }

    #[test]
    fn test_max_context_prefers_centred_window() {
        let spans = Chunker::new(5, 2).chunk(10);
        // token 4: window 0 → (4,0), window 1 → (2,2), window 2 → (0,4)
        assert!(!Chunker::is_max_context(&spans, 0, 4));
        assert!(Chunker::is_max_context(&spans, 1, 4));
        assert!(!Chunker::is_max_context(&spans, 2, 4));
        // token 0 only lives in window 0
        assert!(Chunker::is_max_context(&spans, 0, 0));
    }

    #[test]
    #[should_panic]
    fn test_zero_stride_panics() {
        let _ = Chunker::new(5, 0);
    }
}
