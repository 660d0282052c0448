//! Character-level sequence similarity.
//!
//! The ratio is `2 * M / T`, where `M` is the number of characters in the
//! matching blocks of a minimal diff and `T` the combined length of both
//! strings. The default duplicate threshold of 0.85 is calibrated against
//! this metric.

use similar::{capture_diff_slices, get_diff_ratio, Algorithm};

/// Returns the normalized similarity of `a` and `b` in `[0.0, 1.0]`.
///
/// Identical strings (including two empty strings) score 1.0; strings
/// with no character in common score 0.0.
///
/// # Examples
///
/// ```
/// use dossier::similarity::similarity;
///
/// assert_eq!(similarity("", ""), 1.0);
/// assert_eq!(similarity("abc", "abc"), 1.0);
/// assert_eq!(similarity("abc", "xyz"), 0.0);
/// ```
#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let left: Vec<char> = a.chars().collect();
    let right: Vec<char> = b.chars().collect();
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let ops = capture_diff_slices(Algorithm::Myers, &left, &right);
    let ratio = f64::from(get_diff_ratio(&ops, left.len(), right.len()));
    ratio.clamp(0.0, 1.0)
}

/// Scorer handle for callers that want a value rather than a free function.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimilarityScorer;

impl SimilarityScorer {
    /// See [`similarity`].
    #[must_use]
    pub fn similarity(self, a: &str, b: &str) -> f64 {
        similarity(a, b)
    }
}
