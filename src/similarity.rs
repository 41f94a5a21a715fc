//! Text and vector similarity
//!
//! Jaccard over token sets is the cheap pre-filter used when new memories
//! arrive; cosine over embeddings refines ranking at recall time. Both are
//! pure functions over plain data.

use std::collections::HashSet;

use crate::types::EdgeStatus;

/// Jaccard score below which two texts are unrelated
pub const DIFFERENT_THRESHOLD: f64 = 0.1;

/// Jaccard score above which two texts are clearly related
pub const SIMILAR_THRESHOLD: f64 = 0.6;

/// Within the maybe band, scores at or above this suggest rather than link
pub const SUGGEST_THRESHOLD: f64 = 0.4;

/// Within the maybe band, scores at or above this are consolidation
/// candidates
pub const CONSOLIDATE_THRESHOLD: f64 = 0.5;

/// Verdict of the Jaccard pre-filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimilarityVerdict {
    /// Below 0.1: skip entirely
    DefinitelyDifferent,
    /// 0.1 to 0.6: proceed to action classification
    Maybe(SimilarityAction),
    /// Above 0.6: create a strong relates_to edge
    DefinitelySimilar,
}

/// Action classification inside the maybe band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimilarityAction {
    /// 0.1 to 0.4: create an active relates_to edge
    Relate,
    /// 0.4 to 0.5: create a suggested relates_to edge
    Suggest,
    /// 0.5 to 0.6: candidate for consolidation (logged, not acted on)
    Consolidate,
}

/// Tokenize text into a deduplicated set of lowercase words. Order and
/// count are discarded.
pub fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Jaccard similarity of two token sets: |A ∩ B| / |A ∪ B|, zero when the
/// union is empty.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    intersection as f64 / union as f64
}

/// Jaccard similarity of two texts
pub fn jaccard_text(a: &str, b: &str) -> f64 {
    jaccard(&tokenize(a), &tokenize(b))
}

/// Cosine similarity over equal-dimension vectors. Returns zero for
/// mismatched dimensions or zero-norm inputs; callers must only compare
/// embeddings of the same kind.
pub fn cosine<T: Copy + Into<f64>>(a: &[T], b: &[T]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y): (f64, f64) = (x.into(), y.into());
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Classify a Jaccard score into the pre-filter verdict
pub fn classify(score: f64) -> SimilarityVerdict {
    if score < DIFFERENT_THRESHOLD {
        SimilarityVerdict::DefinitelyDifferent
    } else if score > SIMILAR_THRESHOLD {
        SimilarityVerdict::DefinitelySimilar
    } else if score < SUGGEST_THRESHOLD {
        SimilarityVerdict::Maybe(SimilarityAction::Relate)
    } else if score < CONSOLIDATE_THRESHOLD {
        SimilarityVerdict::Maybe(SimilarityAction::Suggest)
    } else {
        SimilarityVerdict::Maybe(SimilarityAction::Consolidate)
    }
}

/// Map a Jaccard score to the edge it warrants, if any: the edge status and
/// strength for a relates_to edge, or `None` when the score warrants no
/// edge (unrelated, or a consolidation candidate left to review).
pub fn edge_plan(score: f64) -> Option<(EdgeStatus, f64)> {
    match classify(score) {
        SimilarityVerdict::DefinitelyDifferent => None,
        SimilarityVerdict::DefinitelySimilar => Some((EdgeStatus::Active, score)),
        SimilarityVerdict::Maybe(SimilarityAction::Relate) => Some((EdgeStatus::Active, score)),
        SimilarityVerdict::Maybe(SimilarityAction::Suggest) => {
            Some((EdgeStatus::Suggested, score))
        }
        SimilarityVerdict::Maybe(SimilarityAction::Consolidate) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_lowercases_and_dedupes() {
        let tokens = tokenize("The quick QUICK brown-fox, fox!");
        assert!(tokens.contains("quick"));
        assert!(tokens.contains("brown"));
        assert!(tokens.contains("fox"));
        assert_eq!(tokens.len(), 4);
    }

    #[test]
    fn test_jaccard_identity_and_bounds() {
        let a = tokenize("modular architecture enables testability");
        assert_eq!(jaccard(&a, &a), 1.0);

        let b = tokenize("completely unrelated words here");
        let score = jaccard(&a, &b);
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn test_jaccard_empty_union_is_zero() {
        let empty = HashSet::new();
        assert_eq!(jaccard(&empty, &empty), 0.0);
    }

    #[test]
    fn test_jaccard_symmetric() {
        let a = tokenize("pattern x involves modular architecture");
        let b = tokenize("modular architecture enables testability");
        assert_eq!(jaccard(&a, &b), jaccard(&b, &a));
    }

    #[test]
    fn test_cosine_identical_vectors() {
        let v = vec![0.5_f64, 0.2, -0.3];
        assert!((cosine(&v, &v) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0_f64, 0.0];
        let b = vec![0.0_f64, 1.0];
        assert_eq!(cosine(&a, &b), 0.0);
    }

    #[test]
    fn test_cosine_mismatched_dims_zero() {
        let a = vec![1.0_f64, 0.0];
        let b = vec![1.0_f64, 0.0, 0.0];
        assert_eq!(cosine(&a, &b), 0.0);
    }

    #[test]
    fn test_cosine_f32_inputs() {
        let a = vec![1.0_f32, 2.0];
        let b = vec![2.0_f32, 4.0];
        assert!((cosine(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_classify_bands() {
        assert_eq!(classify(0.05), SimilarityVerdict::DefinitelyDifferent);
        assert_eq!(
            classify(0.1),
            SimilarityVerdict::Maybe(SimilarityAction::Relate)
        );
        assert_eq!(
            classify(0.39),
            SimilarityVerdict::Maybe(SimilarityAction::Relate)
        );
        assert_eq!(
            classify(0.4),
            SimilarityVerdict::Maybe(SimilarityAction::Suggest)
        );
        assert_eq!(
            classify(0.49),
            SimilarityVerdict::Maybe(SimilarityAction::Suggest)
        );
        assert_eq!(
            classify(0.5),
            SimilarityVerdict::Maybe(SimilarityAction::Consolidate)
        );
        assert_eq!(
            classify(0.6),
            SimilarityVerdict::Maybe(SimilarityAction::Consolidate)
        );
        assert_eq!(classify(0.61), SimilarityVerdict::DefinitelySimilar);
    }

    #[test]
    fn test_edge_plan() {
        assert_eq!(edge_plan(0.05), None);
        assert_eq!(edge_plan(0.2), Some((EdgeStatus::Active, 0.2)));
        assert_eq!(edge_plan(0.45), Some((EdgeStatus::Suggested, 0.45)));
        assert_eq!(edge_plan(0.55), None);
        assert_eq!(edge_plan(0.8), Some((EdgeStatus::Active, 0.8)));
    }
}
