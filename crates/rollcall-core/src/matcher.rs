//! Identity decision from mean per-identity correlation.

use crate::enrollment::EnrollmentStore;
use crate::signature::{self, SignatureError};
use crate::types::{MatchResult, Signature};
use image::DynamicImage;

/// Mean similarity an identity must strictly exceed to be accepted.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.7;

/// Strategy for comparing a probe signature against an enrollment store.
pub trait Matcher {
    fn compare(&self, probe: &Signature, store: &EnrollmentStore) -> MatchResult;
}

impl<M: Matcher + ?Sized> Matcher for &M {
    fn compare(&self, probe: &Signature, store: &EnrollmentStore) -> MatchResult {
        (**self).compare(probe, store)
    }
}

/// Pearson-correlation matcher.
///
/// Each identity scores the mean correlation over all of its reference
/// signatures, so one lucky reference shot cannot carry an identity whose
/// other shots disagree.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationMatcher {
    threshold: f64,
}

impl CorrelationMatcher {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Default for CorrelationMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_THRESHOLD)
    }
}

impl Matcher for CorrelationMatcher {
    fn compare(&self, probe: &Signature, store: &EnrollmentStore) -> MatchResult {
        let scores = store
            .iter()
            .map(|(identity, references)| (identity, mean_similarity(probe, references)));
        decide(scores, self.threshold)
    }
}

/// Mean correlation of `probe` against every reference. No references scores 0.
pub fn mean_similarity(probe: &Signature, references: &[Signature]) -> f64 {
    if references.is_empty() {
        return 0.0;
    }
    let total: f64 = references.iter().map(|r| probe.similarity(r)).sum();
    total / references.len() as f64
}

/// Pick the best-scoring identity and accept it only above `threshold`.
///
/// Scores are visited in order; an identity replaces the current best only
/// with a strictly higher score, so ties resolve to the first one seen.
pub fn decide<'a, I>(scores: I, threshold: f64) -> MatchResult
where
    I: IntoIterator<Item = (&'a str, f64)>,
{
    let mut best: Option<(&str, f64)> = None;
    for (identity, score) in scores {
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((identity, score)),
        }
    }

    match best {
        Some((identity, score)) if score > threshold => MatchResult {
            identity: Some(identity.to_string()),
            score,
        },
        _ => MatchResult::unknown(threshold),
    }
}

/// Extract a signature from a face region and match it.
pub fn recognize<M: Matcher + ?Sized>(
    region: &DynamicImage,
    store: &EnrollmentStore,
    matcher: &M,
) -> Result<MatchResult, SignatureError> {
    let probe = signature::extract(region)?;
    let result = matcher.compare(&probe, store);
    tracing::debug!(
        identity = result.identity.as_deref().unwrap_or("unknown"),
        score = result.score,
        "recognition attempt"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(values: &[f32]) -> Signature {
        Signature::from_values(values.to_vec())
    }

    // Exactly representable correlations against PROBE: A = 1, B = -1, C = 0.
    const PROBE: [f32; 4] = [1.0, -1.0, 1.0, -1.0];
    const A: [f32; 4] = [1.0, -1.0, 1.0, -1.0];
    const B: [f32; 4] = [-1.0, 1.0, -1.0, 1.0];
    const C: [f32; 4] = [1.0, 1.0, -1.0, -1.0];

    fn store(entries: &[(&str, &[f32])]) -> EnrollmentStore {
        entries
            .iter()
            .map(|(name, values)| (name.to_string(), sig(values)))
            .collect()
    }

    #[test]
    fn test_accepts_best_identity() {
        let store = store(&[("bob", &C), ("alice", &A)]);
        let result = CorrelationMatcher::default().compare(&sig(&PROBE), &store);
        assert_eq!(result.identity.as_deref(), Some("alice"));
        assert!((result.score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_mean_not_max_or_min() {
        // One identical and one uncorrelated reference: mean 0.5, max 1, min 0.
        let store = store(&[("alice", &A), ("alice", &C)]);
        let references = store.signatures("alice").unwrap();
        assert_eq!(references.len(), 2);
        assert_eq!(mean_similarity(&sig(&PROBE), references), 0.5);

        let lenient = CorrelationMatcher::new(0.4).compare(&sig(&PROBE), &store);
        assert_eq!(lenient.identity.as_deref(), Some("alice"));
        assert_eq!(lenient.score, 0.5);

        let strict = CorrelationMatcher::default().compare(&sig(&PROBE), &store);
        assert!(!strict.is_match());
    }

    #[test]
    fn test_score_at_threshold_rejected() {
        let store = store(&[("alice", &A), ("alice", &C)]);
        let result = CorrelationMatcher::new(0.5).compare(&sig(&PROBE), &store);
        assert_eq!(result, MatchResult::unknown(0.5));
    }

    #[test]
    fn test_decide_boundary() {
        let at = decide([("alice", 0.7)], DEFAULT_MATCH_THRESHOLD);
        assert!(!at.is_match());
        assert_eq!(at.score, DEFAULT_MATCH_THRESHOLD);

        let above = decide([("alice", 0.7000001)], DEFAULT_MATCH_THRESHOLD);
        assert_eq!(above.identity.as_deref(), Some("alice"));
        assert_eq!(above.score, 0.7000001);
    }

    #[test]
    fn test_decide_tie_keeps_first() {
        let result = decide([("alice", 0.9), ("bob", 0.9), ("carol", 0.8)], 0.7);
        assert_eq!(result.identity.as_deref(), Some("alice"));
    }

    #[test]
    fn test_tie_resolves_lexicographically() {
        let store = store(&[("zed", &A), ("amy", &A)]);
        let result = CorrelationMatcher::default().compare(&sig(&PROBE), &store);
        assert_eq!(result.identity.as_deref(), Some("amy"));
    }

    #[test]
    fn test_empty_store_is_unknown() {
        let result = CorrelationMatcher::default().compare(&sig(&PROBE), &EnrollmentStore::empty());
        assert_eq!(result, MatchResult::unknown(DEFAULT_MATCH_THRESHOLD));
    }

    #[test]
    fn test_negative_scores_unknown() {
        let store = store(&[("bob", &B)]);
        let result = CorrelationMatcher::default().compare(&sig(&PROBE), &store);
        assert!(!result.is_match());
    }

    #[test]
    fn test_deterministic() {
        let store = store(&[("alice", &A), ("bob", &C), ("alice", &C)]);
        let matcher = CorrelationMatcher::new(0.3);
        let first = matcher.compare(&sig(&PROBE), &store);
        for _ in 0..10 {
            assert_eq!(matcher.compare(&sig(&PROBE), &store), first);
        }
    }

    #[test]
    fn test_noise_image_rejected() {
        use image::{GrayImage, Luma};
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        // Dark face on a bright wall: a two-peaked histogram.
        let reference = DynamicImage::ImageLuma8(GrayImage::from_fn(100, 100, |x, y| {
            if (30..70).contains(&x) && (20..80).contains(&y) {
                Luma([60])
            } else {
                Luma([210])
            }
        }));
        let enrolled = signature::extract(&reference).unwrap();
        let store: EnrollmentStore = [("alice".to_string(), enrolled)].into_iter().collect();
        let matcher = CorrelationMatcher::default();

        let same = recognize(&reference, &store, &matcher).unwrap();
        assert_eq!(same.identity.as_deref(), Some("alice"));

        let mut rng = StdRng::seed_from_u64(42);
        let noise =
            DynamicImage::ImageLuma8(GrayImage::from_fn(100, 100, |_, _| Luma([rng.gen::<u8>()])));
        let result = recognize(&noise, &store, &matcher).unwrap();
        assert_eq!(result, MatchResult::unknown(DEFAULT_MATCH_THRESHOLD));
    }
}
