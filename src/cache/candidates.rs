//! Candidate generation: one entry per eligible segment, in wire order

use super::classifier::{Classification, ContentClassifier, Thresholds};
use super::segment::{Position, Segment};
use super::{ContentType, RetentionTier};

/// A segment that may receive a cache breakpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheCandidate {
    pub position: Position,
    pub tier: RetentionTier,
    pub tokens: usize,
    pub content_type: ContentType,
    pub eligible: bool,
}

impl CacheCandidate {
    pub fn new(position: Position, tier: RetentionTier, tokens: usize) -> Self {
        let content_type = match tier {
            RetentionTier::Long => ContentType::Stable,
            RetentionTier::Short => ContentType::Volatile,
        };
        Self {
            position,
            tier,
            tokens,
            content_type,
            eligible: true,
        }
    }
}

/// A segment together with its classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifiedSegment {
    pub position: Position,
    pub class: Classification,
}

/// Classify every segment once, in wire order
pub fn classify_segments(
    segments: &[Segment<'_>],
    classifier: &ContentClassifier,
    thresholds: Thresholds,
) -> Vec<ClassifiedSegment> {
    segments
        .iter()
        .map(|segment| ClassifiedSegment {
            position: segment.position,
            class: classifier.classify(segment.text, thresholds),
        })
        .collect()
}

/// Keep the eligible segments. Ineligible segments are dropped rather than
/// kept as disabled entries.
pub fn candidates_from(classified: &[ClassifiedSegment]) -> Vec<CacheCandidate> {
    classified
        .iter()
        .filter_map(|segment| {
            let class = segment.class;
            class.eligible.then_some(CacheCandidate {
                position: segment.position,
                tier: class.tier,
                tokens: class.tokens,
                content_type: class.content_type,
                eligible: true,
            })
        })
        .collect()
}

/// Classify and filter in one step
pub fn generate_candidates(
    segments: &[Segment<'_>],
    classifier: &ContentClassifier,
    thresholds: Thresholds,
) -> Vec<CacheCandidate> {
    candidates_from(&classify_segments(segments, classifier, thresholds))
}
