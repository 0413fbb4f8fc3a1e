//! Content classification: token estimates, stability signals, eligibility

use super::{ContentType, RetentionTier};
use std::fmt;
use std::sync::Arc;
use tiktoken_rs::CoreBPE;

/// Phrases that conventionally mark durable instructions or reference context
pub const DEFAULT_STABILITY_SIGNALS: &[&str] = &[
    "you are",
    "instructions:",
    "guidelines:",
    "context:",
    "your role",
    "rules:",
    "documentation:",
    "reference:",
    "background information",
];

/// Estimates how many tokens a piece of text costs upstream
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> usize;
}

/// Character-ratio estimate, ~4 characters per token by default
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeuristicEstimator {
    pub chars_per_token: usize,
}

impl Default for HeuristicEstimator {
    fn default() -> Self {
        Self { chars_per_token: 4 }
    }
}

impl TokenEstimator for HeuristicEstimator {
    fn estimate(&self, text: &str) -> usize {
        let chars = text.chars().count();
        chars.div_ceil(self.chars_per_token.max(1))
    }
}

/// BPE token count using the `cl100k_base` vocabulary
pub struct TiktokenEstimator {
    bpe: CoreBPE,
}

impl TiktokenEstimator {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            bpe: tiktoken_rs::cl100k_base()?,
        })
    }
}

impl TokenEstimator for TiktokenEstimator {
    fn estimate(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/// Case-insensitive table of stability signals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StabilityLexicon {
    signals: Vec<String>,
}

impl StabilityLexicon {
    pub fn new<I, S>(signals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            signals: signals
                .into_iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn signals(&self) -> &[String] {
        &self.signals
    }

    /// True if the text contains at least one signal
    pub fn matches(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.signals.iter().any(|signal| lowered.contains(signal.as_str()))
    }
}

impl Default for StabilityLexicon {
    fn default() -> Self {
        Self::new(DEFAULT_STABILITY_SIGNALS)
    }
}

/// Minimum tokens a segment needs before it may carry a breakpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Applies to stable content (`1h` tier)
    pub stable: usize,
    /// Applies to volatile content (`5m` tier)
    pub volatile: usize,
}

impl Thresholds {
    pub fn for_tier(&self, tier: RetentionTier) -> usize {
        match tier {
            RetentionTier::Long => self.stable,
            RetentionTier::Short => self.volatile,
        }
    }

    /// Raise both thresholds to at least `floor`
    pub fn with_floor(self, floor: usize) -> Self {
        Self {
            stable: self.stable.max(floor),
            volatile: self.volatile.max(floor),
        }
    }
}

/// Outcome of classifying one segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub content_type: ContentType,
    pub tier: RetentionTier,
    pub tokens: usize,
    pub eligible: bool,
}

#[derive(Clone)]
pub struct ContentClassifier {
    lexicon: StabilityLexicon,
    estimator: Arc<dyn TokenEstimator>,
}

impl ContentClassifier {
    pub fn new(lexicon: StabilityLexicon, estimator: Arc<dyn TokenEstimator>) -> Self {
        Self { lexicon, estimator }
    }

    pub fn lexicon(&self) -> &StabilityLexicon {
        &self.lexicon
    }

    pub fn estimator(&self) -> Arc<dyn TokenEstimator> {
        Arc::clone(&self.estimator)
    }

    pub fn estimate_tokens(&self, text: &str) -> usize {
        self.estimator.estimate(text)
    }

    pub fn classify(&self, text: &str, thresholds: Thresholds) -> Classification {
        if text.trim().is_empty() {
            return Classification {
                content_type: ContentType::Volatile,
                tier: RetentionTier::Short,
                tokens: 0,
                eligible: false,
            };
        }

        let tokens = self.estimator.estimate(text);
        let content_type = if self.lexicon.matches(text) {
            ContentType::Stable
        } else {
            ContentType::Volatile
        };
        let tier = content_type.base_tier();

        Classification {
            content_type,
            tier,
            tokens,
            eligible: tokens >= thresholds.for_tier(tier),
        }
    }
}

impl Default for ContentClassifier {
    fn default() -> Self {
        Self::new(StabilityLexicon::default(), Arc::new(HeuristicEstimator::default()))
    }
}

impl fmt::Debug for ContentClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentClassifier")
            .field("lexicon", &self.lexicon)
            .finish_non_exhaustive()
    }
}
