//! The planner: immutable configuration plus the per-request pipeline

use super::candidates::{candidates_from, classify_segments};
use super::classifier::{
    ContentClassifier, HeuristicEstimator, StabilityLexicon, Thresholds, TiktokenEstimator,
    TokenEstimator,
};
use super::injector::{inject, PlanMetadata};
use super::normalize::normalize_tiers;
use super::segment::collect_segments;
use super::strategy::{select_candidates, Strategy};
use super::{PlanError, MIN_CACHE_TOKENS, MIN_CACHE_TOKENS_HAIKU};
use crate::api::MessagesRequest;
use crate::config::{Config, ConfigError, EstimatorKind};
use crate::logging::PlanLogger;
use std::fmt;
use std::sync::Arc;
use tracing::Level;

/// Upstream API key. Never printed.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("Credential(<unset>)")
        } else {
            f.write_str("Credential(***)")
        }
    }
}

/// Smallest segment the given model will cache
pub fn model_floor(model: &str) -> usize {
    if model.to_lowercase().contains("haiku") {
        MIN_CACHE_TOKENS_HAIKU
    } else {
        MIN_CACHE_TOKENS
    }
}

/// Plans cache breakpoints for outgoing requests.
///
/// Holds no per-request state, so one instance can be shared across threads
/// behind an `Arc`.
pub struct CachePlanner {
    strategy: Strategy,
    endpoint: String,
    credential: Credential,
    classifier: ContentClassifier,
    logger: Arc<dyn PlanLogger>,
}

impl CachePlanner {
    pub fn new(
        strategy: Strategy,
        endpoint: impl Into<String>,
        credential: Credential,
        logger: Arc<dyn PlanLogger>,
    ) -> Self {
        Self {
            strategy,
            endpoint: endpoint.into(),
            credential,
            classifier: ContentClassifier::default(),
            logger,
        }
    }

    pub fn from_config(config: &Config, logger: Arc<dyn PlanLogger>) -> Result<Self, ConfigError> {
        let estimator: Arc<dyn TokenEstimator> = match config.planner.token_estimator {
            EstimatorKind::Heuristic => Arc::new(HeuristicEstimator {
                chars_per_token: config.planner.chars_per_token,
            }),
            EstimatorKind::Tiktoken => Arc::new(
                TiktokenEstimator::new().map_err(|e| ConfigError::Estimator(e.to_string()))?,
            ),
        };

        let credential = Credential::new(config.api_key().unwrap_or_default());
        Ok(
            Self::new(config.planner.strategy, config.upstream.base_url.clone(), credential, logger)
                .with_lexicon(StabilityLexicon::new(&config.planner.stability_signals))
                .with_estimator(estimator),
        )
    }

    pub fn with_lexicon(mut self, lexicon: StabilityLexicon) -> Self {
        self.classifier = ContentClassifier::new(lexicon, self.classifier.estimator());
        self
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.classifier = ContentClassifier::new(self.classifier.lexicon().clone(), estimator);
        self
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Eligibility thresholds for a request to `model`
    pub fn thresholds_for(&self, model: &str) -> Thresholds {
        self.strategy.profile().thresholds().with_floor(model_floor(model))
    }

    fn log(&self, level: Level, message: impl FnOnce() -> String) {
        if self.logger.enabled(level) {
            self.logger.log(level, &message());
        }
    }

    /// Annotate `request` with cache breakpoints and report the plan.
    ///
    /// Requests that already carry `cache_control` are left untouched.
    pub fn plan(&self, request: &mut MessagesRequest) -> Result<PlanMetadata, PlanError> {
        let thresholds = self.thresholds_for(&request.model);
        let classified = classify_segments(&collect_segments(request), &self.classifier, thresholds);
        let total_tokens: usize = classified.iter().map(|s| s.class.tokens).sum();

        if request.has_cache_control() {
            inject(request, &[])?;
            self.log(Level::INFO, || {
                "request already has cache_control, leaving it unchanged".to_string()
            });
            return Ok(PlanMetadata::skipped(
                self.strategy,
                total_tokens,
                "request already has cache_control",
            ));
        }

        let candidates = candidates_from(&classified);
        self.log(Level::DEBUG, || {
            format!(
                "{} of {} segments eligible (min {} stable / {} volatile tokens)",
                candidates.len(),
                classified.len(),
                thresholds.stable,
                thresholds.volatile
            )
        });

        let mut selected = select_candidates(candidates, self.strategy);
        let upgraded = normalize_tiers(&mut selected);
        if upgraded > 0 {
            self.log(Level::DEBUG, || {
                format!("upgraded {} breakpoint(s) to 1h to keep the prefix consistent", upgraded)
            });
        }

        let breakpoints = inject(request, &selected)?;
        let metadata = PlanMetadata::new(self.strategy, breakpoints, total_tokens);

        self.log(Level::INFO, || {
            format!(
                "planned {} breakpoint(s), ~{} of ~{} tokens cacheable ({} strategy)",
                metadata.breakpoints.len(),
                metadata.cached_tokens,
                metadata.total_tokens,
                self.strategy
            )
        });

        Ok(metadata)
    }
}

impl fmt::Debug for CachePlanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachePlanner")
            .field("strategy", &self.strategy)
            .field("endpoint", &self.endpoint)
            .field("credential", &self.credential)
            .field("classifier", &self.classifier)
            .finish_non_exhaustive()
    }
}
