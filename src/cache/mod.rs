//! Cache breakpoint planning for Anthropic prompt caching
//!
//! This module decides which parts of a Messages API request get a
//! `cache_control` breakpoint and how long each breakpoint is retained.
//!
//! ## Planning Pipeline
//!
//! 1. **Classify**: estimate tokens and detect stable content per segment
//! 2. **Generate**: keep eligible segments as candidates, in wire order
//! 3. **Select**: trim candidates to the breakpoint ceiling for the strategy
//! 4. **Normalize**: upgrade every breakpoint before the last `1h` one to `1h`
//! 5. **Inject**: write the annotations back and report the plan
//!
//! The upstream cache treats each breakpoint's span as a prefix of every later
//! one, so a `5m` breakpoint in front of a `1h` breakpoint would expire the
//! shared prefix early. Step 4 exists for that reason.

mod candidates;
mod classifier;
mod injector;
mod normalize;
mod planner;
mod segment;
mod strategy;

pub use candidates::{
    candidates_from, classify_segments, generate_candidates, CacheCandidate, ClassifiedSegment,
};
pub use classifier::{
    Classification, ContentClassifier, HeuristicEstimator, StabilityLexicon, Thresholds,
    TiktokenEstimator, TokenEstimator, DEFAULT_STABILITY_SIGNALS,
};
pub use injector::{inject, Breakpoint, CacheRoi, PlanMetadata};
pub use normalize::normalize_tiers;
pub use planner::{model_floor, CachePlanner, Credential};
pub use segment::{collect_segments, Position, Segment};
pub use strategy::{select_candidates, ParseStrategyError, Strategy, StrategyProfile};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum number of cache breakpoints Anthropic accepts per request
pub const MAX_BREAKPOINTS: usize = 4;

/// Minimum tokens per cacheable segment for most Claude models
pub const MIN_CACHE_TOKENS: usize = 1024;

/// Minimum tokens per cacheable segment for Haiku models
pub const MIN_CACHE_TOKENS_HAIKU: usize = 2048;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("Invalid request structure: {0}")]
    Validation(String),
}

/// Cache lifetime attached to a breakpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RetentionTier {
    /// Five minute cache, refreshed on every hit
    #[serde(rename = "5m")]
    Short,
    /// One hour cache
    #[serde(rename = "1h")]
    Long,
}

impl RetentionTier {
    /// Literal the upstream API expects in `cache_control.ttl`
    pub fn as_wire(&self) -> &'static str {
        match self {
            RetentionTier::Short => "5m",
            RetentionTier::Long => "1h",
        }
    }

    /// Cost of writing a token into the cache, relative to a plain input token
    pub fn write_multiplier(&self) -> f64 {
        match self {
            RetentionTier::Short => 1.25,
            RetentionTier::Long => 2.0,
        }
    }
}

impl fmt::Display for RetentionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Cost of reading a cached token, relative to a plain input token
pub const CACHE_READ_MULTIPLIER: f64 = 0.10;

/// Whether a segment looks like durable instructions or ordinary conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// Instructions, guidelines, reference context
    Stable,
    /// Regular conversational content
    Volatile,
}

impl ContentType {
    /// Retention tier a segment of this type starts with
    pub fn base_tier(&self) -> RetentionTier {
        match self {
            ContentType::Stable => RetentionTier::Long,
            ContentType::Volatile => RetentionTier::Short,
        }
    }
}

/// Cache control directive for API requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheControl {
    /// Type of cache control
    #[serde(rename = "type")]
    pub control_type: CacheControlType,
    /// Retention requested for this breakpoint; upstream defaults to `5m`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<RetentionTier>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheControlType {
    /// Mark this as an ephemeral cache breakpoint
    Ephemeral,
}

impl CacheControl {
    pub fn ephemeral(ttl: RetentionTier) -> Self {
        Self {
            control_type: CacheControlType::Ephemeral,
            ttl: Some(ttl),
        }
    }
}

impl Default for CacheControl {
    fn default() -> Self {
        Self {
            control_type: CacheControlType::Ephemeral,
            ttl: None,
        }
    }
}
