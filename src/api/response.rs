//! Messages API response structures

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reply from the Messages API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub id: String,

    /// Model that generated the response
    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub content: Vec<ResponseBlock>,

    /// Stop reason
    #[serde(default)]
    pub stop_reason: Option<StopReason>,

    /// Token usage statistics
    #[serde(default)]
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseBlock {
    #[serde(rename = "type")]
    pub block_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    ToolUse,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TokenUsage {
    /// Uncached prompt tokens
    #[serde(default)]
    pub input_tokens: u32,

    #[serde(default)]
    pub output_tokens: u32,

    /// Tokens written to cache on this request
    #[serde(default)]
    pub cache_creation_input_tokens: Option<u32>,

    /// Tokens served from cache
    #[serde(default)]
    pub cache_read_input_tokens: Option<u32>,

    /// Cache writes split by retention tier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_creation: Option<CacheCreation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CacheCreation {
    #[serde(default)]
    pub ephemeral_5m_input_tokens: u32,

    #[serde(default)]
    pub ephemeral_1h_input_tokens: u32,
}

impl ApiResponse {
    /// Parse a raw response body
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Concatenated text of all text blocks
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn truncated(&self) -> bool {
        self.stop_reason == Some(StopReason::MaxTokens)
    }
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            ..Self::default()
        }
    }

    /// Create with cache information
    pub fn with_cache(mut self, cache_creation: Option<u32>, cache_read: Option<u32>) -> Self {
        self.cache_creation_input_tokens = cache_creation;
        self.cache_read_input_tokens = cache_read;
        self
    }

    /// Prompt tokens across uncached, written and read portions
    pub fn total_input_tokens(&self) -> u32 {
        self.input_tokens
            .saturating_add(self.cache_creation_input_tokens.unwrap_or(0))
            .saturating_add(self.cache_read_input_tokens.unwrap_or(0))
    }

    pub fn total_tokens(&self) -> u32 {
        self.total_input_tokens().saturating_add(self.output_tokens)
    }

    /// Share of prompt tokens served from cache, 0.0 - 1.0
    pub fn cache_hit_ratio(&self) -> f64 {
        let total = self.total_input_tokens();
        if total == 0 {
            return 0.0;
        }
        self.cache_read_input_tokens.unwrap_or(0) as f64 / total as f64
    }

    /// Input tokens saved by cache reads, in base-price token equivalents
    pub fn cache_savings(&self) -> f64 {
        self.cache_read_input_tokens.unwrap_or(0) as f64
            * (1.0 - crate::cache::CACHE_READ_MULTIPLIER)
    }

    /// Check if any caching occurred
    pub fn has_cache_activity(&self) -> bool {
        self.cache_creation_input_tokens.unwrap_or(0) > 0
            || self.cache_read_input_tokens.unwrap_or(0) > 0
    }

    /// Calculate cost with cache pricing. Writes are billed per tier
    /// when the breakdown is present, otherwise at the `5m` rate.
    pub fn cost_usd(&self, cost_per_1k_input: f64, cost_per_1k_output: f64) -> f64 {
        use crate::cache::{RetentionTier, CACHE_READ_MULTIPLIER};

        let per_token_in = cost_per_1k_input / 1000.0;
        let base_input = self.input_tokens as f64 * per_token_in;
        let output = self.output_tokens as f64 * cost_per_1k_output / 1000.0;

        let writes = match self.cache_creation {
            Some(split) => {
                split.ephemeral_5m_input_tokens as f64 * RetentionTier::Short.write_multiplier()
                    + split.ephemeral_1h_input_tokens as f64
                        * RetentionTier::Long.write_multiplier()
            }
            None => {
                self.cache_creation_input_tokens.unwrap_or(0) as f64
                    * RetentionTier::Short.write_multiplier()
            }
        } * per_token_in;

        let reads =
            self.cache_read_input_tokens.unwrap_or(0) as f64 * CACHE_READ_MULTIPLIER * per_token_in;

        base_input + output + writes + reads
    }
}
