//! Writes planned breakpoints into the request and reports the plan

use super::candidates::CacheCandidate;
use super::segment::Position;
use super::strategy::Strategy;
use super::{CacheControl, PlanError, RetentionTier, CACHE_READ_MULTIPLIER};
use crate::api::{ContentBlock, MessageContent, MessagesRequest, SystemPrompt};
use serde::Serialize;
use std::fmt;

/// One planned cache breakpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Breakpoint {
    pub position: Position,
    #[serde(rename = "ttl")]
    pub tier: RetentionTier,
    pub tokens: usize,
}

impl From<&CacheCandidate> for Breakpoint {
    fn from(candidate: &CacheCandidate) -> Self {
        Self {
            position: candidate.position,
            tier: candidate.tier,
            tokens: candidate.tokens,
        }
    }
}

/// Report of what the planner did to one request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanMetadata {
    pub injected: bool,
    pub strategy: Strategy,
    /// Breakpoints in wire order
    pub breakpoints: Vec<Breakpoint>,
    /// Estimated tokens across every segment of the request
    pub total_tokens: usize,
    /// Estimated tokens in the segments that carry a breakpoint
    pub cached_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

impl PlanMetadata {
    pub fn new(strategy: Strategy, breakpoints: Vec<Breakpoint>, total_tokens: usize) -> Self {
        Self {
            injected: !breakpoints.is_empty(),
            strategy,
            cached_tokens: breakpoints.iter().map(|b| b.tokens).sum(),
            breakpoints,
            total_tokens,
            skip_reason: None,
        }
    }

    /// Plan for a request that was passed through untouched
    pub fn skipped(strategy: Strategy, total_tokens: usize, reason: impl Into<String>) -> Self {
        Self {
            skip_reason: Some(reason.into()),
            ..Self::new(strategy, Vec::new(), total_tokens)
        }
    }

    /// `X-Autocache-*` headers describing this plan
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("X-Autocache-Injected", self.injected.to_string()),
            ("X-Autocache-Strategy", self.strategy.to_string()),
            ("X-Autocache-Total-Tokens", self.total_tokens.to_string()),
            ("X-Autocache-Cached-Tokens", self.cached_tokens.to_string()),
        ];

        if !self.breakpoints.is_empty() {
            let list = self
                .breakpoints
                .iter()
                .map(|b| format!("{}:{}:{}", b.position, b.tier, b.tokens))
                .collect::<Vec<_>>()
                .join(",");
            headers.push(("X-Autocache-Breakpoints", list));
        }

        if let Some(reason) = &self.skip_reason {
            headers.push(("X-Autocache-Skip-Reason", reason.clone()));
        }

        headers
    }

    /// Rough cost/benefit of the plan in input-token equivalents
    pub fn roi(&self) -> CacheRoi {
        let write_premium: f64 = self
            .breakpoints
            .iter()
            .map(|b| b.tokens as f64 * (b.tier.write_multiplier() - 1.0))
            .sum();
        let savings_per_hit = self.cached_tokens as f64 * (1.0 - CACHE_READ_MULTIPLIER);

        let break_even_hits = if savings_per_hit > 0.0 {
            Some((write_premium / savings_per_hit).ceil() as u32)
        } else {
            None
        };

        CacheRoi {
            write_premium_tokens: write_premium,
            savings_per_hit_tokens: savings_per_hit,
            break_even_hits,
        }
    }
}

impl fmt::Display for PlanMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Cache Plan ===")?;
        writeln!(f, "Strategy: {}", self.strategy)?;
        writeln!(f, "Injected: {}", self.injected)?;
        if let Some(reason) = &self.skip_reason {
            writeln!(f, "Skipped: {}", reason)?;
        }
        writeln!(f, "Total tokens: ~{}", self.total_tokens)?;
        writeln!(f, "Cached tokens: ~{}", self.cached_tokens)?;
        for bp in &self.breakpoints {
            writeln!(f, "  {} [{}] ~{} tokens", bp.position, bp.tier, bp.tokens)?;
        }
        Ok(())
    }
}

/// Estimated economics of a plan
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheRoi {
    /// Extra cost of the first (cache-writing) request
    pub write_premium_tokens: f64,
    /// Saved on every request that reads the cache
    pub savings_per_hit_tokens: f64,
    /// Cache reads needed to pay back the write premium
    pub break_even_hits: Option<u32>,
}

fn validate_structure(request: &MessagesRequest) -> Result<(), PlanError> {
    if let Some(SystemPrompt::Blocks(blocks)) = &request.system {
        for (j, block) in blocks.iter().enumerate() {
            if block.block_type.trim().is_empty() {
                return Err(PlanError::Validation(format!("system block {} has no type", j)));
            }
        }
    }

    for (i, message) in request.messages.iter().enumerate() {
        if let MessageContent::Blocks(blocks) = &message.content {
            for (j, block) in blocks.iter().enumerate() {
                if block.block_type.trim().is_empty() {
                    return Err(PlanError::Validation(format!(
                        "message {} block {} has no type",
                        i, j
                    )));
                }
            }
        }
    }

    Ok(())
}

fn text_at(request: &MessagesRequest, position: Position) -> Option<&str> {
    match position {
        Position::System => match &request.system {
            Some(SystemPrompt::Text(text)) => Some(text.as_str()),
            _ => None,
        },
        Position::SystemBlock(j) => match &request.system {
            Some(SystemPrompt::Blocks(blocks)) => blocks.get(j)?.text.as_deref(),
            _ => None,
        },
        Position::Message(i) => match &request.messages.get(i)?.content {
            MessageContent::Text(text) => Some(text.as_str()),
            MessageContent::Blocks(_) => None,
        },
        Position::MessageBlock { message, block } => {
            match &request.messages.get(message)?.content {
                MessageContent::Blocks(blocks) => blocks.get(block)?.text.as_deref(),
                MessageContent::Text(_) => None,
            }
        }
    }
}

fn unresolved(position: Position) -> PlanError {
    PlanError::Validation(format!(
        "breakpoint position {} does not resolve to text content",
        position
    ))
}

fn annotate(
    request: &mut MessagesRequest,
    position: Position,
    control: CacheControl,
) -> Result<(), PlanError> {
    let block = match position {
        Position::System => {
            if let Some(SystemPrompt::Text(text)) = &mut request.system {
                let text = std::mem::take(text);
                request.system = Some(SystemPrompt::Blocks(vec![ContentBlock::text(text)]));
            }
            match &mut request.system {
                Some(SystemPrompt::Blocks(blocks)) => blocks.first_mut(),
                _ => None,
            }
        }
        Position::SystemBlock(j) => match &mut request.system {
            Some(SystemPrompt::Blocks(blocks)) => blocks.get_mut(j),
            _ => None,
        },
        Position::Message(i) => {
            let message = request.messages.get_mut(i).ok_or_else(|| unresolved(position))?;
            if let MessageContent::Text(text) = &mut message.content {
                let text = std::mem::take(text);
                message.content = MessageContent::Blocks(vec![ContentBlock::text(text)]);
            }
            match &mut message.content {
                MessageContent::Blocks(blocks) => blocks.first_mut(),
                MessageContent::Text(_) => None,
            }
        }
        Position::MessageBlock { message, block } => {
            match request.messages.get_mut(message).map(|m| &mut m.content) {
                Some(MessageContent::Blocks(blocks)) => blocks.get_mut(block),
                _ => None,
            }
        }
    };

    let block = block.ok_or_else(|| unresolved(position))?;
    block.cache_control = Some(control);
    Ok(())
}

/// Attach a `cache_control` directive for every candidate.
///
/// The request structure and every candidate position are checked before
/// anything is written, so a failed call leaves the request unchanged.
pub fn inject(
    request: &mut MessagesRequest,
    candidates: &[CacheCandidate],
) -> Result<Vec<Breakpoint>, PlanError> {
    validate_structure(request)?;
    for candidate in candidates {
        if text_at(request, candidate.position).is_none() {
            return Err(unresolved(candidate.position));
        }
    }

    for candidate in candidates {
        annotate(request, candidate.position, CacheControl::ephemeral(candidate.tier))?;
    }

    Ok(candidates.iter().map(Breakpoint::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Message, Role};
    use serde_json::json;

    fn request() -> MessagesRequest {
        MessagesRequest::new("claude-sonnet-4-20250514")
            .with_system("system prompt")
            .with_message(Message::user("question"))
            .with_message(Message {
                role: Role::Assistant,
                content: MessageContent::Blocks(vec![
                    ContentBlock::text("first"),
                    ContentBlock::text("second"),
                ]),
            })
    }

    #[test]
    fn test_inject_converts_string_forms() {
        let mut req = request();
        let candidates = vec![
            CacheCandidate::new(Position::System, RetentionTier::Long, 3000),
            CacheCandidate::new(Position::Message(0), RetentionTier::Long, 1500),
            CacheCandidate::new(Position::MessageBlock { message: 1, block: 1 }, RetentionTier::Short, 1200),
        ];

        let breakpoints = inject(&mut req, &candidates).unwrap();
        assert_eq!(breakpoints.len(), 3);

        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(
            body["system"],
            json!([{"type": "text", "text": "system prompt", "cache_control": {"type": "ephemeral", "ttl": "1h"}}])
        );
        assert_eq!(
            body["messages"][0]["content"],
            json!([{"type": "text", "text": "question", "cache_control": {"type": "ephemeral", "ttl": "1h"}}])
        );
        assert!(body["messages"][1]["content"][0].get("cache_control").is_none());
        assert_eq!(body["messages"][1]["content"][1]["cache_control"]["ttl"], json!("5m"));
        assert_eq!(req.breakpoint_count(), 3);
    }

    #[test]
    fn test_inject_nothing() {
        let mut req = request();
        let before = req.clone();
        assert!(inject(&mut req, &[]).unwrap().is_empty());
        assert_eq!(req, before);
    }

    #[test]
    fn test_unresolved_position_leaves_request_unchanged() {
        let mut req = request();
        let before = req.clone();
        let candidates = vec![
            CacheCandidate::new(Position::System, RetentionTier::Long, 3000),
            CacheCandidate::new(Position::Message(7), RetentionTier::Short, 1500),
        ];

        let err = inject(&mut req, &candidates).unwrap_err();
        assert!(matches!(err, PlanError::Validation(msg) if msg.contains("message_7")));
        assert_eq!(req, before);
    }

    #[test]
    fn test_untyped_block_is_rejected() {
        let mut req = request();
        if let MessageContent::Blocks(blocks) = &mut req.messages[1].content {
            blocks[0].block_type = String::new();
        }

        let err = inject(&mut req, &[]).unwrap_err();
        assert_eq!(err, PlanError::Validation("message 1 block 0 has no type".into()));
    }

    #[test]
    fn test_metadata_headers() {
        let breakpoints = vec![
            Breakpoint { position: Position::System, tier: RetentionTier::Long, tokens: 2048 },
            Breakpoint { position: Position::Message(1), tier: RetentionTier::Short, tokens: 1500 },
        ];
        let metadata = PlanMetadata::new(Strategy::Moderate, breakpoints, 4000);

        assert!(metadata.injected);
        assert_eq!(metadata.cached_tokens, 3548);

        let headers = metadata.headers();
        assert!(headers.contains(&("X-Autocache-Injected", "true".to_string())));
        assert!(headers.contains(&("X-Autocache-Strategy", "moderate".to_string())));
        assert!(headers.contains(&(
            "X-Autocache-Breakpoints",
            "system:1h:2048,message_1:5m:1500".to_string()
        )));

        let body = serde_json::to_value(&metadata).unwrap();
        assert_eq!(body["breakpoints"][0], json!({"position": "system", "ttl": "1h", "tokens": 2048}));
        assert!(body.get("skip_reason").is_none());
    }

    #[test]
    fn test_skipped_metadata() {
        let metadata = PlanMetadata::skipped(Strategy::Aggressive, 10, "already annotated");
        assert!(!metadata.injected);
        assert!(metadata.breakpoints.is_empty());
        assert!(metadata
            .headers()
            .contains(&("X-Autocache-Skip-Reason", "already annotated".to_string())));
        assert_eq!(metadata.roi().break_even_hits, None);
    }

    #[test]
    fn test_roi_break_even() {
        let breakpoints = vec![Breakpoint {
            position: Position::System,
            tier: RetentionTier::Long,
            tokens: 1000,
        }];
        let roi = PlanMetadata::new(Strategy::Moderate, breakpoints, 1000).roi();

        // 1h write costs an extra 1000 tokens, each read saves 900
        assert!((roi.write_premium_tokens - 1000.0).abs() < 1e-9);
        assert!((roi.savings_per_hit_tokens - 900.0).abs() < 1e-9);
        assert_eq!(roi.break_even_hits, Some(2));
    }
}
