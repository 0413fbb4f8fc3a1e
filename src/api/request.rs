//! Messages API request structures

use crate::cache::{CacheControl, PlanError, RetentionTier};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Author of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single content block (text, image, tool use, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,

    /// Block fields this crate does not interpret, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            block_type: "text".to_string(),
            text: Some(text.into()),
            cache_control: None,
            extra: Map::new(),
        }
    }
}

/// System prompt in either of its wire forms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// Message content in either of its wire forms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// A message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }

    fn blocks(&self) -> &[ContentBlock] {
        match &self.content {
            MessageContent::Text(_) => &[],
            MessageContent::Blocks(blocks) => blocks,
        }
    }
}

/// Request body for `POST /v1/messages`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagesRequest {
    #[serde(default)]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// System prompt/instructions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemPrompt>,

    /// Conversation messages
    pub messages: Vec<Message>,

    /// Remaining request fields (tools, temperature, metadata, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MessagesRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens: None,
            system: None,
            messages: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Parse a raw request body. A body that cannot be walked in order
    /// (missing `messages`, malformed blocks) is a validation failure.
    pub fn from_json(body: &str) -> Result<Self, PlanError> {
        serde_json::from_str(body).map_err(|e| PlanError::Validation(e.to_string()))
    }

    pub fn from_value(body: Value) -> Result<Self, PlanError> {
        serde_json::from_value(body).map_err(|e| PlanError::Validation(e.to_string()))
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(SystemPrompt::Text(system.into()));
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    fn top_level_blocks(&self) -> impl Iterator<Item = &ContentBlock> {
        let system_blocks: &[ContentBlock] = match &self.system {
            Some(SystemPrompt::Blocks(blocks)) => blocks,
            _ => &[],
        };
        system_blocks
            .iter()
            .chain(self.messages.iter().flat_map(|m| m.blocks().iter()))
    }

    /// Every `cache_control` directive already in the request, with its
    /// requested retention. Covers `tools`, system and message blocks, and
    /// blocks nested in a block's `content` (tool results).
    pub fn cache_directives(&self) -> Vec<Option<RetentionTier>> {
        let mut found = Vec::new();
        if let Some(tools) = self.extra.get("tools") {
            directives_in_value(tools, &mut found);
        }
        for block in self.top_level_blocks() {
            if let Some(control) = &block.cache_control {
                found.push(control.ttl);
            }
            if let Some(content) = block.extra.get("content") {
                directives_in_value(content, &mut found);
            }
        }
        found
    }

    /// Whether the caller already placed any cache breakpoints
    pub fn has_cache_control(&self) -> bool {
        !self.cache_directives().is_empty()
    }

    /// Whether any breakpoint asks for the one hour tier
    pub fn uses_long_retention(&self) -> bool {
        self.cache_directives()
            .contains(&Some(RetentionTier::Long))
    }

    /// Number of `cache_control` directives anywhere in the request
    pub fn breakpoint_count(&self) -> usize {
        self.cache_directives().len()
    }
}

fn directives_in_value(value: &Value, found: &mut Vec<Option<RetentionTier>>) {
    match value {
        Value::Array(items) => {
            for item in items {
                directives_in_value(item, found);
            }
        }
        Value::Object(map) => {
            if let Some(control) = map.get("cache_control") {
                let ttl = serde_json::from_value::<CacheControl>(control.clone())
                    .ok()
                    .and_then(|c| c.ttl);
                found.push(ttl);
            }
            if let Some(content) = map.get("content") {
                directives_in_value(content, found);
            }
        }
        _ => {}
    }
}
