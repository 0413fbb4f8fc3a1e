//! Wire-order walk over the cacheable parts of a request

use crate::api::{MessageContent, MessagesRequest, SystemPrompt};
use serde::{Serialize, Serializer};
use std::fmt;

/// Location of a segment inside the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Position {
    /// String system prompt
    System,
    /// Block of an array system prompt
    SystemBlock(usize),
    /// Message with string content
    Message(usize),
    /// Block of a message with array content
    MessageBlock { message: usize, block: usize },
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::System => write!(f, "system"),
            Position::SystemBlock(block) => write!(f, "system_{}", block),
            Position::Message(message) => write!(f, "message_{}", message),
            Position::MessageBlock { message, block } => {
                write!(f, "message_{}_block_{}", message, block)
            }
        }
    }
}

impl Serialize for Position {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One unit of request content, borrowed from the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment<'a> {
    pub position: Position,
    /// Empty for blocks without text (images, tool calls)
    pub text: &'a str,
}

/// Walk the request in wire order: system first, then each message, then
/// each block within a message.
pub fn collect_segments(request: &MessagesRequest) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();

    match &request.system {
        Some(SystemPrompt::Text(text)) => segments.push(Segment {
            position: Position::System,
            text: text.as_str(),
        }),
        Some(SystemPrompt::Blocks(blocks)) => {
            for (block, content) in blocks.iter().enumerate() {
                segments.push(Segment {
                    position: Position::SystemBlock(block),
                    text: content.text.as_deref().unwrap_or(""),
                });
            }
        }
        None => {}
    }

    for (message, msg) in request.messages.iter().enumerate() {
        match &msg.content {
            MessageContent::Text(text) => segments.push(Segment {
                position: Position::Message(message),
                text: text.as_str(),
            }),
            MessageContent::Blocks(blocks) => {
                for (block, content) in blocks.iter().enumerate() {
                    segments.push(Segment {
                        position: Position::MessageBlock { message, block },
                        text: content.text.as_deref().unwrap_or(""),
                    });
                }
            }
        }
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ContentBlock, Message, Role};

    #[test]
    fn test_position_names() {
        assert_eq!(Position::System.to_string(), "system");
        assert_eq!(Position::SystemBlock(1).to_string(), "system_1");
        assert_eq!(Position::Message(3).to_string(), "message_3");
        assert_eq!(
            Position::MessageBlock { message: 2, block: 0 }.to_string(),
            "message_2_block_0"
        );
    }

    #[test]
    fn test_segments_follow_wire_order() {
        let mut image = ContentBlock::text("");
        image.block_type = "image".to_string();
        image.text = None;

        let request = MessagesRequest::new("claude-sonnet-4-20250514")
            .with_system("system text")
            .with_message(Message::user("first"))
            .with_message(Message {
                role: Role::Assistant,
                content: MessageContent::Blocks(vec![ContentBlock::text("second"), image]),
            })
            .with_message(Message::user("third"));

        let segments = collect_segments(&request);
        let positions: Vec<String> = segments.iter().map(|s| s.position.to_string()).collect();
        assert_eq!(
            positions,
            vec!["system", "message_0", "message_1_block_0", "message_1_block_1", "message_2"]
        );
        assert_eq!(segments[3].text, "");
        assert_eq!(segments[4].text, "third");
    }

    #[test]
    fn test_no_system_no_messages() {
        let request = MessagesRequest::new("claude-sonnet-4-20250514");
        assert!(collect_segments(&request).is_empty());
    }
}
