//! Message types exchanged with the chat transport.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Channel type enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Discord,
    Cli,
}

impl ChannelType {
    /// Get the channel type as a string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Discord => "discord",
            Self::Cli => "cli",
        }
    }
}

/// An inbound user message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Message ID (channel-specific)
    pub id: String,
    /// Channel type
    pub channel_type: ChannelType,
    /// Channel the message was posted in; replies go back here
    pub channel_id: String,
    /// Author of the message
    pub user_id: String,
    /// Raw text content
    pub content: String,
    /// Timestamp (Unix millis)
    pub timestamp: i64,
}

impl ChannelMessage {
    /// Build a text message stamped with the current time.
    pub fn text(
        channel_type: ChannelType,
        channel_id: impl Into<String>,
        user_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            channel_type,
            channel_id: channel_id.into(),
            user_id: user_id.into(),
            content: content.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Whether the text is addressed to the command router.
    pub fn is_command(&self) -> bool {
        is_command(&self.content)
    }
}

/// Commands are messages starting with a slash.
pub fn is_command(text: &str) -> bool {
    text.starts_with('/')
}

/// A slash-command invocation with its named options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandInvocation {
    /// Invocation ID (used by transports to address replies)
    pub id: String,
    pub user_id: String,
    pub channel_id: String,
    /// Command name without the leading slash
    pub name: String,
    /// Named string options
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl CommandInvocation {
    /// Create an invocation with no options.
    pub fn new(
        user_id: impl Into<String>,
        channel_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            channel_id: channel_id.into(),
            name: name.into(),
            options: HashMap::new(),
        }
    }

    /// Attach a named option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Parse `/name arg...` from a plain text message.
    ///
    /// Everything after the command name becomes the `name` option, which is
    /// the only option the built-in commands read.
    pub fn parse(message: &ChannelMessage) -> Option<Self> {
        let body = message.content.strip_prefix('/')?;
        let mut parts = body.split_whitespace();
        let name = parts.next()?;
        let args: Vec<&str> = parts.collect();

        let mut invocation = Self {
            id: message.id.clone(),
            user_id: message.user_id.clone(),
            channel_id: message.channel_id.clone(),
            name: name.to_lowercase(),
            options: HashMap::new(),
        };
        if !args.is_empty() {
            invocation
                .options
                .insert("name".to_string(), args.join(" "));
        }
        Some(invocation)
    }

    /// Read a named string option; blank values count as absent.
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(content: &str) -> ChannelMessage {
        ChannelMessage::text(ChannelType::Discord, "chan-1", "user-1", content)
    }

    #[test]
    fn test_parse_command_with_argument() {
        let inv = CommandInvocation::parse(&message("/model gemini-1.5-pro")).unwrap();
        assert_eq!(inv.name, "model");
        assert_eq!(inv.option("name"), Some("gemini-1.5-pro"));
        assert_eq!(inv.user_id, "user-1");
        assert_eq!(inv.channel_id, "chan-1");
    }

    #[test]
    fn test_parse_command_without_argument() {
        let inv = CommandInvocation::parse(&message("/Clear")).unwrap();
        assert_eq!(inv.name, "clear");
        assert_eq!(inv.option("name"), None);
    }

    #[test]
    fn test_parse_rejects_plain_text() {
        assert!(CommandInvocation::parse(&message("hello")).is_none());
        assert!(CommandInvocation::parse(&message("/")).is_none());
    }

    #[test]
    fn test_blank_option_is_absent() {
        let inv = CommandInvocation::new("u", "c", "prompt").with_option("name", "   ");
        assert_eq!(inv.option("name"), None);
    }

    #[test]
    fn test_is_command() {
        assert!(message("/help").is_command());
        assert!(!message("help /me").is_command());
    }
}
