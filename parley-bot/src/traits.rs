//! Boundary traits for the chat transport and the error reporter.

use crate::delivery::DeliveryError;
use crate::message::{ChannelMessage, CommandInvocation};
use async_trait::async_trait;

/// Result type for transport operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Transport error type.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Rate limited: retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Message send failed: {0}")]
    SendFailed(String),

    /// The recipient does not accept direct messages from the bot.
    #[error("Direct message rejected: {0}")]
    DirectMessageRejected(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Outbound side of a chat client.
///
/// Every call is a suspension point; the engine awaits each one before
/// issuing the next, so implementations see sends in order.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Get the transport name.
    fn name(&self) -> &'static str;

    /// Post a text message to a channel and return its message ID.
    async fn send_text(&self, channel_id: &str, text: &str) -> ChannelResult<String>;

    /// Show a transient "working" indicator in a channel.
    async fn send_typing(&self, channel_id: &str) -> ChannelResult<()>;

    /// Send a private message to a user.
    async fn send_direct(&self, user_id: &str, text: &str) -> ChannelResult<()>;

    /// Primary acknowledgment of a command invocation.
    async fn reply(&self, invocation: &CommandInvocation, text: &str) -> ChannelResult<()>;

    /// Additional message attached to a command invocation.
    async fn follow_up(&self, invocation: &CommandInvocation, text: &str) -> ChannelResult<()>;
}

/// Process-wide sink for failures the engine could not recover from.
#[async_trait]
pub trait ErrorReporter: Send + Sync {
    async fn report(&self, error: &DeliveryError, original: &ChannelMessage);
}

/// Reporter that writes failures to the log.
pub struct TracingErrorReporter;

#[async_trait]
impl ErrorReporter for TracingErrorReporter {
    async fn report(&self, error: &DeliveryError, original: &ChannelMessage) {
        tracing::error!(
            error = %error,
            user_id = %original.user_id,
            channel_id = %original.channel_id,
            message_id = %original.id,
            channel = original.channel_type.as_str(),
            "Response delivery failed"
        );
    }
}
