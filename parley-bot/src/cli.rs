//! CLI transport for interactive terminal sessions.
//!
//! Provides a stdin/stdout transport and an echo backend for local testing
//! and development.

use crate::commands::CommandRouter;
use crate::delivery::ResponseSource;
use crate::engine::ConversationEngine;
use crate::message::{ChannelMessage, ChannelType, CommandInvocation};
use crate::traits::{ChannelResult, Transport};
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Channel ID used for every CLI message.
pub const CLI_CHANNEL_ID: &str = "cli";

/// CLI transport - stdout, always available.
pub struct CliTransport;

impl CliTransport {
    pub const fn new() -> Self {
        Self
    }
}

impl Default for CliTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for CliTransport {
    fn name(&self) -> &'static str {
        "cli"
    }

    async fn send_text(&self, _channel_id: &str, text: &str) -> ChannelResult<String> {
        println!("{text}");
        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn send_typing(&self, _channel_id: &str) -> ChannelResult<()> {
        Ok(())
    }

    async fn send_direct(&self, user_id: &str, text: &str) -> ChannelResult<()> {
        println!("[DM to {user_id}]\n{text}");
        Ok(())
    }

    async fn reply(&self, _invocation: &CommandInvocation, text: &str) -> ChannelResult<()> {
        println!("{text}");
        Ok(())
    }

    async fn follow_up(&self, _invocation: &CommandInvocation, text: &str) -> ChannelResult<()> {
        println!("{text}");
        Ok(())
    }
}

/// Backend that streams `Echo: <text>` back one word at a time.
pub struct EchoBackend;

impl EchoBackend {
    pub fn respond(&self, text: &str) -> ResponseSource {
        let reply = format!("Echo: {text}");
        let fragments: Vec<String> = reply.split_inclusive(' ').map(str::to_string).collect();
        ResponseSource::from_fragments(fragments)
    }
}

/// Read lines from `input` as messages from `user_id` until EOF, `/quit`
/// or `/exit`. Slash commands go to the router, anything else is echoed
/// through the delivery pipeline.
pub async fn run_session<R>(
    engine: &ConversationEngine,
    router: &CommandRouter,
    input: R,
    user_id: &str,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let backend = EchoBackend;
    let mut lines = input.lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" || line == "/exit" {
            break;
        }

        let message = ChannelMessage::text(ChannelType::Cli, CLI_CHANNEL_ID, user_id, line);
        if let Some(invocation) = CommandInvocation::parse(&message) {
            router.handle(&invocation).await;
            continue;
        }

        let outcome = engine
            .deliver_response(
                CLI_CHANNEL_ID,
                backend.respond(line),
                &message,
                || tracing::trace!("Typing stopped"),
            )
            .await;
        if let Some(error) = outcome.error {
            eprintln!("Delivery failed: {error}");
        }
    }

    tracing::info!(user_id = %user_id, "CLI session ended");
    Ok(())
}

/// Run an interactive session on stdin.
pub async fn run(engine: &ConversationEngine, router: &CommandRouter) -> anyhow::Result<()> {
    let reader = tokio::io::BufReader::new(tokio::io::stdin());
    run_session(engine, router, reader, "user").await
}
