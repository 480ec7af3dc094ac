//! Slash-command routing.
//!
//! Each command maps onto one engine operation and answers with a fixed
//! acknowledgment. Failures are turned into a single user-visible message
//! per invocation; nothing here propagates an error to the caller.

use crate::engine::ConversationEngine;
use crate::format::{acknowledgment, format_as_embed};
use crate::message::CommandInvocation;
use crate::preferences::PreferenceUpdate;
use crate::split::pack_lines;
use crate::traits::ChannelError;
use std::sync::Arc;

const PREFERENCE_FAILURE: &str = "Could not update your preferences. Please try again later.";

/// Built-in commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Clear,
    Save,
    Model,
    Prompt,
    Reset,
    Help,
}

impl Command {
    pub const ALL: [Command; 6] = [
        Self::Clear,
        Self::Save,
        Self::Model,
        Self::Prompt,
        Self::Reset,
        Self::Help,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim_start_matches('/').to_lowercase().as_str() {
            "clear" => Some(Self::Clear),
            "save" => Some(Self::Save),
            "model" => Some(Self::Model),
            "prompt" => Some(Self::Prompt),
            "reset" => Some(Self::Reset),
            "help" => Some(Self::Help),
            _ => None,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::Save => "save",
            Self::Model => "model",
            Self::Prompt => "prompt",
            Self::Reset => "reset",
            Self::Help => "help",
        }
    }

    pub const fn description(&self) -> &'static str {
        match self {
            Self::Clear => "Clears the conversation history.",
            Self::Save => "Saves the current conversation and sends it to your inbox.",
            Self::Model => "Change the model used by the bot. Usage: `/model [model_name]`",
            Self::Prompt => "Change the system prompt used by the bot. Usage: `/prompt [prompt_name]`",
            Self::Reset => "Start over: forget the conversation and restore the default model and prompt.",
            Self::Help => "Displays this help message.",
        }
    }
}

/// Result of routing an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Handled(Command),
    /// Not a known command; nothing was sent.
    Ignored,
}

/// Routes command invocations to the engine.
pub struct CommandRouter {
    engine: Arc<ConversationEngine>,
}

impl CommandRouter {
    pub fn new(engine: Arc<ConversationEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<ConversationEngine> {
        &self.engine
    }

    /// Run a command invocation.
    pub async fn handle(&self, invocation: &CommandInvocation) -> CommandOutcome {
        let Some(command) = Command::from_name(&invocation.name) else {
            tracing::debug!(command = %invocation.name, "Ignoring unknown command");
            return CommandOutcome::Ignored;
        };

        tracing::info!(
            command = command.name(),
            user_id = %invocation.user_id,
            "Handling command"
        );

        match command {
            Command::Clear => self.clear(invocation).await,
            Command::Save => self.save(invocation).await,
            Command::Model => self.model(invocation).await,
            Command::Prompt => self.prompt(invocation).await,
            Command::Reset => self.reset(invocation).await,
            Command::Help => self.help(invocation).await,
        }

        CommandOutcome::Handled(command)
    }

    async fn clear(&self, invocation: &CommandInvocation) {
        self.engine.clear_history(&invocation.user_id);
        self.reply(invocation, "Your conversation history has been cleared.")
            .await;
    }

    async fn save(&self, invocation: &CommandInvocation) {
        let user_id = &invocation.user_id;
        if self.engine.is_new_conversation(user_id) {
            self.follow_up(invocation, "There is no conversation to save.")
                .await;
            return;
        }

        let transcript = self.engine.transcript(user_id);
        let parts = pack_lines(&transcript, self.engine.config().transcript_chunk_length);

        match self.send_transcript(user_id, &parts).await {
            Ok(()) => {
                tracing::info!(user_id = %user_id, parts = parts.len(), "Transcript sent");
                self.reply(
                    invocation,
                    "The conversation has been saved and sent to your inbox.",
                )
                .await;
            }
            Err(e) => {
                tracing::warn!(error = %e, user_id = %user_id, "Transcript direct message failed");
                self.follow_up(
                    invocation,
                    "Failed to send the conversation to your inbox. Please check your privacy settings.",
                )
                .await;
            }
        }
    }

    async fn send_transcript(&self, user_id: &str, parts: &[String]) -> Result<(), ChannelError> {
        for (index, part) in parts.iter().enumerate() {
            let text = format!(
                "Here is your saved conversation (part {}):\n\n{}",
                index + 1,
                part
            );
            self.engine.transport().send_direct(user_id, &text).await?;
        }
        Ok(())
    }

    async fn model(&self, invocation: &CommandInvocation) {
        let Some(model) = invocation.option("name") else {
            let current = self.engine.user_preferences(&invocation.user_id).await;
            self.reply(
                invocation,
                &format!("You are currently using the {} model.", current.model),
            )
            .await;
            return;
        };

        match self
            .engine
            .set_user_preferences(&invocation.user_id, PreferenceUpdate::model(model))
            .await
        {
            Ok(()) => {
                self.reply(invocation, &format!("The model has been set to {model}."))
                    .await
            }
            Err(e) => self.preference_failure(invocation, &e).await,
        }
    }

    async fn prompt(&self, invocation: &CommandInvocation) {
        let Some(name) = invocation.option("name") else {
            let current = self.engine.user_preferences(&invocation.user_id).await;
            self.reply(
                invocation,
                &format!("Your current system prompt is {}.", current.prompt),
            )
            .await;
            return;
        };

        let prompts = self.engine.prompts();
        if !prompts.accepts(name) {
            self.reply(
                invocation,
                &format!(
                    "Unknown prompt {name}. Available prompts: {}.",
                    prompts.names().join(", ")
                ),
            )
            .await;
            return;
        }

        tracing::debug!(
            user_id = %invocation.user_id,
            prompt = %name,
            prompt_chars = prompts.get(name).map_or(0, |p| p.chars().count()),
            "Setting prompt"
        );

        match self
            .engine
            .set_user_preferences(&invocation.user_id, PreferenceUpdate::prompt(name))
            .await
        {
            Ok(()) => {
                self.reply(
                    invocation,
                    &format!("The system prompt has been set to {name}."),
                )
                .await
            }
            Err(e) => self.preference_failure(invocation, &e).await,
        }
    }

    async fn reset(&self, invocation: &CommandInvocation) {
        self.engine.reset_conversation(&invocation.user_id);
        match self
            .engine
            .reset_user_preferences(&invocation.user_id)
            .await
        {
            Ok(()) => {
                self.reply(
                    invocation,
                    "Your preferences have been reset to the default settings.",
                )
                .await
            }
            Err(e) => self.preference_failure(invocation, &e).await,
        }
    }

    async fn help(&self, invocation: &CommandInvocation) {
        let entries: Vec<(String, &str)> = Command::ALL
            .iter()
            .map(|c| (format!("/{}", c.name()), c.description()))
            .collect();
        let fields: Vec<(&str, &str)> = entries.iter().map(|(n, d)| (n.as_str(), *d)).collect();
        let text = format_as_embed(
            "Available Commands",
            "Here are the available commands and their usage:",
            &fields,
        );
        self.send_ack(invocation, &text, false).await;
    }

    async fn preference_failure(
        &self,
        invocation: &CommandInvocation,
        error: &crate::engine::EngineError,
    ) {
        tracing::error!(error = %error, user_id = %invocation.user_id, "Preference update failed");
        self.reply(invocation, PREFERENCE_FAILURE).await;
    }

    async fn reply(&self, invocation: &CommandInvocation, text: &str) {
        self.send_ack(invocation, &acknowledgment(text), false).await;
    }

    async fn follow_up(&self, invocation: &CommandInvocation, text: &str) {
        self.send_ack(invocation, &acknowledgment(text), true).await;
    }

    async fn send_ack(&self, invocation: &CommandInvocation, text: &str, follow_up: bool) {
        let transport = self.engine.transport();
        let result = if follow_up {
            transport.follow_up(invocation, text).await
        } else {
            transport.reply(invocation, text).await
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, command = %invocation.name, "Acknowledgment not delivered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::PromptCatalog;
    use crate::store::{HashStore, MemoryHashStore};
    use crate::testing::{FailingHashStore, RecordingTransport, Sent};
    use parley_common::config::ConversationConfig;
    use std::collections::HashMap;
    use test_case::test_case;

    fn router_with(store: Arc<dyn HashStore>, transport: RecordingTransport) -> (CommandRouter, Arc<RecordingTransport>) {
        let transport = Arc::new(transport);
        let engine = ConversationEngine::new(
            ConversationConfig::with_default_model("gemini-pro"),
            store,
            transport.clone(),
        )
        .with_prompts(PromptCatalog::new(HashMap::from([
            ("helpful_assistant".to_string(), "Be helpful.".to_string()),
            ("code_reviewer".to_string(), "Review code.".to_string()),
        ])));
        (CommandRouter::new(Arc::new(engine)), transport)
    }

    fn router() -> (CommandRouter, Arc<RecordingTransport>) {
        router_with(Arc::new(MemoryHashStore::new()), RecordingTransport::new())
    }

    fn invoke(name: &str) -> CommandInvocation {
        CommandInvocation::new("user", "chan", name)
    }

    #[test_case("clear", Some(Command::Clear))]
    #[test_case("/SAVE", Some(Command::Save))]
    #[test_case("model", Some(Command::Model))]
    #[test_case("dance", None)]
    fn test_from_name(name: &str, expected: Option<Command>) {
        assert_eq!(Command::from_name(name), expected);
    }

    #[tokio::test]
    async fn test_unknown_command_ignored() {
        let (router, transport) = router();
        assert_eq!(router.handle(&invoke("dance")).await, CommandOutcome::Ignored);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_clear() {
        let (router, transport) = router();
        router.engine().update_history("user", "hi", "Hello!");

        let outcome = router.handle(&invoke("clear")).await;

        assert_eq!(outcome, CommandOutcome::Handled(Command::Clear));
        assert!(router.engine().is_new_conversation("user"));
        assert_eq!(
            transport.acknowledgments(),
            vec!["> `Your conversation history has been cleared.`"]
        );
    }

    #[tokio::test]
    async fn test_save_empty_history_follows_up() {
        let (router, transport) = router();
        router.handle(&invoke("save")).await;
        assert!(matches!(
            transport.sent()[0],
            Sent::FollowUp { ref text, .. } if text == "> `There is no conversation to save.`"
        ));
        assert!(transport.directs().is_empty());
    }

    #[tokio::test]
    async fn test_save_sends_numbered_parts() {
        let (router, transport) = router();
        router
            .engine()
            .update_history("user", &"a".repeat(1000), &"b".repeat(1000));

        router.handle(&invoke("save")).await;

        let directs = transport.directs();
        assert_eq!(directs.len(), 2);
        assert!(directs[0].starts_with("Here is your saved conversation (part 1):\n\nUser: "));
        assert!(directs[1].starts_with("Here is your saved conversation (part 2):\n\nBot: "));
        assert_eq!(
            transport.acknowledgments(),
            vec!["> `The conversation has been saved and sent to your inbox.`"]
        );
    }

    #[tokio::test]
    async fn test_save_privacy_rejection() {
        let (router, transport) =
            router_with(Arc::new(MemoryHashStore::new()), RecordingTransport::new().reject_direct());
        router.engine().update_history("user", "hi", "Hello!");

        let outcome = router.handle(&invoke("save")).await;

        assert_eq!(outcome, CommandOutcome::Handled(Command::Save));
        assert!(matches!(
            transport.sent().last(),
            Some(Sent::FollowUp { text, .. }) if text.contains("check your privacy settings")
        ));
    }

    #[tokio::test]
    async fn test_model_sets_preference() {
        let (router, transport) = router();
        router
            .handle(&invoke("model").with_option("name", "claude-3-haiku"))
            .await;

        assert_eq!(router.engine().user_preferences("user").await.model, "claude-3-haiku");
        assert_eq!(
            transport.acknowledgments(),
            vec!["> `The model has been set to claude-3-haiku.`"]
        );
    }

    #[tokio::test]
    async fn test_model_without_name_reports_current() {
        let (router, transport) = router();
        router.handle(&invoke("model")).await;
        assert_eq!(
            transport.acknowledgments(),
            vec!["> `You are currently using the gemini-pro model.`"]
        );
    }

    #[tokio::test]
    async fn test_prompt_sets_known_name() {
        let (router, transport) = router();
        router
            .handle(&invoke("prompt").with_option("name", "code_reviewer"))
            .await;
        assert_eq!(router.engine().user_preferences("user").await.prompt, "code_reviewer");
        assert_eq!(
            transport.acknowledgments(),
            vec!["> `The system prompt has been set to code_reviewer.`"]
        );
    }

    #[tokio::test]
    async fn test_prompt_rejects_unknown_name() {
        let (router, transport) = router();
        router
            .handle(&invoke("prompt").with_option("name", "pirate"))
            .await;
        assert_eq!(
            router.engine().user_preferences("user").await.prompt,
            "helpful_assistant"
        );
        assert!(transport.acknowledgments()[0].contains("code_reviewer, helpful_assistant"));
    }

    #[tokio::test]
    async fn test_reset() {
        let (router, transport) = router();
        router.engine().update_history("user", "hi", "Hello!");
        router
            .handle(&invoke("model").with_option("name", "x"))
            .await;
        router.handle(&invoke("reset")).await;

        assert_eq!(router.engine().user_preferences("user").await.model, "gemini-pro");
        assert!(router.engine().is_new_conversation("user"));
        assert!(router.engine().last_activity("user").is_none());
        assert_eq!(
            transport.acknowledgments().last().map(String::as_str),
            Some("> `Your preferences have been reset to the default settings.`")
        );
    }

    #[test_case("model" ; "model write")]
    #[test_case("prompt" ; "prompt write")]
    #[test_case("reset" ; "reset delete")]
    #[tokio::test]
    async fn test_store_failure_is_acknowledged(name: &str) {
        let (router, transport) =
            router_with(Arc::new(FailingHashStore), RecordingTransport::new());
        router
            .handle(&invoke(name).with_option("name", "helpful_assistant"))
            .await;
        assert_eq!(
            transport.acknowledgments(),
            vec![acknowledgment(PREFERENCE_FAILURE)]
        );
    }

    #[tokio::test]
    async fn test_reset_forgets_history_even_when_store_fails() {
        let (router, transport) =
            router_with(Arc::new(FailingHashStore), RecordingTransport::new());
        router.engine().update_history("user", "hi", "Hello!");

        router.handle(&invoke("reset")).await;

        assert!(router.engine().is_new_conversation("user"));
        assert_eq!(router.engine().tracked_users(), 0);
        assert_eq!(
            transport.acknowledgments(),
            vec![acknowledgment(PREFERENCE_FAILURE)]
        );
    }

    #[tokio::test]
    async fn test_help_lists_every_command() {
        let (router, transport) = router();
        router.handle(&invoke("help")).await;
        let help = &transport.acknowledgments()[0];
        for command in Command::ALL {
            assert!(help.contains(&format!("**/{}**", command.name())));
        }
    }
}
