//! Conversation state engine.
//!
//! Ties together the in-memory [`ConversationStore`], the persistent
//! [`PreferenceStore`] and the chat [`Transport`]. Response delivery lives in
//! [`crate::delivery`].

use crate::history::{ConversationStore, HistoryDialect, HistoryMessage, ModelTurn, Role};
use crate::preferences::{PreferenceStore, PreferenceUpdate, UserPreferences};
use crate::prompts::PromptCatalog;
use crate::store::{HashStore, StoreError};
use crate::traits::{ErrorReporter, TracingErrorReporter, Transport};
use chrono::{DateTime, Utc};
use parley_common::config::{Config, ConversationConfig};
use std::sync::Arc;

/// Engine error type.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A preference write or delete failed.
    #[error("Could not update preferences: {0}")]
    Persistence(#[from] StoreError),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Per-user conversation state and response delivery.
pub struct ConversationEngine {
    pub(crate) config: ConversationConfig,
    pub(crate) conversations: ConversationStore,
    pub(crate) preferences: PreferenceStore,
    pub(crate) prompts: PromptCatalog,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) reporter: Arc<dyn ErrorReporter>,
    defaults: UserPreferences,
}

impl ConversationEngine {
    /// Create an engine with an empty conversation store, no prompt catalog
    /// and a logging error reporter.
    pub fn new(
        config: ConversationConfig,
        store: Arc<dyn HashStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let defaults = UserPreferences::new(&config.default_model, &config.default_prompt);
        let preferences = PreferenceStore::new(store);
        tracing::debug!(
            store = preferences.backend(),
            transport = transport.name(),
            default_model = %defaults.model,
            "Conversation engine created"
        );
        Self {
            config,
            conversations: ConversationStore::new(),
            preferences,
            prompts: PromptCatalog::default(),
            transport,
            reporter: Arc::new(TracingErrorReporter),
            defaults,
        }
    }

    /// Create an engine from the root configuration, including its prompts.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn HashStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self::new(config.conversation.clone(), store, transport)
            .with_prompts(PromptCatalog::new(config.prompts.clone()))
    }

    pub fn with_prompts(mut self, prompts: PromptCatalog) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Replace the conversation store, e.g. with one pre-seeded in tests.
    pub fn with_conversations(mut self, conversations: ConversationStore) -> Self {
        self.conversations = conversations;
        self
    }

    pub fn config(&self) -> &ConversationConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn prompts(&self) -> &PromptCatalog {
        &self.prompts
    }

    /// Preferences used when a user has none stored.
    pub fn default_preferences(&self) -> &UserPreferences {
        &self.defaults
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    /// History with `user`/`assistant` roles; empty for unknown users.
    pub fn history(&self, user_id: &str) -> Vec<HistoryMessage> {
        self.conversations.history(user_id)
    }

    /// History shaped for a backend's role vocabulary.
    pub fn history_for(&self, user_id: &str, dialect: HistoryDialect) -> Vec<ModelTurn> {
        self.conversations.turns(user_id, dialect)
    }

    /// Record a completed exchange. Returns the new history length.
    pub fn update_history(&self, user_id: &str, user_message: &str, model_response: &str) -> usize {
        let len = self
            .conversations
            .append_exchange(user_id, user_message, model_response);
        tracing::debug!(user_id = %user_id, history_len = len, "History updated");
        len
    }

    /// Forget the user's history. Preferences and activity are kept.
    pub fn clear_history(&self, user_id: &str) {
        if self.conversations.clear(user_id) {
            tracing::info!(user_id = %user_id, "Conversation history cleared");
        }
    }

    /// Forget both history and activity, as if the user had never spoken.
    pub fn reset_conversation(&self, user_id: &str) {
        self.conversations.forget(user_id);
        tracing::debug!(user_id = %user_id, "Conversation reset");
    }

    pub fn is_new_conversation(&self, user_id: &str) -> bool {
        self.conversations.is_empty(user_id)
    }

    pub fn last_activity(&self, user_id: &str) -> Option<DateTime<Utc>> {
        self.conversations.last_activity(user_id)
    }

    pub fn tracked_users(&self) -> usize {
        self.conversations.tracked_users()
    }

    /// Plain-text transcript, one `User:`/`Bot:` line per message.
    pub fn transcript(&self, user_id: &str) -> String {
        self.history(user_id)
            .iter()
            .map(|message| {
                let speaker = match message.role {
                    Role::User => "User",
                    Role::Assistant => "Bot",
                };
                format!("{speaker}: {}", message.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    // ------------------------------------------------------------------
    // Preferences
    // ------------------------------------------------------------------

    /// Effective preferences. Store failures fall back to the defaults.
    pub async fn user_preferences(&self, user_id: &str) -> UserPreferences {
        match self.preferences.read_all(user_id).await {
            Ok(fields) => UserPreferences::from_fields(&fields, &self.defaults),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    user_id = %user_id,
                    "Preference read failed, using defaults"
                );
                self.defaults.clone()
            }
        }
    }

    /// Write only the supplied preference fields.
    pub async fn set_user_preferences(
        &self,
        user_id: &str,
        update: PreferenceUpdate,
    ) -> EngineResult<()> {
        if update.is_empty() {
            return Ok(());
        }
        tracing::info!(
            user_id = %user_id,
            model = ?update.model,
            prompt = ?update.prompt,
            "Updating preferences"
        );
        self.preferences.write_fields(user_id, update).await?;
        Ok(())
    }

    /// Delete the stored record so reads fall back to the defaults.
    pub async fn reset_user_preferences(&self, user_id: &str) -> EngineResult<()> {
        self.preferences.delete_key(user_id).await?;
        tracing::info!(user_id = %user_id, "Preferences reset to defaults");
        Ok(())
    }

    /// Text of the user's selected system prompt, if the catalog knows it.
    pub async fn system_prompt(&self, user_id: &str) -> Option<String> {
        let prefs = self.user_preferences(user_id).await;
        self.prompts.get(&prefs.prompt).map(str::to_string)
    }

    // ------------------------------------------------------------------
    // Eviction
    // ------------------------------------------------------------------

    /// Evict users idle for longer than `max_idle`. Returns how many were evicted.
    pub fn evict_idle(&self, max_idle: std::time::Duration) -> usize {
        self.evict_idle_at(max_idle, Utc::now())
    }

    /// Eviction against an explicit clock reading.
    pub fn evict_idle_at(&self, max_idle: std::time::Duration, now: DateTime<Utc>) -> usize {
        // Out-of-range durations mean "never evict"; a century is close enough.
        let max_idle = chrono::Duration::from_std(max_idle)
            .unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
        let evicted = self.conversations.evict_idle_at(max_idle, now);
        if !evicted.is_empty() {
            tracing::info!(
                evicted = evicted.len(),
                remaining = self.conversations.tracked_users(),
                "Evicted idle conversations"
            );
        }
        evicted.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryHashStore;
    use crate::testing::{FailingHashStore, RecordingTransport};
    use std::time::Duration;

    fn engine_with(store: Arc<dyn HashStore>) -> ConversationEngine {
        ConversationEngine::new(
            ConversationConfig::with_default_model("gemini-pro"),
            store,
            Arc::new(RecordingTransport::new()),
        )
    }

    fn engine() -> ConversationEngine {
        engine_with(Arc::new(MemoryHashStore::new()))
    }

    #[test]
    fn test_history_grows_by_two() {
        let engine = engine();
        for n in 1..=3 {
            assert_eq!(engine.update_history("u", "q", "a"), 2 * n);
        }
        assert_eq!(engine.history("u").len(), 6);
    }

    #[test]
    fn test_clear_then_new_conversation() {
        let engine = engine();
        engine.update_history("u", "hi", "Hello!");
        assert!(!engine.is_new_conversation("u"));

        engine.clear_history("u");
        assert!(engine.is_new_conversation("u"));
        engine.clear_history("u");
        assert!(engine.is_new_conversation("u"));
        assert!(engine.last_activity("u").is_some());
    }

    #[test]
    fn test_reset_conversation_drops_activity() {
        let engine = engine();
        engine.update_history("u", "hi", "Hello!");
        engine.reset_conversation("u");
        assert!(engine.is_new_conversation("u"));
        assert!(engine.last_activity("u").is_none());
        assert_eq!(engine.tracked_users(), 0);
    }

    #[test]
    fn test_transcript_format() {
        let engine = engine();
        engine.update_history("u", "hi", "Hello!");
        engine.update_history("u", "bye", "Goodbye.");
        assert_eq!(
            engine.transcript("u"),
            "User: hi\nBot: Hello!\nUser: bye\nBot: Goodbye."
        );
    }

    #[tokio::test]
    async fn test_default_preferences() {
        let engine = engine();
        assert_eq!(
            engine.user_preferences("new-user").await,
            UserPreferences::new("gemini-pro", "helpful_assistant")
        );
    }

    #[tokio::test]
    async fn test_field_independence() {
        let engine = engine();
        engine
            .set_user_preferences("u", PreferenceUpdate::prompt("code_reviewer"))
            .await
            .unwrap();
        engine
            .set_user_preferences("u", PreferenceUpdate::model("x"))
            .await
            .unwrap();

        let prefs = engine.user_preferences("u").await;
        assert_eq!(prefs.model, "x");
        assert_eq!(prefs.prompt, "code_reviewer");
    }

    #[tokio::test]
    async fn test_model_only_keeps_default_prompt() {
        let engine = engine();
        engine
            .set_user_preferences("u", PreferenceUpdate::model("x"))
            .await
            .unwrap();
        assert_eq!(engine.user_preferences("u").await.prompt, "helpful_assistant");
    }

    #[tokio::test]
    async fn test_reset_falls_back_to_defaults() {
        let engine = engine();
        engine
            .set_user_preferences("u", PreferenceUpdate::model("x"))
            .await
            .unwrap();
        engine.reset_user_preferences("u").await.unwrap();
        assert_eq!(engine.user_preferences("u").await.model, "gemini-pro");
    }

    #[tokio::test]
    async fn test_read_failure_falls_back() {
        let engine = engine_with(Arc::new(FailingHashStore));
        assert_eq!(engine.user_preferences("u").await.model, "gemini-pro");
    }

    #[tokio::test]
    async fn test_write_failure_is_persistence_error() {
        let engine = engine_with(Arc::new(FailingHashStore));
        let err = engine
            .set_user_preferences("u", PreferenceUpdate::model("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Persistence(_)));
        assert!(engine.reset_user_preferences("u").await.is_err());
    }

    #[tokio::test]
    async fn test_system_prompt_resolves_name() {
        let engine = engine().with_prompts(PromptCatalog::new(
            [("helpful_assistant".to_string(), "Be helpful.".to_string())].into(),
        ));
        assert_eq!(engine.system_prompt("u").await.as_deref(), Some("Be helpful."));
    }

    #[test]
    fn test_evict_idle_boundary() {
        let engine = engine();
        engine.update_history("u", "hi", "Hello!");
        let t = engine.last_activity("u").unwrap();
        let d = Duration::from_secs(60);

        assert_eq!(
            engine.evict_idle_at(d, t + chrono::Duration::seconds(59)),
            0
        );
        assert_eq!(engine.history("u").len(), 2);

        assert_eq!(
            engine.evict_idle_at(d, t + chrono::Duration::seconds(61)),
            1
        );
        assert!(engine.is_new_conversation("u"));
        assert_eq!(engine.tracked_users(), 0);
    }

    #[test]
    fn test_evict_idle_keeps_recent() {
        let engine = engine();
        engine.update_history("u", "hi", "Hello!");
        assert_eq!(engine.evict_idle(Duration::from_secs(3600)), 0);
        assert_eq!(engine.tracked_users(), 1);
    }
}
