//! In-memory conversation history and activity bookkeeping.
//!
//! History is a flat list of message strings per user. Position parity gives
//! the role: even indexes are user turns, odd indexes are assistant turns.
//! Nothing here is persisted.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Author of a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn at(index: usize) -> Self {
        if index % 2 == 0 {
            Self::User
        } else {
            Self::Assistant
        }
    }

    /// Role label in the given backend vocabulary.
    pub const fn label(&self, dialect: HistoryDialect) -> &'static str {
        match (self, dialect) {
            (Self::User, _) => "user",
            (Self::Assistant, HistoryDialect::Assistant) => "assistant",
            (Self::Assistant, HistoryDialect::Model) => "model",
        }
    }
}

/// Role vocabulary expected by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryDialect {
    /// `user` / `assistant` (Anthropic-style)
    Assistant,
    /// `user` / `model` (Gemini-style)
    Model,
}

/// One entry of a user's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
}

/// A text part of a backend turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPart {
    pub text: String,
}

/// A history entry shaped as a backend turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelTurn {
    pub role: String,
    pub parts: Vec<TextPart>,
}

/// Owned store of per-user histories and last-activity timestamps.
///
/// State is partitioned per user; operations on different users never
/// contend beyond the map shard.
#[derive(Debug, Default)]
pub struct ConversationStore {
    histories: DashMap<String, Vec<String>>,
    last_activity: DashMap<String, DateTime<Utc>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// History with role labels; empty for unknown users.
    pub fn history(&self, user_id: &str) -> Vec<HistoryMessage> {
        self.histories
            .get(user_id)
            .map(|lines| {
                lines
                    .iter()
                    .enumerate()
                    .map(|(i, line)| HistoryMessage {
                        role: Role::at(i),
                        content: line.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// History shaped for a backend's role vocabulary.
    pub fn turns(&self, user_id: &str, dialect: HistoryDialect) -> Vec<ModelTurn> {
        self.history(user_id)
            .into_iter()
            .map(|message| ModelTurn {
                role: message.role.label(dialect).to_string(),
                parts: vec![TextPart {
                    text: message.content,
                }],
            })
            .collect()
    }

    /// Number of stored messages for the user.
    pub fn len(&self, user_id: &str) -> usize {
        self.histories.get(user_id).map_or(0, |lines| lines.len())
    }

    /// True when the user has no history.
    pub fn is_empty(&self, user_id: &str) -> bool {
        self.len(user_id) == 0
    }

    /// Append one exchange and stamp activity with the current time.
    /// Returns the new history length.
    pub fn append_exchange(&self, user_id: &str, user_message: &str, response: &str) -> usize {
        self.append_exchange_at(user_id, user_message, response, Utc::now())
    }

    /// Append one exchange stamped at `at`.
    ///
    /// Both messages are pushed while the user's entry is held, so the
    /// history length stays even.
    pub fn append_exchange_at(
        &self,
        user_id: &str,
        user_message: &str,
        response: &str,
        at: DateTime<Utc>,
    ) -> usize {
        let len = {
            let mut lines = self.histories.entry(user_id.to_string()).or_default();
            lines.push(user_message.to_string());
            lines.push(response.to_string());
            lines.len()
        };
        self.last_activity.insert(user_id.to_string(), at);
        len
    }

    /// Drop the user's history, keeping activity bookkeeping.
    /// Returns whether anything was removed.
    pub fn clear(&self, user_id: &str) -> bool {
        self.histories.remove(user_id).is_some()
    }

    /// Drop both history and activity for the user.
    pub fn forget(&self, user_id: &str) {
        self.histories.remove(user_id);
        self.last_activity.remove(user_id);
    }

    /// Time of the user's last completed exchange.
    pub fn last_activity(&self, user_id: &str) -> Option<DateTime<Utc>> {
        self.last_activity.get(user_id).map(|ts| *ts)
    }

    /// Number of users with activity bookkeeping.
    pub fn tracked_users(&self) -> usize {
        self.last_activity.len()
    }

    /// Evict every user idle for strictly longer than `max_idle` as of `now`.
    /// Returns the evicted user IDs.
    pub fn evict_idle_at(&self, max_idle: Duration, now: DateTime<Utc>) -> Vec<String> {
        let stale: Vec<String> = self
            .last_activity
            .iter()
            .filter(|entry| now - *entry.value() > max_idle)
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = Vec::with_capacity(stale.len());
        for user_id in stale {
            // Re-check under the entry lock; the user may have spoken since the scan.
            if self
                .last_activity
                .remove_if(&user_id, |_, ts| now - *ts > max_idle)
                .is_some()
            {
                self.histories.remove(&user_id);
                evicted.push(user_id);
            }
        }
        evicted
    }
}
