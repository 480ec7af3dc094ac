//! Per-user model and prompt preferences over a [`HashStore`].

use crate::store::{HashStore, StoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

const MODEL_FIELD: &str = "model";
const PROMPT_FIELD: &str = "prompt";

/// A user's effective preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    /// Which AI backend/model to use
    pub model: String,
    /// Name of the system-prompt template
    pub prompt: String,
}

impl UserPreferences {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
        }
    }

    /// Build preferences from stored fields, taking anything missing from `defaults`.
    pub fn from_fields(fields: &HashMap<String, String>, defaults: &Self) -> Self {
        let pick = |field: &str, fallback: &String| {
            fields
                .get(field)
                .filter(|v| !v.is_empty())
                .cloned()
                .unwrap_or_else(|| fallback.clone())
        };
        Self {
            model: pick(MODEL_FIELD, &defaults.model),
            prompt: pick(PROMPT_FIELD, &defaults.prompt),
        }
    }
}

/// A partial preference write. `None` fields are left untouched in the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceUpdate {
    pub model: Option<String>,
    pub prompt: Option<String>,
}

impl PreferenceUpdate {
    pub fn model(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            prompt: None,
        }
    }

    pub fn prompt(prompt: impl Into<String>) -> Self {
        Self {
            model: None,
            prompt: Some(prompt.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.model.is_none() && self.prompt.is_none()
    }

    fn into_fields(self) -> Vec<(String, String)> {
        let mut fields = Vec::with_capacity(2);
        if let Some(model) = self.model {
            fields.push((MODEL_FIELD.to_string(), model));
        }
        if let Some(prompt) = self.prompt {
            fields.push((PROMPT_FIELD.to_string(), prompt));
        }
        fields
    }
}

/// Store key for a user's preference record.
pub fn preferences_key(user_id: &str) -> String {
    format!("user:{user_id}:preferences")
}

/// Adapter addressing preference records by user rather than by raw key.
#[derive(Clone)]
pub struct PreferenceStore {
    store: Arc<dyn HashStore>,
}

impl PreferenceStore {
    pub fn new(store: Arc<dyn HashStore>) -> Self {
        Self { store }
    }

    /// Name of the underlying backend.
    pub fn backend(&self) -> &'static str {
        self.store.name()
    }

    /// Every stored field for the user; empty when nothing is stored.
    pub async fn read_all(&self, user_id: &str) -> StoreResult<HashMap<String, String>> {
        self.store.get_all(&preferences_key(user_id)).await
    }

    /// Write only the fields present in `update`.
    pub async fn write_fields(&self, user_id: &str, update: PreferenceUpdate) -> StoreResult<()> {
        let fields = update.into_fields();
        if fields.is_empty() {
            return Ok(());
        }
        self.store
            .set_fields(&preferences_key(user_id), &fields)
            .await
    }

    /// Drop the user's whole record.
    pub async fn delete_key(&self, user_id: &str) -> StoreResult<()> {
        self.store.delete(&preferences_key(user_id)).await
    }
}
