//! Configuration management for Parley.
//!
//! The bot reads a single configuration file at `~/.parley/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (PARLEY_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `PARLEY_DEFAULT_MODEL` → conversation.default_model
//!   (falls back to `GOOGLE_MODEL_NAME`)
//! - `PARLEY_DEFAULT_PROMPT` → conversation.default_prompt
//! - `PARLEY_STORE_BACKEND` → store.backend
//! - `PARLEY_REDIS_URL` → store.url
//! - `PARLEY_LOG_LEVEL` → observability.log_level
//! - `PARLEY_LOG_FORMAT` → observability.log_format

use crate::error::{Error, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the prompt used when a user has not picked one.
pub const DEFAULT_PROMPT_NAME: &str = "helpful_assistant";

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".parley"),
        |dirs| dirs.home_dir().join(".parley"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Conversation
// ============================================================================

/// Conversation engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Model identifier used when a user has no stored preference.
    /// Required; there is no built-in model.
    #[serde(default)]
    pub default_model: String,

    /// Prompt name used when a user has no stored preference.
    #[serde(default = "default_prompt_name")]
    pub default_prompt: String,

    /// Transport message-size ceiling, in characters.
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,

    /// Chunk bound for transcripts sent by direct message.
    #[serde(default = "default_transcript_chunk_length")]
    pub transcript_chunk_length: usize,

    /// A reminder notice is sent whenever the history length is a multiple
    /// of this value. 0 disables the notice.
    #[serde(default = "default_milestone_interval")]
    pub milestone_interval: usize,

    /// Idle time after which a user's history is evicted.
    #[serde(default = "default_inactivity_timeout_secs")]
    pub inactivity_timeout_secs: u64,

    /// How often the idle sweep runs.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            default_model: String::new(),
            default_prompt: default_prompt_name(),
            max_message_length: default_max_message_length(),
            transcript_chunk_length: default_transcript_chunk_length(),
            milestone_interval: default_milestone_interval(),
            inactivity_timeout_secs: default_inactivity_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl ConversationConfig {
    /// Convenience constructor used by tests and embedders.
    pub fn with_default_model(model: impl Into<String>) -> Self {
        Self {
            default_model: model.into(),
            ..Self::default()
        }
    }

    pub fn inactivity_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.inactivity_timeout_secs)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs)
    }
}

// ============================================================================
// Store
// ============================================================================

/// Which preference store implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Redis hashes (HGETALL/HSET/DEL)
    #[default]
    Redis,
    /// Process-local map, lost on restart
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(Error::Config(format!("unknown store backend: {other}"))),
        }
    }
}

/// Preference store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Redis URL (redis://host:port).
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection timeout in seconds.
    #[serde(default = "default_store_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            url: default_redis_url(),
            timeout_secs: default_store_timeout_secs(),
        }
    }
}

// ============================================================================
// Observability
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets held at `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Named system prompts, resolved by name when a backend is called.
    #[serde(default = "default_prompts")]
    pub prompts: HashMap<String, String>,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            conversation: ConversationConfig::default(),
            prompts: default_prompts(),
            store: StoreConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .context(format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("PARLEY_DEFAULT_MODEL").or_else(|| lookup("GOOGLE_MODEL_NAME"))
        {
            self.conversation.default_model = model;
        }
        if let Some(prompt) = lookup("PARLEY_DEFAULT_PROMPT") {
            self.conversation.default_prompt = prompt;
        }

        if let Some(backend) = lookup("PARLEY_STORE_BACKEND") {
            match backend.parse() {
                Ok(b) => self.store.backend = b,
                Err(e) => tracing::warn!(error = %e, "Ignoring PARLEY_STORE_BACKEND"),
            }
        }
        if let Some(url) = lookup("PARLEY_REDIS_URL") {
            self.store.url = url;
        }

        if let Some(level) = lookup("PARLEY_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("PARLEY_LOG_FORMAT") {
            self.observability.log_format = format;
        }
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context(format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).context(format!("Failed to write config to {}", path.display()))
    }
}

fn default_prompt_name() -> String {
    DEFAULT_PROMPT_NAME.into()
}
fn default_max_message_length() -> usize {
    2000
}
fn default_transcript_chunk_length() -> usize {
    1900
}
fn default_milestone_interval() -> usize {
    3
}
fn default_inactivity_timeout_secs() -> u64 {
    3600
}
fn default_sweep_interval_secs() -> u64 {
    300
}
fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".into()
}
fn default_store_timeout_secs() -> u64 {
    5
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}
fn default_prompts() -> HashMap<String, String> {
    HashMap::from([(
        DEFAULT_PROMPT_NAME.to_string(),
        "You are a helpful assistant. Answer clearly and concisely.".to_string(),
    )])
}
