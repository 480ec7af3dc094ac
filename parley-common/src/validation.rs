//! Configuration validation for Parley.
//!
//! Ensures required values are present and numeric settings are usable
//! before the bot starts taking messages.

use thiserror::Error;

use crate::config::{Config, ConversationConfig, ObservabilityConfig, StoreBackend, StoreConfig};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.conversation.validate() {
            errors.push(e);
        }

        if let Err(e) = self.store.validate() {
            errors.push(e);
        }

        if let Err(e) = self.observability.validate() {
            errors.push(e);
        }

        // The fallback prompt must resolve, otherwise new users get no system prompt.
        if !self.prompts.is_empty() && !self.prompts.contains_key(&self.conversation.default_prompt)
        {
            errors.push(ValidationError::InvalidValue {
                field: "conversation.default_prompt".into(),
                reason: format!("'{}' is not defined in prompts", self.conversation.default_prompt),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }
}

impl Validate for ConversationConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.default_model.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "conversation.default_model".into(),
            });
        }

        if self.default_prompt.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "conversation.default_prompt".into(),
            });
        }

        for (field, value) in [
            ("conversation.max_message_length", self.max_message_length),
            (
                "conversation.transcript_chunk_length",
                self.transcript_chunk_length,
            ),
        ] {
            if value == 0 {
                return Err(ValidationError::InvalidValue {
                    field: field.into(),
                    reason: "must be greater than 0".into(),
                });
            }
        }

        if self.sweep_interval_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "conversation.sweep_interval_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }

        Ok(())
    }
}

impl Validate for StoreConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.backend == StoreBackend::Redis
            && !(self.url.starts_with("redis://") || self.url.starts_with("rediss://"))
        {
            return Err(ValidationError::InvalidValue {
                field: "store.url".into(),
                reason: "must start with redis:// or rediss://".into(),
            });
        }

        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            });
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            });
        }

        Ok(())
    }
}
