//! Parley Bot - Per-user conversation state for a chat bot.
//!
//! This crate provides:
//! - In-memory conversation history per user, with idle eviction
//! - User preferences (model, system prompt) in a Redis-style hash store
//! - Chunked response delivery with typing indicators and milestone notices
//! - Slash commands: `/clear`, `/save`, `/model`, `/prompt`, `/reset`, `/help`
//! - A CLI transport (for local testing)
//!
//! ## Architecture
//!
//! ```text
//! User → Transport → CommandRouter ──→ ConversationEngine ──→ HashStore
//!                  ↘ deliver_response ↗        ↓
//! User ←── send ←── Transport ←── chunks ←── ResponseSource
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod cli;
pub mod commands;
pub mod delivery;
pub mod engine;
pub mod format;
pub mod history;
pub mod message;
pub mod preferences;
pub mod prompts;
pub mod split;
pub mod store;
pub mod sweeper;
pub mod traits;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use cli::{CliTransport, EchoBackend};
pub use commands::{Command, CommandOutcome, CommandRouter};
pub use delivery::{BackendError, DeliveryError, DeliveryOutcome, DeliveryPhase, ResponseSource};
pub use engine::{ConversationEngine, EngineError, EngineResult};
pub use history::{ConversationStore, HistoryDialect, HistoryMessage, ModelTurn, Role};
pub use message::{ChannelMessage, ChannelType, CommandInvocation};
pub use preferences::{PreferenceUpdate, UserPreferences};
pub use prompts::PromptCatalog;
pub use split::{pack_lines, split_response};
pub use store::{create_store, HashStore, MemoryHashStore, RedisHashStore, StoreError};
pub use sweeper::spawn_idle_sweeper;
pub use traits::{ChannelError, ChannelResult, ErrorReporter, TracingErrorReporter, Transport};
