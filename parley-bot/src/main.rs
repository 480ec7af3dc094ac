//! Parley Bot - Main entry point.

use anyhow::{Context, Result};
use parley_bot::{cli, create_store, spawn_idle_sweeper, CliTransport, CommandRouter, ConversationEngine};
use parley_common::config::Config;
use parley_common::logging::init_logging_with_exclusions;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration (file, then environment)
    let config = Config::load_with_env().context("Failed to load configuration")?;

    // Initialize logging
    init_logging_with_exclusions(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    tracing::info!("Parley Bot v{}", env!("CARGO_PKG_VERSION"));

    config
        .validate()
        .context("Invalid configuration (is PARLEY_DEFAULT_MODEL set?)")?;

    let store = create_store(&config.store)
        .await
        .context("Failed to initialize preference store")?;

    let engine = Arc::new(ConversationEngine::from_config(
        &config,
        store,
        Arc::new(CliTransport::new()),
    ));
    let router = CommandRouter::new(engine.clone());

    let sweeper_handle = spawn_idle_sweeper(
        engine.clone(),
        config.conversation.sweep_interval(),
        config.conversation.inactivity_timeout(),
    );

    tracing::info!(
        model = %config.conversation.default_model,
        prompt = %config.conversation.default_prompt,
        "Ready; type a message, /help for commands, /quit to exit"
    );

    let result = cli::run(&engine, &router).await;

    // Clean up on shutdown
    sweeper_handle.abort();

    result
}
