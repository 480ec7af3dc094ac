//! Background eviction of idle conversations.

use crate::engine::ConversationEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Spawn a task that evicts conversations idle longer than `max_idle`
/// every `every`. Abort the returned handle to stop it.
pub fn spawn_idle_sweeper(
    engine: Arc<ConversationEngine>,
    every: Duration,
    max_idle: Duration,
) -> JoinHandle<()> {
    tracing::info!(
        interval_secs = every.as_secs(),
        max_idle_secs = max_idle.as_secs(),
        "Starting idle conversation sweeper"
    );

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every.max(Duration::from_millis(1)));

        loop {
            interval.tick().await;
            let evicted = engine.evict_idle(max_idle);
            tracing::debug!(
                evicted,
                tracked = engine.tracked_users(),
                "Idle sweep finished"
            );
        }
    })
}
