//! Flat-map persistent stores for user preferences.
//!
//! A [`HashStore`] holds string-to-string maps under string keys, the shape
//! of a Redis hash. No transactional guarantees span fields: concurrent
//! writers to different fields interleave and the last write per field wins.

use async_trait::async_trait;
use parley_common::config::{StoreBackend, StoreConfig};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Store error type.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store connection failed: {0}")]
    Connection(String),

    #[error("Store command failed: {0}")]
    Command(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Key-value store of flat string maps.
#[async_trait]
pub trait HashStore: Send + Sync {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Read every field under `key`. A missing key reads as an empty map.
    async fn get_all(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    /// Set the given fields under `key`, leaving other fields untouched.
    async fn set_fields(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()>;

    /// Remove `key` and all of its fields.
    async fn delete(&self, key: &str) -> StoreResult<()>;
}

// ============================================================================
// In-memory store
// ============================================================================

/// Process-local store. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryHashStore {
    maps: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl MemoryHashStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held.
    pub async fn len(&self) -> usize {
        self.maps.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.maps.read().await.is_empty()
    }
}

#[async_trait]
impl HashStore for MemoryHashStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        Ok(self.maps.read().await.get(key).cloned().unwrap_or_default())
    }

    async fn set_fields(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut maps = self.maps.write().await;
        let entry = maps.entry(key.to_string()).or_default();
        for (field, value) in fields {
            entry.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.maps.write().await.remove(key);
        Ok(())
    }
}

// ============================================================================
// Redis store
// ============================================================================

/// Redis-backed store using HGETALL / HSET / DEL.
pub struct RedisHashStore {
    /// Connection manager (handles reconnection automatically).
    conn_manager: redis::aio::ConnectionManager,
}

impl RedisHashStore {
    /// Connect to Redis.
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let timeout = std::time::Duration::from_secs(config.timeout_secs);
        let conn_manager = tokio::time::timeout(timeout, client.get_connection_manager())
            .await
            .map_err(|_| StoreError::Connection(format!("timed out after {timeout:?}")))?
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        tracing::info!(url = %config.url, "Connected to Redis preference store");
        Ok(Self { conn_manager })
    }

    /// Check the connection with a PING.
    pub async fn is_healthy(&self) -> bool {
        let mut conn = self.conn_manager.clone();
        matches!(
            redis::cmd("PING").query_async::<String>(&mut conn).await,
            Ok(ref response) if response == "PONG"
        )
    }
}

#[async_trait]
impl HashStore for RedisHashStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let mut conn = self.conn_manager.clone();
        redis::cmd("HGETALL")
            .arg(key)
            .query_async::<HashMap<String, String>>(&mut conn)
            .await
            .map_err(|e| StoreError::Command(e.to_string()))
    }

    async fn set_fields(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn_manager.clone();
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key);
        for (field, value) in fields {
            cmd.arg(field).arg(value);
        }
        cmd.query_async::<i64>(&mut conn)
            .await
            .map_err(|e| StoreError::Command(e.to_string()))?;

        tracing::debug!(key = %key, fields = fields.len(), "Preference fields written");
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.conn_manager.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(|e| StoreError::Command(e.to_string()))?;
        Ok(())
    }
}

/// Create the store configured by `config.backend`.
pub async fn create_store(config: &StoreConfig) -> StoreResult<Arc<dyn HashStore>> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory preference store; preferences will not survive restarts");
            Ok(Arc::new(MemoryHashStore::new()))
        }
        StoreBackend::Redis => {
            let store = RedisHashStore::connect(config).await?;
            if !store.is_healthy().await {
                return Err(StoreError::Unavailable(format!(
                    "{} did not answer PING",
                    config.url
                )));
            }
            Ok(Arc::new(store))
        }
    }
}
