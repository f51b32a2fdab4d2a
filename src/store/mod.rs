//! Key-value persistence for jobs, clients, and usage events.
//!
//! Everything the service keeps lives behind [`KvStore`]: job records are
//! plain string values with a TTL, the client registry is a hash, and usage
//! history is a capped list per client. Production runs on Redis; the
//! in-memory backend serves local development and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

pub mod memory;
pub mod redis_store;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one. `ttl` resets the expiry.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Remove a key of any type. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Append to a list and keep only the newest `cap` entries.
    async fn push_capped(&self, key: &str, value: &str, cap: usize) -> Result<(), StoreError>;

    /// All list entries, oldest first.
    async fn list(&self, key: &str) -> Result<Vec<String>, StoreError>;

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError>;

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;

    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool, StoreError>;

    async fn hash_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    /// Connectivity check (for health checks).
    async fn ping(&self) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
