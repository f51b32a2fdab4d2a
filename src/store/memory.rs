use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::{KvStore, StoreError};

enum Value {
    Str(String),
    List(VecDeque<String>),
    Hash(HashMap<String, String>),
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Minimum gap between full scans for expired keys.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Entries {
    map: HashMap<String, Entry>,
    next_sweep: Instant,
}

impl Entries {
    /// Drop `key` if it has expired. At most once per [`SWEEP_INTERVAL`]
    /// every other expired key goes too, so keys nobody reads again are
    /// still reclaimed.
    fn purge(&mut self, key: &str) -> &mut HashMap<String, Entry> {
        let now = Instant::now();
        if now >= self.next_sweep {
            let before = self.map.len();
            self.map.retain(|_, e| !e.is_expired(now));
            self.next_sweep = now + SWEEP_INTERVAL;
            let removed = before - self.map.len();
            if removed > 0 {
                tracing::debug!(removed, remaining = self.map.len(), "Swept expired keys");
            }
        } else if self.map.get(key).is_some_and(|e| e.is_expired(now)) {
            self.map.remove(key);
        }
        &mut self.map
    }
}

/// Process-local store with Redis-like TTL semantics. Expired keys are
/// dropped on access and by a periodic sweep piggybacked on store calls.
pub struct MemoryStore {
    entries: RwLock<Entries>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Entries {
                map: HashMap::new(),
                next_sweep: Instant::now() + SWEEP_INTERVAL,
            }),
        }
    }

    fn wrong_type(key: &str) -> StoreError {
        StoreError::Unavailable(format!("key {key} holds a value of another type"))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.write().await;
        let map = entries.purge(key);
        match map.get(key) {
            None => Ok(None),
            Some(Entry { value: Value::Str(s), .. }) => Ok(Some(s.clone())),
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        let map = entries.purge(key);
        map.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().await;
        let map = entries.purge(key);
        Ok(map.remove(key).is_some())
    }

    async fn push_capped(&self, key: &str, value: &str, cap: usize) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        let map = entries.purge(key);
        let entry = map.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::List(VecDeque::new()),
            expires_at: None,
        });
        let Value::List(list) = &mut entry.value else {
            return Err(Self::wrong_type(key));
        };
        list.push_back(value.to_string());
        while list.len() > cap.max(1) {
            list.pop_front();
        }
        Ok(())
    }

    async fn list(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut entries = self.entries.write().await;
        let map = entries.purge(key);
        match map.get(key) {
            None => Ok(Vec::new()),
            Some(Entry { value: Value::List(list), .. }) => Ok(list.iter().cloned().collect()),
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        let map = entries.purge(key);
        let entry = map.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Hash(HashMap::new()),
            expires_at: None,
        });
        let Value::Hash(hash) = &mut entry.value else {
            return Err(Self::wrong_type(key));
        };
        hash.insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.write().await;
        let map = entries.purge(key);
        match map.get(key) {
            None => Ok(None),
            Some(Entry { value: Value::Hash(hash), .. }) => Ok(hash.get(field).cloned()),
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().await;
        let map = entries.purge(key);
        match map.get_mut(key) {
            None => Ok(false),
            Some(Entry { value: Value::Hash(hash), .. }) => Ok(hash.remove(field).is_some()),
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn hash_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut entries = self.entries.write().await;
        let map = entries.purge(key);
        match map.get(key) {
            None => Ok(HashMap::new()),
            Some(Entry { value: Value::Hash(hash), .. }) => Ok(hash.clone()),
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
