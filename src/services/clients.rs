use chrono::Utc;
use std::sync::Arc;

use crate::config::ClientSeed;
use crate::models::client::ClientRecord;
use crate::store::{KvStore, StoreError};

const CLIENTS_KEY: &str = "clients";

/// Registry of widget clients, keyed by API key.
#[derive(Clone)]
pub struct ClientRegistry {
    kv: Arc<dyn KvStore>,
}

fn new_client_id() -> String {
    format!("client_{}", &uuid::Uuid::new_v4().simple().to_string()[..12])
}

impl ClientRegistry {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    async fn put(&self, record: &ClientRecord) -> Result<(), StoreError> {
        let payload = serde_json::to_string(record)?;
        self.kv.hash_set(CLIENTS_KEY, &record.api_key, &payload).await
    }

    /// Insert seed clients that are not registered yet. Existing records
    /// (including their active flag) are left alone.
    pub async fn seed(&self, seeds: &[ClientSeed]) -> Result<usize, StoreError> {
        let mut inserted = 0;
        for seed in seeds {
            if self.get(&seed.api_key).await?.is_some() {
                continue;
            }
            let record = ClientRecord {
                api_key: seed.api_key.clone(),
                id: new_client_id(),
                name: seed.name.clone(),
                active: true,
                created_at: Utc::now(),
                email: None,
            };
            self.put(&record).await?;
            inserted += 1;
        }
        if inserted > 0 {
            tracing::info!(inserted, "Seeded clients");
        }
        Ok(inserted)
    }

    /// Register a new client with a generated API key.
    pub async fn register(
        &self,
        name: &str,
        email: Option<String>,
    ) -> Result<ClientRecord, StoreError> {
        let record = ClientRecord {
            api_key: format!("tryon_{}", uuid::Uuid::new_v4().simple()),
            id: new_client_id(),
            name: name.to_string(),
            active: true,
            created_at: Utc::now(),
            email,
        };
        self.put(&record).await?;
        tracing::info!(client_id = %record.id, name = %record.name, "Registered client");
        Ok(record)
    }

    pub async fn get(&self, api_key: &str) -> Result<Option<ClientRecord>, StoreError> {
        match self.kv.hash_get(CLIENTS_KEY, api_key).await? {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    /// All clients, oldest first.
    pub async fn list(&self) -> Result<Vec<ClientRecord>, StoreError> {
        let mut clients = self
            .kv
            .hash_all(CLIENTS_KEY)
            .await?
            .values()
            .map(|payload| serde_json::from_str::<ClientRecord>(payload))
            .collect::<Result<Vec<_>, _>>()?;
        clients.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        Ok(clients)
    }

    /// Returns the updated record, or `None` if the key is unknown.
    pub async fn set_active(
        &self,
        api_key: &str,
        active: bool,
    ) -> Result<Option<ClientRecord>, StoreError> {
        let Some(mut record) = self.get(api_key).await? else {
            return Ok(None);
        };
        record.active = active;
        self.put(&record).await?;
        tracing::info!(client_id = %record.id, active, "Updated client");
        Ok(Some(record))
    }

    /// Remove a client. Returns whether it existed.
    pub async fn delete(&self, api_key: &str) -> Result<bool, StoreError> {
        let existed = self.kv.hash_delete(CLIENTS_KEY, api_key).await?;
        if existed {
            tracing::info!(api_key = %api_key, "Deleted client");
        }
        Ok(existed)
    }
}
