use serde::Deserialize;
use std::time::Duration;

use crate::services::backoff::BackoffPolicy;
use crate::services::provider::DEFAULT_STORAGE_URL;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Redis connection string. Without it jobs live in process memory.
    pub redis_url: Option<String>,

    /// fal.ai API key
    #[serde(default)]
    pub fal_api_key: String,

    /// fal.ai model path (e.g., "fal-ai/nano-banana-pro/edit")
    #[serde(default = "default_fal_model")]
    pub fal_model: String,

    /// fal.ai queue base URL
    #[serde(default = "default_fal_queue_url")]
    pub fal_queue_url: String,

    /// fal.ai REST base URL, used for storage uploads
    #[serde(default = "default_fal_storage_url")]
    pub fal_storage_url: String,

    /// Shared secret for the admin endpoints (x-admin-key header)
    #[serde(default)]
    pub admin_key: String,

    /// Clients inserted at startup, formatted "key=Name,key2=Other Name"
    #[serde(default)]
    pub seed_clients: String,

    /// Retention window for job records, in seconds
    #[serde(default = "default_job_ttl_secs")]
    pub job_ttl_secs: u64,

    /// Wall-clock ceiling for the synchronous generate endpoint, in seconds
    #[serde(default = "default_sync_timeout_secs")]
    pub sync_timeout_secs: u64,

    #[serde(default = "default_poll_initial_ms")]
    pub poll_initial_ms: u64,

    #[serde(default = "default_poll_max_ms")]
    pub poll_max_ms: u64,

    #[serde(default = "default_poll_multiplier")]
    pub poll_multiplier: f64,

    #[serde(default = "default_poll_max_attempts")]
    pub poll_max_attempts: u32,

    /// Events kept per client
    #[serde(default = "default_metrics_history_cap")]
    pub metrics_history_cap: usize,

    /// Request body limit in bytes (inline images are large)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_fal_model() -> String {
    "fal-ai/nano-banana-pro/edit".to_string()
}

fn default_fal_queue_url() -> String {
    "https://queue.fal.run".to_string()
}

fn default_fal_storage_url() -> String {
    DEFAULT_STORAGE_URL.to_string()
}

fn default_job_ttl_secs() -> u64 {
    3600
}

fn default_sync_timeout_secs() -> u64 {
    60
}

fn default_poll_initial_ms() -> u64 {
    1000
}

fn default_poll_max_ms() -> u64 {
    3000
}

fn default_poll_multiplier() -> f64 {
    1.5
}

fn default_poll_max_attempts() -> u32 {
    60
}

fn default_metrics_history_cap() -> usize {
    1000
}

fn default_max_body_bytes() -> usize {
    25 * 1024 * 1024
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            redis_url: None,
            fal_api_key: String::new(),
            fal_model: default_fal_model(),
            fal_queue_url: default_fal_queue_url(),
            fal_storage_url: default_fal_storage_url(),
            admin_key: String::new(),
            seed_clients: String::new(),
            job_ttl_secs: default_job_ttl_secs(),
            sync_timeout_secs: default_sync_timeout_secs(),
            poll_initial_ms: default_poll_initial_ms(),
            poll_max_ms: default_poll_max_ms(),
            poll_multiplier: default_poll_multiplier(),
            poll_max_attempts: default_poll_max_attempts(),
            metrics_history_cap: default_metrics_history_cap(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// One entry of `SEED_CLIENTS`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientSeed {
    pub api_key: String,
    pub name: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn job_ttl(&self) -> Duration {
        Duration::from_secs(self.job_ttl_secs)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_secs)
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            initial: Duration::from_millis(self.poll_initial_ms),
            multiplier: self.poll_multiplier,
            max_delay: Duration::from_millis(self.poll_max_ms),
            max_attempts: self.poll_max_attempts,
        }
    }

    /// Parse `SEED_CLIENTS`. Malformed entries are skipped.
    pub fn client_seeds(&self) -> Vec<ClientSeed> {
        parse_client_seeds(&self.seed_clients)
    }
}

pub fn parse_client_seeds(raw: &str) -> Vec<ClientSeed> {
    raw.split(',')
        .filter_map(|entry| {
            let (key, name) = entry.split_once('=')?;
            let (key, name) = (key.trim(), name.trim());
            if key.is_empty() || name.is_empty() {
                tracing::warn!(entry = %entry, "Ignoring malformed SEED_CLIENTS entry");
                return None;
            }
            Some(ClientSeed {
                api_key: key.to_string(),
                name: name.to_string(),
            })
        })
        .collect()
}
