use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::services::{
    clients::ClientRegistry, dispatcher::Dispatcher, job_store::JobStore,
    provider::ImageProvider, usage::UsageMetrics,
};
use crate::store::KvStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub kv: Arc<dyn KvStore>,
    /// "redis" or "memory", reported by the health endpoints.
    pub store_backend: &'static str,
    pub jobs: JobStore,
    pub clients: ClientRegistry,
    pub usage: UsageMetrics,
    pub provider: Arc<dyn ImageProvider>,
    pub dispatcher: Dispatcher,
    pub admin_key: Arc<str>,
    pub sync_timeout: Duration,
}

impl AppState {
    pub fn new(
        kv: Arc<dyn KvStore>,
        store_backend: &'static str,
        provider: Arc<dyn ImageProvider>,
        config: &AppConfig,
    ) -> Self {
        let jobs = JobStore::new(Arc::clone(&kv), config.job_ttl());
        let clients = ClientRegistry::new(Arc::clone(&kv));
        let usage = UsageMetrics::new(Arc::clone(&kv), clients.clone(), config.metrics_history_cap);
        let dispatcher = Dispatcher::new(jobs.clone(), Arc::clone(&provider), usage.clone());

        Self {
            kv,
            store_backend,
            jobs,
            clients,
            usage,
            provider,
            dispatcher,
            admin_key: Arc::from(config.admin_key.as_str()),
            sync_timeout: config.sync_timeout(),
        }
    }
}
