//! Per-client usage history and the aggregations behind the dashboard.

use chrono::{DateTime, Timelike, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::models::client::ClientRecord;
use crate::models::metrics::{
    Analytics, ClientMetrics, EventStatus, MetricEvent, MetricsOverview, MetricsTotals,
    RankingEntry,
};
use crate::services::clients::ClientRegistry;
use crate::store::{KvStore, StoreError};

const METRICS_PREFIX: &str = "metrics:";

/// Events returned in `recent_events`.
const RECENT_EVENTS: usize = 50;

pub const DEFAULT_HISTORY_CAP: usize = 1000;

#[derive(Clone)]
pub struct UsageMetrics {
    kv: Arc<dyn KvStore>,
    clients: ClientRegistry,
    history_cap: usize,
}

/// Fields of a new event; id and timestamp are filled in on record.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub model: String,
    pub job_id: Option<String>,
    pub status: EventStatus,
    pub duration_ms: Option<u64>,
}

impl UsageMetrics {
    pub fn new(kv: Arc<dyn KvStore>, clients: ClientRegistry, history_cap: usize) -> Self {
        Self {
            kv,
            clients,
            history_cap,
        }
    }

    fn key(client_key: &str) -> String {
        format!("{METRICS_PREFIX}{client_key}")
    }

    /// Append a raw event to the client's capped history.
    pub async fn record(&self, event: &MetricEvent) -> Result<(), StoreError> {
        let payload = serde_json::to_string(event)?;
        self.kv
            .push_capped(&Self::key(&event.client_key), &payload, self.history_cap)
            .await?;
        tracing::debug!(
            client_key = %event.client_key,
            event_id = %event.id,
            "Recorded usage event"
        );
        Ok(())
    }

    /// Record a generation made on behalf of `client`.
    pub async fn record_generation(
        &self,
        client: &ClientRecord,
        event: NewEvent,
    ) -> Result<(), StoreError> {
        self.record(&MetricEvent {
            id: format!("evt_{}", uuid::Uuid::new_v4().simple()),
            kind: MetricEvent::GENERATION.to_string(),
            timestamp: Utc::now(),
            model: event.model,
            client_key: client.api_key.clone(),
            client_id: client.id.clone(),
            client_name: client.name.clone(),
            job_id: event.job_id,
            status: event.status,
            duration_ms: event.duration_ms,
        })
        .await
    }

    pub async fn events(&self, client_key: &str) -> Result<Vec<MetricEvent>, StoreError> {
        self.kv
            .list(&Self::key(client_key))
            .await?
            .iter()
            .map(|payload| serde_json::from_str(payload).map_err(StoreError::from))
            .collect()
    }

    /// Drop a client's whole history.
    pub async fn forget(&self, client_key: &str) -> Result<(), StoreError> {
        self.kv.delete(&Self::key(client_key)).await?;
        Ok(())
    }

    /// `None` when the key is neither registered nor has any history.
    pub async fn client_metrics(
        &self,
        client_key: &str,
    ) -> Result<Option<ClientMetrics>, StoreError> {
        let client = self.clients.get(client_key).await?;
        let events = self.events(client_key).await?;
        if client.is_none() && events.is_empty() {
            return Ok(None);
        }
        Ok(Some(aggregate(client_key, client.as_ref(), events)))
    }

    /// Metrics for every registered client, busiest first.
    pub async fn all_metrics(&self) -> Result<MetricsOverview, StoreError> {
        let mut clients = Vec::new();
        let mut by_model: BTreeMap<String, usize> = BTreeMap::new();
        let mut total_generations = 0;

        for record in self.clients.list().await? {
            let events = self.events(&record.api_key).await?;
            let metrics = aggregate(&record.api_key, Some(&record), events);
            total_generations += metrics.total_generations;
            for (model, count) in &metrics.generations_by_model {
                *by_model.entry(model.clone()).or_default() += count;
            }
            clients.push(metrics);
        }

        clients.sort_by(|a, b| b.total_generations.cmp(&a.total_generations));

        Ok(MetricsOverview {
            totals: MetricsTotals {
                total_clients: clients.len(),
                total_generations,
                generations_by_model: by_model,
            },
            clients,
        })
    }

    /// Ranking across all clients and hourly distribution over `client_keys`.
    pub async fn analytics(&self, client_keys: &[String]) -> Result<Analytics, StoreError> {
        let mut ranking = Vec::new();
        for record in self.clients.list().await? {
            let count = self
                .events(&record.api_key)
                .await?
                .iter()
                .filter(|e| e.is_generation())
                .count();
            ranking.push(RankingEntry {
                client_key: record.api_key,
                client_name: record.name,
                count,
            });
        }
        ranking.sort_by(|a, b| b.count.cmp(&a.count));

        let mut hourly = vec![0usize; 24];
        for key in client_keys {
            for event in self.events(key).await?.iter().filter(|e| e.is_generation()) {
                hourly[event.timestamp.hour() as usize] += 1;
            }
        }

        Ok(Analytics {
            total_generations: ranking.iter().map(|r| r.count).sum(),
            ranking,
            hourly,
        })
    }
}

fn aggregate(
    client_key: &str,
    client: Option<&ClientRecord>,
    events: Vec<MetricEvent>,
) -> ClientMetrics {
    let mut generations_by_model: BTreeMap<String, usize> = BTreeMap::new();
    let mut total_generations = 0;
    let mut last_generation: Option<DateTime<Utc>> = None;

    for event in events.iter().filter(|e| e.is_generation()) {
        total_generations += 1;
        *generations_by_model.entry(event.model.clone()).or_default() += 1;
        last_generation = last_generation.max(Some(event.timestamp));
    }

    let mut recent_events = events;
    // Stable sort keeps insertion order for equal timestamps
    recent_events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    recent_events.truncate(RECENT_EVENTS);

    let fallback = recent_events.first();
    ClientMetrics {
        client_key: client_key.to_string(),
        client_id: client
            .map(|c| c.id.clone())
            .or_else(|| fallback.map(|e| e.client_id.clone()))
            .unwrap_or_else(|| client_key.to_string()),
        client_name: client
            .map(|c| c.name.clone())
            .or_else(|| fallback.map(|e| e.client_name.clone()))
            .unwrap_or_else(|| "Unknown".to_string()),
        total_generations,
        last_generation,
        generations_by_model,
        recent_events,
    }
}
