use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Success,
    Error,
}

/// One usage event. Stored append-only per client key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricEvent {
    pub id: String,
    /// Event kind; generation events are the only ones counted.
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub client_key: String,
    pub client_id: String,
    pub client_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default = "default_status")]
    pub status: EventStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

fn default_status() -> EventStatus {
    EventStatus::Success
}

impl MetricEvent {
    pub const GENERATION: &'static str = "generation";

    pub fn is_generation(&self) -> bool {
        self.kind == Self::GENERATION
    }
}

/// Aggregated usage for one client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMetrics {
    pub client_key: String,
    pub client_id: String,
    pub client_name: String,
    pub total_generations: usize,
    pub last_generation: Option<DateTime<Utc>>,
    pub generations_by_model: BTreeMap<String, usize>,
    /// Newest first.
    pub recent_events: Vec<MetricEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsTotals {
    pub total_clients: usize,
    pub total_generations: usize,
    pub generations_by_model: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsOverview {
    /// Sorted by total generations, descending.
    pub clients: Vec<ClientMetrics>,
    pub totals: MetricsTotals,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingEntry {
    pub client_key: String,
    pub client_name: String,
    pub count: usize,
}

/// Body of `GET /api/admin/analytics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analytics {
    pub ranking: Vec<RankingEntry>,
    /// Generations per UTC hour of day, index 0..24.
    pub hourly: Vec<usize>,
    pub total_generations: usize,
}

/// Body of `POST /api/ingest`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub model: Option<String>,
    pub client_id: Option<String>,
    pub client_name: Option<String>,
}
