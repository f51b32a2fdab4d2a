use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};

/// A widget customer. The API key doubles as the client key used for
/// usage metrics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientRecord {
    pub api_key: String,
    pub id: String,
    pub name: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Body of `POST /api/clients`.
#[derive(Debug, Deserialize, Validate)]
pub struct NewClientRequest {
    #[garde(length(min = 1, max = 200))]
    pub name: Option<String>,

    #[garde(length(min = 3, max = 320))]
    pub email: Option<String>,
}

/// Body of `PATCH /api/clients/{key}`.
#[derive(Debug, Deserialize)]
pub struct UpdateClientRequest {
    pub active: bool,
}

/// One row of `GET /api/clients`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ClientSummary {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub api_key: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub usage_count: usize,
    pub last_generation: Option<DateTime<Utc>>,
}
