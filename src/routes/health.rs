use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub store: ComponentHealth,
    pub provider: ComponentHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
}

#[derive(Serialize)]
pub struct JobsHealthResponse {
    pub store_backend: &'static str,
    pub store_connected: bool,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /health — service health with dependency status.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let start = std::time::Instant::now();
    let store_check = match state.kv.ping().await {
        Ok(_) => ComponentHealth {
            status: "ok".to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
        },
        Err(e) => {
            tracing::warn!(error = %e, "Store health check failed");
            ComponentHealth {
                status: "error".to_string(),
                latency_ms: None,
            }
        }
    };

    let provider_check = ComponentHealth {
        status: if state.provider.is_configured() {
            "ok".to_string()
        } else {
            "not_configured".to_string()
        },
        latency_ms: None,
    };

    let all_healthy = store_check.status == "ok" && provider_check.status == "ok";
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            store: store_check,
            provider: provider_check,
        },
    };

    (status_code, Json(response))
}

/// GET /api/jobs/health — whether the async job path can reach its store.
pub async fn jobs_health(State(state): State<AppState>) -> (StatusCode, Json<JobsHealthResponse>) {
    let (status_code, connected, message, error) = match state.kv.ping().await {
        Ok(_) => (StatusCode::OK, true, "Async jobs system operational", None),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            false,
            "Store connection failed",
            Some(e.to_string()),
        ),
    };

    let response = JobsHealthResponse {
        store_backend: state.store_backend,
        store_connected: connected,
        timestamp: Utc::now(),
        message: message.to_string(),
        error,
    };
    (status_code, Json(response))
}
