use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app_state::AppState;
use crate::error::ApiError;
use crate::models::metrics::{Analytics, EventStatus, IngestRequest, MetricEvent};
use crate::routes::{header_str, require_admin, ADMIN_KEY_HEADER, CLIENT_KEY_HEADER};
use crate::services::auth::is_admin_key;

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    pub clients: Option<String>,
}

/// GET /api/metrics: every client for admins, a single client for `x-client-key`.
pub async fn get_metrics(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    if is_admin_key(&state.admin_key, header_str(&headers, ADMIN_KEY_HEADER)) {
        let overview = state.usage.all_metrics().await?;
        return Ok(Json(json!({ "success": true, "data": overview })));
    }

    if let Some(client_key) = header_str(&headers, CLIENT_KEY_HEADER) {
        let metrics = state
            .usage
            .client_metrics(client_key)
            .await?
            .ok_or_else(|| ApiError::NotFound("Client not found".to_string()))?;
        return Ok(Json(json!({ "success": true, "data": metrics })));
    }

    Err(ApiError::Unauthorized(
        "Missing authentication. Provide x-admin-key or x-client-key header".to_string(),
    ))
}

/// POST /api/ingest: usage events pushed by widgets and partner backends.
pub async fn ingest_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let client_key = header_str(&headers, CLIENT_KEY_HEADER)
        .ok_or_else(|| ApiError::Unauthorized("Missing x-client-key header".to_string()))?
        .to_string();
    let Json(body) = payload?;

    let (Some(kind), Some(timestamp)) = (body.kind.filter(|k| !k.is_empty()), body.timestamp) else {
        return Err(ApiError::BadRequest(
            "Missing required fields: type, timestamp".to_string(),
        ));
    };

    let event = MetricEvent {
        id: format!("evt_{}", uuid::Uuid::new_v4().simple()),
        kind,
        timestamp,
        model: body.model.unwrap_or_else(|| "unknown".to_string()),
        client_id: body.client_id.unwrap_or_else(|| client_key.clone()),
        client_name: body.client_name.unwrap_or_else(|| "Unknown".to_string()),
        client_key,
        job_id: None,
        status: EventStatus::Success,
        duration_ms: None,
    };
    state.usage.record(&event).await?;
    tracing::debug!(
        client_key = %event.client_key,
        kind = %event.kind,
        lag_ms = (Utc::now() - event.timestamp).num_milliseconds(),
        "Ingested usage event"
    );

    Ok(Json(json!({ "success": true, "message": "Event recorded" })))
}

/// GET /api/admin/analytics?clients=a,b
pub async fn analytics(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<Analytics>, ApiError> {
    require_admin(&state, &headers)?;

    let keys: Vec<String> = query
        .clients
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect();
    if keys.is_empty() {
        return Err(ApiError::BadRequest("Missing clients parameter".to_string()));
    }

    Ok(Json(state.usage.analytics(&keys).await?))
}
