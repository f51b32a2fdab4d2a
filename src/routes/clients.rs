use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use garde::Validate;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app_state::AppState;
use crate::error::ApiError;
use crate::models::client::{ClientRecord, ClientSummary, NewClientRequest, UpdateClientRequest};
use crate::routes::require_admin;

#[derive(Debug, Deserialize)]
pub struct DeleteClientQuery {
    #[serde(rename = "clientKey")]
    pub client_key: Option<String>,
}

async fn summarize(state: &AppState, record: ClientRecord) -> Result<ClientSummary, ApiError> {
    let metrics = state.usage.client_metrics(&record.api_key).await?;
    Ok(ClientSummary {
        usage_count: metrics.as_ref().map_or(0, |m| m.total_generations),
        last_generation: metrics.and_then(|m| m.last_generation),
        id: record.id,
        name: record.name,
        email: record.email,
        api_key: record.api_key,
        active: record.active,
        created_at: record.created_at,
    })
}

/// GET /api/clients
pub async fn list_clients(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    require_admin(&state, &headers)?;

    let mut clients = Vec::new();
    for record in state.clients.list().await? {
        clients.push(summarize(&state, record).await?);
    }
    Ok(Json(json!({ "success": true, "clients": clients })))
}

/// POST /api/clients
pub async fn create_client(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<NewClientRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&state, &headers)?;
    let Json(body) = payload?;
    body.validate()?;

    let name = body
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing required field: name".to_string()))?;

    let record = state.clients.register(name, body.email).await?;
    let client = summarize(&state, record).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Client registered",
        "client": client,
    })))
}

/// PATCH /api/clients/{key}
pub async fn update_client(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(api_key): Path<String>,
    payload: Result<Json<UpdateClientRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&state, &headers)?;
    let Json(body) = payload?;

    let record = state
        .clients
        .set_active(&api_key, body.active)
        .await?
        .ok_or_else(|| ApiError::NotFound("Client not found".to_string()))?;
    let client = summarize(&state, record).await?;
    Ok(Json(json!({ "success": true, "client": client })))
}

/// DELETE /api/clients?clientKey=...
pub async fn delete_client(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DeleteClientQuery>,
) -> Result<Json<Value>, ApiError> {
    require_admin(&state, &headers)?;

    let api_key = query
        .client_key
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing clientKey query parameter".to_string()))?;

    if !state.clients.delete(&api_key).await? {
        return Err(ApiError::NotFound("Client not found".to_string()));
    }
    state.usage.forget(&api_key).await?;

    Ok(Json(json!({ "success": true, "message": "Client deleted" })))
}
