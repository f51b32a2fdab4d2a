use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::time::Instant;

use crate::app_state::AppState;
use crate::error::ApiError;
use crate::models::client::ClientRecord;
use crate::models::generation::{
    GenerateMetadata, GenerateRequest, GenerateResponse, GenerateTimings, InputsCount,
};
use crate::models::metrics::EventStatus;
use crate::services::auth::authenticate;
use crate::services::usage::NewEvent;

/// POST /api/images/generate: run one generation inside the request.
///
/// Validation and auth failures use the common error shape. Once the
/// provider has been called, failures answer `{ success: false, error }`
/// with 502, or 504 when the wall-clock ceiling is hit.
pub async fn generate_image(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload?;
    let started = Instant::now();
    let request_id = body
        .request_id
        .clone()
        .unwrap_or_else(|| format!("req_{}", uuid::Uuid::new_v4().simple()));

    let (api_key, input) = body.into_parts()?;
    let client = authenticate(&state.clients, &api_key).await?;
    let garments = input.garments.len();

    tracing::info!(
        request_id = %request_id,
        client_id = %client.id,
        garments,
        "Sync generation started"
    );

    let provider_started = Instant::now();
    let result = tokio::time::timeout(state.sync_timeout, state.provider.generate(&input)).await;
    let fal_duration_ms = provider_started.elapsed().as_millis() as u64;
    metrics::histogram!("tryon_provider_seconds").record(provider_started.elapsed().as_secs_f64());

    let (status, outcome, response) = match result {
        Ok(Ok(image_url)) => {
            let total_backend_ms = started.elapsed().as_millis() as u64;
            tracing::info!(
                request_id = %request_id,
                fal_duration_ms,
                total_backend_ms,
                "Sync generation finished"
            );
            let body = GenerateResponse {
                success: true,
                result_image: image_url,
                metadata: GenerateMetadata {
                    generated_at: chrono::Utc::now(),
                    inputs_count: InputsCount { garments },
                    timings: GenerateTimings {
                        request_id,
                        total_backend_ms,
                        fal_duration_ms,
                    },
                },
            };
            (EventStatus::Success, "success", Json(body).into_response())
        }
        Ok(Err(e)) => {
            tracing::warn!(request_id = %request_id, error = %e, "Sync generation failed");
            let body = json!({ "success": false, "error": e.to_string() });
            (EventStatus::Error, "error", (StatusCode::BAD_GATEWAY, Json(body)).into_response())
        }
        Err(_) => {
            tracing::warn!(
                request_id = %request_id,
                timeout_secs = state.sync_timeout.as_secs(),
                "Sync generation timed out"
            );
            let body = json!({
                "success": false,
                "error": format!("Generation timed out after {}s", state.sync_timeout.as_secs()),
            });
            (
                EventStatus::Error,
                "timeout",
                (StatusCode::GATEWAY_TIMEOUT, Json(body)).into_response(),
            )
        }
    };

    metrics::counter!("tryon_sync_generations_total", "outcome" => outcome).increment(1);
    record_usage(&state, &client, status, fal_duration_ms).await;
    Ok(response)
}

async fn record_usage(
    state: &AppState,
    client: &ClientRecord,
    status: EventStatus,
    duration_ms: u64,
) {
    let event = NewEvent {
        model: state.provider.model().to_string(),
        job_id: None,
        status,
        duration_ms: Some(duration_ms),
    };
    if let Err(e) = state.usage.record_generation(client, event).await {
        tracing::error!(client_id = %client.id, error = %e, "Failed to record usage event");
    }
}
