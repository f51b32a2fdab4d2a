use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::app_state::AppState;
use crate::error::ApiError;
use crate::models::generation::{GenerateRequest, SubmitJobResponse, SubmitTimestamps};
use crate::models::job::{JobMetadata, JobStatusResponse};
use crate::services::auth::authenticate;
use crate::services::job_store::new_job_id;

const CACHE_TERMINAL: &str = "public, max-age=60";
const CACHE_PENDING: &str = "no-store, no-cache, must-revalidate";

/// POST /api/jobs/submit: create a job and start generation in the background.
pub async fn submit_job(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<SubmitJobResponse>, ApiError> {
    let Json(body) = payload?;
    let (api_key, input) = body.into_parts()?;
    let client = authenticate(&state.clients, &api_key).await?;

    let job_id = new_job_id();
    let metadata = JobMetadata {
        client_id: Some(client.id.clone()),
        garments_count: Some(input.garments.len() as u32),
    };
    let job = state.jobs.create_job(&job_id, metadata).await?;
    metrics::counter!("tryon_jobs_submitted_total").increment(1);

    // The handle is only needed by callers that want to wait
    let _ = state.dispatcher.dispatch(job_id.clone(), client, input);

    Ok(Json(SubmitJobResponse {
        poll_url: format!("/api/jobs/{job_id}/status"),
        job_id,
        status: job.status,
        timestamps: SubmitTimestamps {
            created_at: job.created_at,
        },
    }))
}

/// GET /api/jobs/{id}/status: current job state for polling clients.
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
    let Some(job) = state.jobs.get_job(&job_id).await? else {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Job not found", "job_id": job_id })),
        )
            .into_response());
    };

    let cache = if job.status.is_terminal() {
        CACHE_TERMINAL
    } else {
        CACHE_PENDING
    };

    Ok((
        [(header::CACHE_CONTROL, HeaderValue::from_static(cache))],
        Json(JobStatusResponse::from(&job)),
    )
        .into_response())
}
