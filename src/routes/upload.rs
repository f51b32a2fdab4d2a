use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use std::time::Instant;

use crate::app_state::AppState;
use crate::error::ApiError;
use crate::models::generation::{DecodedImage, RequestError};
use crate::models::upload::{UploadRequest, UploadResponse};
use crate::services::auth::authenticate;

/// POST /api/images/upload: put one image on the provider CDN ahead of a
/// generation, so the generation request can carry a URL instead of bytes.
pub async fn upload_image(
    State(state): State<AppState>,
    payload: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let started = Instant::now();
    let Json(body) = payload?;

    let api_key = body
        .api_key
        .filter(|k| !k.trim().is_empty())
        .ok_or(RequestError::MissingApiKey)?;
    let image = body
        .image
        .filter(|i| !i.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing image".to_string()))?;

    let client = authenticate(&state.clients, &api_key).await?;
    let image = DecodedImage::decode(&image).map_err(RequestError::from)?;
    let size = image.bytes.len();

    let result = state.provider.upload(image).await;
    let outcome = if result.is_ok() { "success" } else { "error" };
    metrics::counter!("tryon_uploads_total", "outcome" => outcome).increment(1);
    let url = result.map_err(ApiError::Upload)?;

    let upload_time = started.elapsed().as_millis() as u64;
    tracing::info!(client_id = %client.id, size, upload_time, "Image uploaded");

    Ok(Json(UploadResponse {
        success: true,
        url,
        upload_time,
    }))
}
