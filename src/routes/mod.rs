use axum::http::{header, HeaderMap, HeaderName, Method};
use axum::routing::{get, patch, post};
use axum::Router;
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::error::ApiError;
use crate::services::auth::is_admin_key;

pub mod clients;
pub mod generate;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod upload;
pub mod usage;

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";
pub const CLIENT_KEY_HEADER: &str = "x-client-key";

/// Every API route, bound to `state`. Middleware is added by [`with_middleware`].
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/jobs/health", get(health::jobs_health))
        .route("/api/jobs/submit", post(jobs::submit_job))
        .route("/api/jobs/{id}/status", get(jobs::job_status))
        .route("/api/images/generate", post(generate::generate_image))
        .route("/api/images/upload", post(upload::upload_image))
        .route(
            "/api/clients",
            get(clients::list_clients)
                .post(clients::create_client)
                .delete(clients::delete_client),
        )
        .route("/api/clients/{key}", patch(clients::update_client))
        .route("/api/metrics", get(usage::get_metrics))
        .route("/api/ingest", post(usage::ingest_event))
        .route("/api/admin/analytics", get(usage::analytics))
        .with_state(state)
}

pub fn with_middleware(router: Router, max_body_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(CLIENT_KEY_HEADER),
            HeaderName::from_static(ADMIN_KEY_HEADER),
        ])
        .max_age(Duration::from_secs(86400));

    router
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
}

/// Header value as UTF-8, ignoring empty values.
pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

pub(crate) fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    if is_admin_key(&state.admin_key, header_str(headers, ADMIN_KEY_HEADER)) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized(
            "Unauthorized. Provide x-admin-key header".to_string(),
        ))
    }
}
