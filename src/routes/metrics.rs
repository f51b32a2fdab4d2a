use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// GET /metrics — Prometheus scrape endpoint (text exposition format).
/// Counts jobs, sync generations, uploads and provider latency.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}

/// Register descriptions for every metric the service emits.
pub fn describe_metrics() {
    metrics::describe_counter!("tryon_jobs_submitted_total", "Async jobs accepted");
    metrics::describe_counter!("tryon_jobs_completed_total", "Async jobs finished with an image");
    metrics::describe_counter!("tryon_jobs_failed_total", "Async jobs finished with an error");
    metrics::describe_counter!(
        "tryon_sync_generations_total",
        "Synchronous generations by outcome"
    );
    metrics::describe_histogram!(
        "tryon_provider_seconds",
        metrics::Unit::Seconds,
        "Time spent waiting on the image provider"
    );
    metrics::describe_counter!("tryon_uploads_total", "Provider storage uploads by outcome");
    metrics::describe_gauge!("tryon_jobs_in_flight", "Async jobs currently generating");
}
