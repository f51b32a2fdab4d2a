use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use tryon_gateway::app_state::AppState;
use tryon_gateway::config::AppConfig;
use tryon_gateway::routes;
use tryon_gateway::services::provider::FalClient;
use tryon_gateway::store::{KvStore, MemoryStore, RedisStore};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing tryon-gateway server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    routes::metrics::describe_metrics();

    // Key-value store: Redis when configured, process memory otherwise
    let (kv, backend): (Arc<dyn KvStore>, &'static str) = match &config.redis_url {
        Some(url) => {
            tracing::info!("Connecting to Redis");
            let store = RedisStore::new(url).expect("Failed to initialize Redis client");
            if let Err(e) = store.ping().await {
                tracing::warn!(error = %e, "Redis not reachable at startup");
            }
            (Arc::new(store) as Arc<dyn KvStore>, "redis")
        }
        None => {
            tracing::warn!("REDIS_URL not set, jobs and clients are kept in process memory");
            (Arc::new(MemoryStore::new()) as Arc<dyn KvStore>, "memory")
        }
    };

    // Initialize fal.ai client
    tracing::info!(model = %config.fal_model, "Initializing fal.ai client");
    let provider = FalClient::new(
        &config.fal_api_key,
        &config.fal_model,
        &config.fal_queue_url,
        config.backoff_policy(),
    )
    .expect("Failed to initialize fal.ai client")
    .with_storage_url(&config.fal_storage_url);
    if config.fal_api_key.is_empty() {
        tracing::warn!("FAL_API_KEY not set, generations will fail");
    }

    // Create shared application state
    let state = AppState::new(kv, backend, Arc::new(provider), &config);

    let seeds = config.client_seeds();
    state
        .clients
        .seed(&seeds)
        .await
        .expect("Failed to seed clients");

    // Build API routes, plus the Prometheus endpoint (separate state)
    let app = routes::router(state).route(
        "/metrics",
        get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
    );
    let app = routes::with_middleware(app, config.max_body_bytes);

    tracing::info!("Starting tryon-gateway on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
