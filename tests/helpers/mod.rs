//! Test helper utilities: an in-process app with a scripted provider

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tower::ServiceExt;

use tryon_gateway::app_state::AppState;
use tryon_gateway::config::{AppConfig, ClientSeed};
use tryon_gateway::models::generation::{DecodedImage, GenerationInput};
use tryon_gateway::routes;
use tryon_gateway::services::provider::{ImageProvider, ProviderError};
use tryon_gateway::store::{KvStore, MemoryStore, StoreError};

use crate::fixtures::{ACTIVE_KEY, ADMIN_KEY, INACTIVE_KEY};

/// What the scripted provider answers.
#[derive(Clone)]
pub enum Script {
    Succeed(String),
    Fail(String),
    /// Never answers.
    Hang,
}

/// Provider double. With a gate, every call waits for one `release()`.
pub struct ScriptedProvider {
    script: Script,
    gate: Option<Arc<Notify>>,
    calls: AtomicUsize,
    pub last_image_count: AtomicUsize,
    pub uploaded_bytes: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            gate: None,
            calls: AtomicUsize::new(0),
            last_image_count: AtomicUsize::new(0),
            uploaded_bytes: AtomicUsize::new(0),
        }
    }

    pub fn gated(script: Script) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let provider = Self {
            gate: Some(Arc::clone(&gate)),
            ..Self::new(script)
        };
        (provider, gate)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageProvider for ScriptedProvider {
    fn model(&self) -> &str {
        "fal-ai/test-model"
    }

    async fn generate(&self, input: &GenerationInput) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_image_count
            .store(input.image_urls().len(), Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        match &self.script {
            Script::Succeed(url) => Ok(url.clone()),
            Script::Fail(msg) => Err(ProviderError::Failed(msg.clone())),
            Script::Hang => std::future::pending().await,
        }
    }

    /// Answers like `generate`, without counting as a generation.
    async fn upload(&self, image: DecodedImage) -> Result<String, ProviderError> {
        self.uploaded_bytes.store(image.bytes.len(), Ordering::SeqCst);
        match &self.script {
            Script::Succeed(url) => Ok(url.clone()),
            Script::Fail(msg) => Err(ProviderError::Failed(msg.clone())),
            Script::Hang => std::future::pending().await,
        }
    }
}

/// A store whose backend is always down.
pub struct FailingStore;

fn down() -> StoreError {
    StoreError::Unavailable("connection refused".to_string())
}

#[async_trait]
impl KvStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(down())
    }
    async fn set(
        &self,
        _key: &str,
        _value: &str,
        _ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        Err(down())
    }
    async fn delete(&self, _key: &str) -> Result<bool, StoreError> {
        Err(down())
    }
    async fn push_capped(&self, _key: &str, _value: &str, _cap: usize) -> Result<(), StoreError> {
        Err(down())
    }
    async fn list(&self, _key: &str) -> Result<Vec<String>, StoreError> {
        Err(down())
    }
    async fn hash_set(&self, _key: &str, _field: &str, _value: &str) -> Result<(), StoreError> {
        Err(down())
    }
    async fn hash_get(&self, _key: &str, _field: &str) -> Result<Option<String>, StoreError> {
        Err(down())
    }
    async fn hash_delete(&self, _key: &str, _field: &str) -> Result<bool, StoreError> {
        Err(down())
    }
    async fn hash_all(&self, _key: &str) -> Result<HashMap<String, String>, StoreError> {
        Err(down())
    }
    async fn ping(&self) -> Result<(), StoreError> {
        Err(down())
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub provider: Arc<ScriptedProvider>,
}

pub fn test_config() -> AppConfig {
    AppConfig {
        admin_key: ADMIN_KEY.to_string(),
        sync_timeout_secs: 5,
        ..AppConfig::default()
    }
}

/// App over an in-memory store with one active and one inactive client.
pub async fn test_app(provider: ScriptedProvider) -> TestApp {
    let provider = Arc::new(provider);
    let state = AppState::new(
        Arc::new(MemoryStore::new()),
        "memory",
        Arc::clone(&provider) as Arc<dyn ImageProvider>,
        &test_config(),
    );
    state
        .clients
        .seed(&[
            ClientSeed {
                api_key: ACTIVE_KEY.into(),
                name: "Demo TryOn".into(),
            },
            ClientSeed {
                api_key: INACTIVE_KEY.into(),
                name: "Paused Shop".into(),
            },
        ])
        .await
        .expect("seed clients");
    state
        .clients
        .set_active(INACTIVE_KEY, false)
        .await
        .expect("deactivate client");

    let router = routes::with_middleware(routes::router(state.clone()), 25 * 1024 * 1024);
    TestApp {
        router,
        state,
        provider,
    }
}

/// App whose store is unreachable.
pub fn broken_store_app(provider: ScriptedProvider) -> TestApp {
    let provider = Arc::new(provider);
    let state = AppState::new(
        Arc::new(FailingStore),
        "redis",
        Arc::clone(&provider) as Arc<dyn ImageProvider>,
        &test_config(),
    );
    let router = routes::with_middleware(routes::router(state.clone()), 25 * 1024 * 1024);
    TestApp {
        router,
        state,
        provider,
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("read body")
            .to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, headers: &[(&str, &str)]) -> TestResponse {
        self.send(request(Method::GET, uri, headers, None)).await
    }

    pub async fn post(&self, uri: &str, headers: &[(&str, &str)], body: Value) -> TestResponse {
        self.send(request(Method::POST, uri, headers, Some(body))).await
    }

    /// POST a body that is not necessarily valid JSON.
    pub async fn post_raw(
        &self,
        uri: &str,
        content_type: Option<&str>,
        body: &str,
    ) -> TestResponse {
        let mut builder = Request::builder().method(Method::POST).uri(uri);
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        let request = builder
            .body(Body::from(body.to_string()))
            .expect("valid request");
        self.send(request).await
    }

    pub async fn patch(&self, uri: &str, headers: &[(&str, &str)], body: Value) -> TestResponse {
        self.send(request(Method::PATCH, uri, headers, Some(body))).await
    }

    pub async fn delete(&self, uri: &str, headers: &[(&str, &str)]) -> TestResponse {
        self.send(request(Method::DELETE, uri, headers, None)).await
    }

    /// Poll the status endpoint until the job reaches `status`.
    pub async fn wait_for_status(&self, job_id: &str, status: &str) -> TestResponse {
        let uri = format!("/api/jobs/{job_id}/status");
        for _ in 0..200 {
            let response = self.get(&uri, &[]).await;
            if response.body["status"] == status {
                return response;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {job_id} never reached {status}");
    }
}

pub fn request(
    method: Method,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .expect("valid request"),
        None => builder.body(Body::empty()).expect("valid request"),
    }
}
