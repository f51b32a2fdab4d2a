use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::models::generation::{DecodedImage, GenerationInput};
use crate::services::backoff::BackoffPolicy;

/// An external image-generation service. Returns the URL of the result.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Model identifier recorded with usage events.
    fn model(&self) -> &str;

    fn is_configured(&self) -> bool {
        true
    }

    async fn generate(&self, input: &GenerationInput) -> Result<String, ProviderError>;

    /// Store an image on the provider's CDN and return its URL, so later
    /// generations can reference it instead of sending the bytes again.
    async fn upload(&self, image: DecodedImage) -> Result<String, ProviderError>;
}

/// Provider failures. Messages are passed to clients as-is.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("FAL_API_KEY not configured")]
    NotConfigured,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("FAL API error: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("FAL generation failed: {0}")]
    Failed(String),

    #[error("Unexpected FAL response format: {0}")]
    MalformedResponse(String),

    #[error("FAL generation timed out after {attempts} status checks")]
    Timeout { attempts: u32 },
}

/// Longest provider body echoed into an error message.
const ERROR_SNIPPET_CHARS: usize = 200;

/// fal REST API, home of the storage endpoints.
pub const DEFAULT_STORAGE_URL: &str = "https://rest.alpha.fal.ai";

/// Output resolution requested for every generation.
const IMAGE_SIZE: &str = "auto_4K";

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for the fal.ai queue API.
pub struct FalClient {
    http: Client,
    api_key: String,
    model: String,
    queue_url: String,
    storage_url: String,
    backoff: BackoffPolicy,
}

#[derive(Serialize)]
struct FalRequest {
    prompt: String,
    image_urls: Vec<String>,
    image_size: &'static str,
    num_images: u32,
    enable_safety_checker: bool,
}

#[derive(Serialize)]
struct InitiateUpload<'a> {
    content_type: &'a str,
    file_name: String,
}

/// Signed destination for the bytes, plus the URL they will be served from.
#[derive(Debug, Deserialize)]
struct UploadTarget {
    upload_url: String,
    file_url: String,
}

/// Returned when the request was queued instead of answered inline.
#[derive(Debug, Deserialize)]
struct QueueHandle {
    request_id: String,
    status_url: String,
    response_url: String,
}

#[derive(Debug, Deserialize)]
struct QueueStatus {
    status: String,
    #[serde(default)]
    error: Option<Value>,
}

impl FalClient {
    pub fn new(
        api_key: &str,
        model: &str,
        queue_url: &str,
        backoff: BackoffPolicy,
    ) -> Result<Self, ProviderError> {
        // One keep-alive pool shared by every generation
        let http = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
            queue_url: queue_url.trim_end_matches('/').to_string(),
            storage_url: DEFAULT_STORAGE_URL.to_string(),
            backoff,
        })
    }

    /// Point storage uploads somewhere other than [`DEFAULT_STORAGE_URL`].
    pub fn with_storage_url(mut self, storage_url: &str) -> Self {
        self.storage_url = storage_url.trim_end_matches('/').to_string();
        self
    }

    fn auth_header(&self) -> String {
        format!("Key {}", self.api_key)
    }

    async fn get_json(&self, url: &str) -> Result<Value, ProviderError> {
        let response = self
            .http
            .get(url)
            .header(AUTHORIZATION, self.auth_header())
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    /// Wait for a queued request, following the backoff policy.
    async fn poll(&self, handle: &QueueHandle) -> Result<String, ProviderError> {
        for (attempt, delay) in self.backoff.delays().enumerate() {
            tokio::time::sleep(delay).await;

            let status = match self.get_json(&handle.status_url).await {
                Ok(value) => serde_json::from_value::<QueueStatus>(value)
                    .map_err(|e| ProviderError::MalformedResponse(e.to_string())),
                Err(e) => Err(e),
            };

            match status {
                Ok(s) if s.status == "COMPLETED" => {
                    tracing::debug!(
                        request_id = %handle.request_id,
                        attempt,
                        "Provider request completed"
                    );
                    let result = self.get_json(&handle.response_url).await?;
                    return extract_image_url(&result).ok_or_else(|| {
                        ProviderError::MalformedResponse(snippet(&result.to_string()))
                    });
                }
                Ok(s) if s.status == "FAILED" => {
                    let reason = match s.error {
                        Some(Value::String(msg)) => msg,
                        Some(other) => other.to_string(),
                        None => "Unknown error".to_string(),
                    };
                    return Err(ProviderError::Failed(reason));
                }
                Ok(s) => {
                    tracing::debug!(
                        request_id = %handle.request_id,
                        attempt,
                        status = %s.status,
                        "Provider request still pending"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        request_id = %handle.request_id,
                        attempt,
                        error = %e,
                        "Provider status check failed, retrying"
                    );
                }
            }
        }

        Err(ProviderError::Timeout {
            attempts: self.backoff.max_attempts,
        })
    }
}

#[async_trait]
impl ImageProvider for FalClient {
    fn model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn generate(&self, input: &GenerationInput) -> Result<String, ProviderError> {
        if !self.is_configured() {
            return Err(ProviderError::NotConfigured);
        }

        let url = format!("{}/{}", self.queue_url, self.model);
        let body = FalRequest {
            prompt: try_on_prompt(input.garments.len()),
            image_urls: input.image_urls(),
            image_size: IMAGE_SIZE,
            num_images: 1,
            enable_safety_checker: true,
        };

        tracing::debug!(
            model = %self.model,
            images = body.image_urls.len(),
            "Submitting to provider"
        );

        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, self.auth_header())
            .json(&body)
            .send()
            .await?;
        let data: Value = ensure_success(response).await?.json().await?;

        if let Ok(handle) = serde_json::from_value::<QueueHandle>(data.clone()) {
            tracing::debug!(request_id = %handle.request_id, "Provider queued request");
            return self.poll(&handle).await;
        }

        extract_image_url(&data)
            .ok_or_else(|| ProviderError::MalformedResponse(snippet(&data.to_string())))
    }

    async fn upload(&self, image: DecodedImage) -> Result<String, ProviderError> {
        if !self.is_configured() {
            return Err(ProviderError::NotConfigured);
        }

        let request = InitiateUpload {
            content_type: image.mime,
            file_name: format!(
                "upload-{}.{}",
                chrono::Utc::now().timestamp_millis(),
                image.extension()
            ),
        };
        let response = self
            .http
            .post(format!(
                "{}/storage/upload/initiate?storage_type=fal-cdn-v3",
                self.storage_url
            ))
            .header(AUTHORIZATION, self.auth_header())
            .timeout(UPLOAD_TIMEOUT)
            .json(&request)
            .send()
            .await?;
        let target: Value = ensure_success(response).await?.json().await?;
        let target: UploadTarget = serde_json::from_value(target)
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        let size = image.bytes.len();
        let response = self
            .http
            .put(&target.upload_url)
            .header(CONTENT_TYPE, image.mime)
            .timeout(UPLOAD_TIMEOUT)
            .body(image.bytes)
            .send()
            .await?;
        ensure_success(response).await?;

        tracing::debug!(file_name = %request.file_name, size, "Uploaded image to provider storage");
        Ok(target.file_url)
    }
}

/// Turn a non-2xx answer into [`ProviderError::Api`] with a body snippet.
async fn ensure_success(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Api {
        status: status.as_u16(),
        body: snippet(&body),
    })
}

/// Instruction sent with the images. Figure 1 is the person, garments
/// follow as Figure 2, 3, ...
pub fn try_on_prompt(garments: usize) -> String {
    const KEEP: &str = "DO NOT MODIFY the structure, shape, pose, face, or proportions of the original image. KEEP THE ORIGINAL IMAGE EXACTLY AS IT IS";

    if garments <= 1 {
        return format!(
            "Add the clothing garment from Figure 2 onto the person in Figure 1. {KEEP}, only incorporating the clothing garment onto the person."
        );
    }

    let figures = (0..garments)
        .map(|i| format!("Figure {}", i + 2))
        .collect::<Vec<_>>()
        .join(" and ");
    format!(
        "Add the clothing garments from {figures} onto the person in Figure 1. {KEEP}, only incorporating the clothing garments onto the person."
    )
}

/// Find the result URL in any of the response shapes the provider uses.
pub fn extract_image_url(data: &Value) -> Option<String> {
    const URL_POINTERS: &[&str] = &[
        "/image/url",
        "/output/url",
        "/images/0/url",
        "/data/image/url",
        "/data/images/0/url",
        "/url",
        "/output",
    ];

    URL_POINTERS
        .iter()
        .filter_map(|pointer| data.pointer(pointer))
        .find_map(|v| v.as_str().filter(|s| !s.is_empty()))
        .map(str::to_string)
}

fn snippet(text: &str) -> String {
    text.chars().take(ERROR_SNIPPET_CHARS).collect()
}
