use serde::{Deserialize, Serialize};

/// Body of `POST /api/images/upload`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub api_key: Option<String>,
    /// Raw base64 or a base64 data URL.
    pub image: Option<String>,
}

/// Where the uploaded image now lives on the provider's CDN.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub url: String,
    /// Wall-clock time of the whole request, in milliseconds.
    pub upload_time: u64,
}
