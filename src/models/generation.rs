use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::models::job::JobStatus;

/// Most garments the provider accepts alongside the base image.
pub const MAX_GARMENTS: usize = 4;

/// Body shared by `POST /api/jobs/submit` and `POST /api/images/generate`.
///
/// Images arrive either inline (`userImage` + `garments`, raw base64 or data
/// URLs) or pre-hosted (`userImageUrl` + `garmentUrls`). When `userImageUrl`
/// is present the URL pair wins.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub api_key: Option<String>,
    pub user_image: Option<String>,
    pub garments: Option<Vec<String>>,
    pub user_image_url: Option<String>,
    pub garment_urls: Option<Vec<String>>,
    /// Frontend correlation id, echoed back in timings.
    #[serde(rename = "_requestId")]
    pub request_id: Option<String>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RequestError {
    #[error("Missing apiKey")]
    MissingApiKey,

    #[error("Missing userImage or userImageUrl")]
    MissingUserImage,

    #[error("At least one garment is required")]
    NoGarments,

    #[error("Maximum 4 garments allowed")]
    TooManyGarments,

    #[error("Invalid image: {0}")]
    Image(#[from] ImageError),
}

impl GenerateRequest {
    /// Check fields in the order clients see errors and normalize the images.
    /// Returns the API key and the provider input.
    pub fn into_parts(self) -> Result<(String, GenerationInput), RequestError> {
        let api_key = self
            .api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(RequestError::MissingApiKey)?;

        let (base, garments) = match self.user_image_url {
            Some(url) if !url.trim().is_empty() => (Some(url), self.garment_urls),
            _ => (self.user_image, self.garments),
        };
        let base = base
            .filter(|b| !b.trim().is_empty())
            .ok_or(RequestError::MissingUserImage)?;

        let garments = garments.unwrap_or_default();
        if garments.is_empty() {
            return Err(RequestError::NoGarments);
        }
        if garments.len() > MAX_GARMENTS {
            return Err(RequestError::TooManyGarments);
        }

        let input = GenerationInput {
            base_image: ImageInput::parse(&base)?,
            garments: garments
                .iter()
                .map(|g| ImageInput::parse(g))
                .collect::<Result<Vec<_>, _>>()?,
        };
        Ok((api_key, input))
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ImageError {
    #[error("image is empty")]
    Empty,

    #[error("malformed data URL")]
    MalformedDataUrl,

    #[error("image payload is not valid base64")]
    InvalidBase64,

    #[error("unsupported image format: {0}")]
    Unsupported(String),
}

/// One image handed to the provider: an inline data URL or a hosted URL.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageInput {
    Inline(String),
    Url(String),
}

/// Standard alphabet; trailing padding is optional, as browsers often strip it.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

impl ImageInput {
    pub fn parse(raw: &str) -> Result<Self, ImageError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ImageError::Empty);
        }
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Ok(ImageInput::Url(raw.to_string()));
        }

        let payload = inline_payload(raw)?;
        let mime = decode_payload(payload)?.mime;
        Ok(ImageInput::Inline(format!("data:{mime};base64,{payload}")))
    }

    /// The string placed in the provider's `image_urls`.
    pub fn as_provider_url(&self) -> &str {
        match self {
            ImageInput::Inline(data_url) => data_url,
            ImageInput::Url(url) => url,
        }
    }
}

/// Inline image bytes with the MIME type sniffed from them.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl DecodedImage {
    /// Decode raw base64 or a base64 data URL. Hosted URLs are not accepted.
    pub fn decode(raw: &str) -> Result<Self, ImageError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ImageError::Empty);
        }
        decode_payload(inline_payload(raw)?)
    }

    /// File extension matching the sniffed format.
    pub fn extension(&self) -> &'static str {
        self.mime.strip_prefix("image/").unwrap_or("bin")
    }
}

/// The base64 part of a data URL, or `raw` itself.
fn inline_payload(raw: &str) -> Result<&str, ImageError> {
    match raw.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(";base64,")
            .map(|(_, payload)| payload)
            .ok_or(ImageError::MalformedDataUrl),
        None => Ok(raw),
    }
}

/// Decode the whole payload, so corrupt data is rejected before a job
/// exists, then identify the format from its magic bytes.
fn decode_payload(payload: &str) -> Result<DecodedImage, ImageError> {
    let bytes = PAYLOAD_ENGINE
        .decode(payload)
        .map_err(|_| ImageError::InvalidBase64)?;

    let mime = match image::guess_format(&bytes) {
        Ok(image::ImageFormat::Png) => "image/png",
        Ok(image::ImageFormat::Jpeg) => "image/jpeg",
        Ok(image::ImageFormat::WebP) => "image/webp",
        Ok(other) => return Err(ImageError::Unsupported(format!("{other:?}"))),
        Err(_) => return Err(ImageError::Unsupported("unknown".to_string())),
    };
    Ok(DecodedImage { mime, bytes })
}

/// Normalized provider input: one base image plus garments.
#[derive(Debug, Clone, Validate)]
pub struct GenerationInput {
    #[garde(skip)]
    pub base_image: ImageInput,

    #[garde(length(min = 1, max = 4))]
    pub garments: Vec<ImageInput>,
}

impl GenerationInput {
    /// Base image first, then garments, as the provider expects them.
    pub fn image_urls(&self) -> Vec<String> {
        std::iter::once(&self.base_image)
            .chain(self.garments.iter())
            .map(|img| img.as_provider_url().to_string())
            .collect()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitTimestamps {
    pub created_at: i64,
}

/// Immediate answer to `POST /api/jobs/submit`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitJobResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub poll_url: String,
    pub timestamps: SubmitTimestamps,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InputsCount {
    pub garments: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateTimings {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub total_backend_ms: u64,
    pub fal_duration_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateMetadata {
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub inputs_count: InputsCount,
    pub timings: GenerateTimings,
}

/// Successful answer of the synchronous generate endpoint.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub success: bool,
    pub result_image: String,
    pub metadata: GenerateMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1x1 PNG header bytes, base64
    const PNG_B64: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mP8z8BQDwAEhQGAhKmMIQAAAABJRU5ErkJggg==";
    // JPEG SOI + JFIF APP0
    const JPEG_B64: &str = "/9j/4AAQSkZJRgABAQAAAQABAAD/";

    fn request(garments: usize) -> GenerateRequest {
        GenerateRequest {
            api_key: Some("demo_key_12345".into()),
            user_image: Some(PNG_B64.into()),
            garments: Some(vec![JPEG_B64.to_string(); garments]),
            ..Default::default()
        }
    }

    #[test]
    fn raw_base64_becomes_data_url() {
        let img = ImageInput::parse(PNG_B64).unwrap();
        assert_eq!(
            img.as_provider_url(),
            format!("data:image/png;base64,{PNG_B64}")
        );
        let img = ImageInput::parse(JPEG_B64).unwrap();
        assert!(img.as_provider_url().starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn data_url_is_resniffed() {
        let raw = format!("data:image/jpeg;base64,{PNG_B64}");
        let img = ImageInput::parse(&raw).unwrap();
        assert!(img.as_provider_url().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn hosted_urls_pass_through() {
        let img = ImageInput::parse("https://v3.fal.media/files/a.png").unwrap();
        assert_eq!(img, ImageInput::Url("https://v3.fal.media/files/a.png".into()));
    }

    #[test]
    fn rejects_garbage_images() {
        assert_eq!(ImageInput::parse("  "), Err(ImageError::Empty));
        assert_eq!(ImageInput::parse("data:image/png,abc"), Err(ImageError::MalformedDataUrl));
        assert_eq!(ImageInput::parse("!!!not-base64!!!"), Err(ImageError::InvalidBase64));
        // "hello world" is valid base64 of plain text, not an image
        assert!(matches!(
            ImageInput::parse("aGVsbG8gd29ybGQ="),
            Err(ImageError::Unsupported(_))
        ));
    }

    #[test]
    fn corrupt_tail_after_valid_header_is_rejected() {
        let corrupt = format!("{}!!!!this is not base64 at all ###", &PNG_B64[..64]);
        assert_eq!(ImageInput::parse(&corrupt), Err(ImageError::InvalidBase64));

        let data_url = format!("data:image/png;base64,{}@@", PNG_B64.trim_end_matches('='));
        assert_eq!(ImageInput::parse(&data_url), Err(ImageError::InvalidBase64));
    }

    #[test]
    fn missing_padding_is_accepted() {
        let unpadded = PNG_B64.trim_end_matches('=');
        let img = ImageInput::parse(unpadded).unwrap();
        assert!(img.as_provider_url().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn decoded_image_keeps_bytes_and_format() {
        let decoded = DecodedImage::decode(&format!("data:image/jpeg;base64,{PNG_B64}")).unwrap();
        assert_eq!(decoded.mime, "image/png");
        assert_eq!(decoded.extension(), "png");
        assert_eq!(decoded.bytes.len(), 70);
        assert_eq!(&decoded.bytes[1..4], b"PNG");

        assert_eq!(DecodedImage::decode(""), Err(ImageError::Empty));
        assert_eq!(
            DecodedImage::decode("https://cdn.example/a.png"),
            Err(ImageError::InvalidBase64)
        );
    }

    #[test]
    fn garment_count_bounds() {
        assert_eq!(request(0).into_parts().unwrap_err(), RequestError::NoGarments);
        assert_eq!(request(5).into_parts().unwrap_err(), RequestError::TooManyGarments);
        let (key, input) = request(4).into_parts().unwrap();
        assert_eq!(key, "demo_key_12345");
        assert_eq!(input.garments.len(), 4);
        assert_eq!(input.image_urls().len(), 5);
        assert!(input.validate().is_ok());
    }

    #[test]
    fn missing_fields_are_reported_in_order() {
        let mut req = request(1);
        req.api_key = None;
        req.user_image = None;
        assert_eq!(req.into_parts().unwrap_err(), RequestError::MissingApiKey);

        let mut req = request(1);
        req.user_image = Some(String::new());
        assert_eq!(req.into_parts().unwrap_err(), RequestError::MissingUserImage);
    }

    #[test]
    fn url_inputs_take_precedence() {
        let req = GenerateRequest {
            api_key: Some("k".into()),
            user_image_url: Some("https://cdn.example/person.png".into()),
            garment_urls: Some(vec!["https://cdn.example/shirt.png".into()]),
            garments: Some(vec![]),
            ..Default::default()
        };
        let (_, input) = req.into_parts().unwrap();
        assert_eq!(
            input.image_urls(),
            vec!["https://cdn.example/person.png", "https://cdn.example/shirt.png"]
        );
    }

    #[test]
    fn empty_input_fails_validation() {
        let input = GenerationInput {
            base_image: ImageInput::Url("https://cdn.example/p.png".into()),
            garments: vec![],
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn request_uses_camel_case_wire_names() {
        let req: GenerateRequest = serde_json::from_value(serde_json::json!({
            "apiKey": "k",
            "userImage": PNG_B64,
            "garments": [JPEG_B64],
            "_requestId": "fe-123"
        }))
        .unwrap();
        assert_eq!(req.request_id.as_deref(), Some("fe-123"));
        assert!(req.into_parts().is_ok());
    }
}
