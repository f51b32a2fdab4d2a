//! Request fixtures shared by the API tests

use serde_json::{json, Value};

/// 1x1 PNG, base64
pub const PNG_B64: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mP8z8BQDwAEhQGAhKmMIQAAAABJRU5ErkJggg==";

/// JPEG SOI + JFIF APP0 header, base64
pub const JPEG_B64: &str = "/9j/4AAQSkZJRgABAQAAAQABAAD/";

/// GIF89a header, base64 (a real image, but not one the provider accepts)
pub const GIF_B64: &str = "R0lGODlhAQABAIAAAP///wAAACH5BAEAAAAALAAAAAABAAEAAAICRAEAOw==";

pub const ACTIVE_KEY: &str = "demotryon01";
pub const INACTIVE_KEY: &str = "paused_shop";
pub const ADMIN_KEY: &str = "test-admin-key";

pub const RESULT_URL: &str = "https://v3.fal.media/files/result.png";

/// A try-on body with inline images and `garments` JPEG garments.
pub fn tryon_body(api_key: &str, garments: usize) -> Value {
    json!({
        "apiKey": api_key,
        "userImage": format!("data:image/png;base64,{PNG_B64}"),
        "garments": vec![JPEG_B64; garments],
    })
}

/// A try-on body referencing hosted images.
pub fn hosted_tryon_body(api_key: &str) -> Value {
    json!({
        "apiKey": api_key,
        "userImageUrl": "https://cdn.example/person.png",
        "garmentUrls": ["https://cdn.example/shirt.png", "https://cdn.example/pants.png"],
    })
}
