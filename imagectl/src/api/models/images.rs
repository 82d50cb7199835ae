//! API request/response models for image generation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of `POST /api/generate/image`. Every field is optional so that a missing prompt is
/// reported as a 400 by the handler rather than a deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageRequest {
    pub prompt: Option<String>,
    /// Accepted for compatibility, not forwarded upstream
    pub negative_prompt: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub num_images: Option<u32>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageResponse {
    /// Image URLs (or `data:` URLs for base64 payloads)
    pub images: Vec<String>,
    pub prompt: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
}
