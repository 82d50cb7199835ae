//! Image generation against the OpenAI images API.

pub mod openai;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use openai::OpenAiImages;

pub const DEFAULT_MODEL: &str = "dall-e-3";
pub const DEFAULT_DIMENSION: u32 = 1024;
/// Upper bound on images per request for models other than dall-e-3
pub const MAX_IMAGES: u32 = 4;
pub const SUPPORTED_SIZES: &[&str] = &["256x256", "512x512", "1024x1024", "1792x1024", "1024x1792"];

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("OpenAI API key is not configured")]
    MissingApiKey,

    #[error("{0}")]
    InvalidRequest(String),

    #[error("OpenAI API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("No image data returned from OpenAI")]
    EmptyResponse,

    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Validated body of an images/generations call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageGenerationParams {
    pub model: String,
    pub prompt: String,
    pub n: u32,
    pub size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<&'static str>,
}

impl ImageGenerationParams {
    /// Apply defaults and model-specific rules. dall-e-3 only produces one image per call.
    pub fn new(
        prompt: Option<&str>,
        model: Option<&str>,
        width: Option<u32>,
        height: Option<u32>,
        num_images: Option<u32>,
    ) -> Result<Self, UpstreamError> {
        let prompt = prompt
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| UpstreamError::InvalidRequest("Prompt is required".to_string()))?;
        let model = model.filter(|m| !m.is_empty()).unwrap_or(DEFAULT_MODEL);

        let size = format!(
            "{}x{}",
            width.unwrap_or(DEFAULT_DIMENSION),
            height.unwrap_or(DEFAULT_DIMENSION)
        );
        if !SUPPORTED_SIZES.contains(&size.as_str()) {
            return Err(UpstreamError::InvalidRequest(format!(
                "Unsupported image size {size}, expected one of {}",
                SUPPORTED_SIZES.join(", ")
            )));
        }

        let dall_e_3 = model == DEFAULT_MODEL;
        let n = if dall_e_3 {
            1
        } else {
            num_images.unwrap_or(1).clamp(1, MAX_IMAGES)
        };

        Ok(Self {
            model: model.to_string(),
            prompt: prompt.to_string(),
            n,
            size,
            quality: dall_e_3.then_some("standard"),
            style: dall_e_3.then_some("vivid"),
        })
    }
}

/// Produces image URLs for a prompt.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Whether calls can be made at all (an API key is present).
    fn is_configured(&self) -> bool;

    async fn generate(&self, params: &ImageGenerationParams) -> Result<Vec<String>, UpstreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_for_dall_e_3() {
        let params = ImageGenerationParams::new(Some("a cat"), None, None, None, Some(3)).unwrap();
        assert_eq!(
            serde_json::to_value(&params).unwrap(),
            json!({
                "model": "dall-e-3",
                "prompt": "a cat",
                "n": 1,
                "size": "1024x1024",
                "quality": "standard",
                "style": "vivid"
            })
        );
    }

    #[test]
    fn test_other_models_cap_image_count() {
        let params = ImageGenerationParams::new(Some("a cat"), Some("dall-e-2"), Some(512), Some(512), Some(10)).unwrap();
        assert_eq!(params.n, MAX_IMAGES);
        assert_eq!(params.size, "512x512");
        assert!(params.quality.is_none());
        assert!(params.style.is_none());

        let params = ImageGenerationParams::new(Some("a cat"), Some("dall-e-2"), Some(256), Some(256), Some(0)).unwrap();
        assert_eq!(params.n, 1);
    }

    #[test]
    fn test_rejects_blank_prompt_and_bad_size() {
        let err = ImageGenerationParams::new(Some("   "), None, None, None, None).unwrap_err();
        assert_eq!(err.to_string(), "Prompt is required");
        assert!(ImageGenerationParams::new(None, None, None, None, None).is_err());

        let err = ImageGenerationParams::new(Some("a cat"), None, Some(800), Some(600), None).unwrap_err();
        assert!(matches!(err, UpstreamError::InvalidRequest(ref m) if m.contains("800x600")));
    }
}
