//! reqwest client for `POST /images/generations`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, instrument};
use url::Url;

use super::{ImageGenerationParams, ImageGenerator, UpstreamError};
use crate::config::OpenAiConfig;

pub struct OpenAiImages {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl OpenAiImages {
    pub fn new(config: &OpenAiConfig) -> Result<Self, UpstreamError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
        })
    }
}

/// Makes sure a url has a trailing slash, so that `join` appends instead of replacing the
/// last path segment.
fn ensure_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        url.clone()
    } else {
        let mut new_url = url.clone();
        let mut path = new_url.path().to_string();
        path.push('/');
        new_url.set_path(&path);
        new_url
    }
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Option<Vec<ImageData>>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
    b64_json: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[async_trait]
impl ImageGenerator for OpenAiImages {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    #[instrument(skip_all, fields(model = %params.model, size = %params.size, n = params.n), err)]
    async fn generate(&self, params: &ImageGenerationParams) -> Result<Vec<String>, UpstreamError> {
        let api_key = self.api_key.as_deref().ok_or(UpstreamError::MissingApiKey)?;
        let url = ensure_slash(&self.base_url)
            .join("images/generations")
            .map_err(|e| UpstreamError::InvalidRequest(format!("Failed to construct images URL: {e}")))?;

        debug!("Requesting images from {}", url);
        let response = self.client.post(url).bearer_auth(api_key).json(params).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("OpenAI images request failed with status {}", status);
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(UpstreamError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: ImagesResponse = response.json().await?;
        let images: Vec<String> = body
            .data
            .ok_or(UpstreamError::EmptyResponse)?
            .into_iter()
            .filter_map(|image| match (image.url, image.b64_json) {
                (Some(url), _) if !url.is_empty() => Some(url),
                (_, Some(b64)) if !b64.is_empty() => Some(format!("data:image/png;base64,{b64}")),
                _ => None,
            })
            .collect();

        if images.is_empty() {
            return Err(UpstreamError::EmptyResponse);
        }
        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, api_key: Option<&str>) -> OpenAiImages {
        OpenAiImages::new(&OpenAiConfig {
            api_key: api_key.map(str::to_string),
            base_url: Url::parse(&format!("{}/v1", server.uri())).unwrap(),
            request_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn params() -> ImageGenerationParams {
        ImageGenerationParams::new(Some("a red fox"), None, None, None, None).unwrap()
    }

    #[test]
    fn test_ensure_slash() {
        let url = Url::parse("https://api.openai.com/v1").unwrap();
        assert_eq!(
            ensure_slash(&url).join("images/generations").unwrap().as_str(),
            "https://api.openai.com/v1/images/generations"
        );
    }

    #[tokio::test]
    async fn test_generate_returns_urls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/images/generations"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_json(json!({
                "model": "dall-e-3", "prompt": "a red fox", "n": 1, "size": "1024x1024",
                "quality": "standard", "style": "vivid"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "created": 1700000000,
                "data": [{"url": "https://images.example.com/fox.png", "revised_prompt": "a red fox"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let images = client_for(&server, Some("sk-test")).generate(&params()).await.unwrap();
        assert_eq!(images, vec!["https://images.example.com/fox.png".to_string()]);
    }

    #[tokio::test]
    async fn test_upstream_error_message_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/images/generations"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"message": "Your request was rejected by the safety system.", "type": "invalid_request_error"}
            })))
            .mount(&server)
            .await;

        let err = client_for(&server, Some("sk-test")).generate(&params()).await.unwrap_err();
        match err {
            UpstreamError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Your request was rejected by the safety system.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_data_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/images/generations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"created": 1700000000})))
            .mount(&server)
            .await;

        let err = client_for(&server, Some("sk-test")).generate(&params()).await.unwrap_err();
        assert!(matches!(err, UpstreamError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_missing_key_makes_no_request() {
        let server = MockServer::start().await;
        let client = client_for(&server, None);
        assert!(!client.is_configured());

        let err = client.generate(&params()).await.unwrap_err();
        assert!(matches!(err, UpstreamError::MissingApiKey));
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
