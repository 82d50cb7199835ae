use std::sync::Arc;

use axum::{Json, extract::State};
use chrono::Utc;
use tracing::{info, warn};

use crate::{
    AppState,
    api::models::images::{GenerateImageRequest, GenerateImageResponse},
    bosbase::RecordStore,
    errors::Error,
    imagegen::{DEFAULT_DIMENSION, ImageGenerationParams, UpstreamError},
    usage::{
        EventId, UsageAttempt, UsageOutcome,
        recorder::{DEFAULT_ENDPOINT, DEFAULT_METHOD},
    },
};

/// Open a usage event for the attempt. Returns `None` when tracking is unavailable, which
/// never blocks the generation.
async fn start_usage_event(state: &AppState, attempt: &UsageAttempt) -> Option<(Arc<dyn RecordStore>, EventId)> {
    let store = match state.store.connect().await {
        Ok(store) => store,
        Err(e) => {
            warn!("Usage tracking unavailable: {}", e);
            return None;
        }
    };

    let provisioner = state.provisioner();
    let id = state
        .usage_recorder(store.as_ref(), &provisioner)
        .record_start(attempt)
        .await
        .inspect_err(|e| warn!("Failed to record usage event: {}", e))
        .ok()?;
    Some((store, id))
}

async fn finish_usage_event(state: &AppState, store: &dyn RecordStore, id: &EventId, outcome: &UsageOutcome) {
    let provisioner = state.provisioner();
    if let Err(e) = state.usage_recorder(store, &provisioner).record_outcome(id, outcome).await {
        warn!(id = %id, "Failed to record usage outcome: {}", e);
    }
}

/// Generate images from a prompt
#[utoipa::path(
    post,
    path = "/api/generate/image",
    request_body = GenerateImageRequest,
    tag = "images",
    responses(
        (status = 200, description = "Images generated", body = GenerateImageResponse),
        (status = 400, description = "Missing prompt or unsupported size"),
        (status = 500, description = "OpenAI API key is not configured"),
        (status = 502, description = "The image API failed"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn generate_image(
    State(state): State<AppState>,
    Json(request): Json<GenerateImageRequest>,
) -> Result<Json<GenerateImageResponse>, Error> {
    let params = ImageGenerationParams::new(
        request.prompt.as_deref(),
        request.model.as_deref(),
        request.width,
        request.height,
        request.num_images,
    )?;
    if !state.images.is_configured() {
        return Err(UpstreamError::MissingApiKey.into());
    }

    let attempt = UsageAttempt {
        endpoint: Some(DEFAULT_ENDPOINT.to_string()),
        method: Some(DEFAULT_METHOD.to_string()),
        model: Some(params.model.clone()),
        prompt: Some(params.prompt.clone()),
        num_images: Some(request.num_images.unwrap_or(1)),
        width: Some(request.width.unwrap_or(DEFAULT_DIMENSION)),
        height: Some(request.height.unwrap_or(DEFAULT_DIMENSION)),
    };
    let event = start_usage_event(&state, &attempt).await;

    let result = state.images.generate(&params).await.map_err(Error::from);

    if let Some((store, id)) = &event {
        let outcome = match &result {
            Ok(_) => UsageOutcome::succeeded(),
            Err(e) => UsageOutcome::failed(e.user_message()),
        };
        finish_usage_event(&state, store.as_ref(), id, &outcome).await;
    }

    let images = result?;
    info!(model = %params.model, count = images.len(), "Generated images");
    Ok(Json(GenerateImageResponse {
        images,
        prompt: params.prompt,
        model: params.model,
        created_at: Utc::now(),
    }))
}
