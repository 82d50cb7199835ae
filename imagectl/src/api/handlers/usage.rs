use axum::{Json, extract::State, http::StatusCode};
use tracing::{info, warn};

use crate::{
    AppState,
    api::models::usage::{ClickResponse, EnsureCollectionResponse, RecordClickRequest, UpdateClickRequest},
    usage::{ApiStats, EventId, StatsReader},
};

const STORE_UNAVAILABLE: &str = "BosBase client not available";

/// Record a usage event
#[utoipa::path(
    post,
    path = "/api/bosbase/record-click",
    request_body = RecordClickRequest,
    tag = "usage",
    responses(
        (status = 200, description = "Event recorded", body = ClickResponse),
        (status = 500, description = "Event could not be recorded", body = ClickResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn record_click(State(state): State<AppState>, Json(request): Json<RecordClickRequest>) -> (StatusCode, Json<ClickResponse>) {
    let store = match state.store.connect().await {
        Ok(store) => store,
        Err(e) => {
            warn!("Cannot record click: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(ClickResponse::failed(STORE_UNAVAILABLE)));
        }
    };

    let provisioner = state.provisioner();
    match state
        .usage_recorder(store.as_ref(), &provisioner)
        .record_event(&request.attempt(), &request.metadata.outcome())
        .await
    {
        Ok(id) => (StatusCode::OK, Json(ClickResponse::recorded(id))),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(ClickResponse::failed(e.to_string()))),
    }
}

/// Overwrite the outcome of a recorded event
#[utoipa::path(
    post,
    path = "/api/bosbase/update-click",
    request_body = UpdateClickRequest,
    tag = "usage",
    responses(
        (status = 200, description = "Event updated", body = ClickResponse),
        (status = 400, description = "Record ID is required", body = ClickResponse),
        (status = 500, description = "Event could not be updated", body = ClickResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_click(State(state): State<AppState>, Json(request): Json<UpdateClickRequest>) -> (StatusCode, Json<ClickResponse>) {
    let Some(id) = request.id.filter(|id| !id.is_empty()).map(EventId) else {
        return (StatusCode::BAD_REQUEST, Json(ClickResponse::failed("Record ID is required")));
    };

    let store = match state.store.connect().await {
        Ok(store) => store,
        Err(e) => {
            warn!("Cannot update click: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(ClickResponse::failed(STORE_UNAVAILABLE)));
        }
    };

    let provisioner = state.provisioner();
    match state
        .usage_recorder(store.as_ref(), &provisioner)
        .record_outcome(&id, &request.metadata.outcome())
        .await
    {
        Ok(()) => (StatusCode::OK, Json(ClickResponse::recorded(id))),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(ClickResponse::failed(e.to_string()))),
    }
}

/// Aggregate usage counters
#[utoipa::path(
    get,
    path = "/api/bosbase/stats",
    tag = "usage",
    responses(
        (status = 200, description = "Usage counters, zero when the store is unavailable", body = ApiStats),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_stats(State(state): State<AppState>) -> Json<ApiStats> {
    let reader = StatsReader::new(
        state.store.as_ref(),
        &state.config.bosbase.collection,
        state.config.stats.timezone,
        state.config.stats.page_size,
    );
    Json(reader.get_stats().await)
}

/// Create or repair the usage-event collection
#[utoipa::path(
    post,
    path = "/api/bosbase/ensure-collection",
    tag = "usage",
    responses(
        (status = 200, description = "Collection is ready", body = EnsureCollectionResponse),
        (status = 500, description = "Collection could not be checked or created", body = EnsureCollectionResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn ensure_collection(State(state): State<AppState>) -> (StatusCode, Json<EnsureCollectionResponse>) {
    let collection = &state.config.bosbase.collection;
    let failed = |error: String| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(EnsureCollectionResponse {
                success: false,
                message: format!("Failed to ensure collection '{collection}'"),
                path: None,
                error: Some(error),
            }),
        )
    };

    let store = match state.store.connect().await {
        Ok(store) => store,
        Err(e) => return failed(e.to_string()),
    };

    match state
        .provisioner()
        .ensure_schema(store.as_ref(), &state.usage_schema())
        .await
    {
        Ok(ready) => {
            info!(collection = %collection, path = ready.as_str(), "Collection ready");
            (
                StatusCode::OK,
                Json(EnsureCollectionResponse {
                    success: true,
                    message: format!("Collection '{collection}' is ready"),
                    path: Some(ready.as_str().to_string()),
                    error: None,
                }),
            )
        }
        Err(e) => failed(e.to_string()),
    }
}
