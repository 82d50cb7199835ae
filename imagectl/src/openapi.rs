//! OpenAPI document for the HTTP surface.

use utoipa::OpenApi;

use crate::{api, auth, usage};

#[derive(OpenApi)]
#[openapi(
    info(title = "imagectl", description = "Image generation proxy with BosBase usage tracking"),
    paths(
        api::handlers::generate::generate_image,
        api::handlers::usage::record_click,
        api::handlers::usage::update_click,
        api::handlers::usage::get_stats,
        api::handlers::usage::ensure_collection,
        api::handlers::auth::sign_in,
        api::handlers::auth::get_session,
        api::handlers::auth::sign_out,
    ),
    components(schemas(
        api::models::images::GenerateImageRequest,
        api::models::images::GenerateImageResponse,
        api::models::usage::ClickMetadata,
        api::models::usage::RecordClickRequest,
        api::models::usage::UpdateClickRequest,
        api::models::usage::ClickResponse,
        api::models::usage::EnsureCollectionResponse,
        api::models::auth::SessionResponse,
        api::models::auth::SignOutResponse,
        auth::OAuthProfile,
        usage::ApiStats,
    )),
    tags(
        (name = "images", description = "Image generation"),
        (name = "usage", description = "Usage tracking"),
        (name = "authentication", description = "Sign-in sessions"),
    )
)]
pub struct ApiDoc;
