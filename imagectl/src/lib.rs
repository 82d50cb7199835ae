//! # imagectl: control layer for an AI image-generation product
//!
//! `imagectl` sits between a web frontend and two backends: the OpenAI images API, which does
//! the actual generation, and a BosBase instance (a PocketBase-compatible backend) that stores
//! usage events and mirrors signed-in users.
//!
//! ## Request flow
//!
//! A call to `POST /api/generate/image` is validated, opens a usage event with
//! `success = false`, calls OpenAI, and then overwrites the event's outcome. Usage tracking is
//! best effort throughout: when BosBase is down or misconfigured the generation still goes
//! ahead, and `GET /api/bosbase/stats` reports zeros instead of failing.
//!
//! Before every usage write the [`usage::Provisioner`] makes sure the event collection exists
//! and matches the canonical layout in [`usage::schema`], creating or patching it as needed.
//! Collections created by older deployments marked `success` as required, which makes BosBase
//! reject `false`; the provisioner relaxes that flag and the recorder falls back to a logged,
//! degraded write if it cannot.
//!
//! Sign-in is delegated to an authenticating reverse proxy. [`auth`] turns the identity the
//! proxy forwards into a JWT session cookie and upserts the user into BosBase.
//!
//! ## Modules
//!
//! - [`api`]: axum handlers and request/response models
//! - [`auth`]: proxy identity, sessions and user sync
//! - [`bosbase`]: REST client and the [`bosbase::RecordStore`] seam
//! - [`config`]: figment-based configuration
//! - [`imagegen`]: OpenAI images client
//! - [`usage`]: provisioning, recording and stats
//! - [`telemetry`]: tracing and OTLP export

pub mod api;
pub mod auth;
pub mod bosbase;
pub mod config;
pub mod errors;
pub mod imagegen;
pub mod openapi;
pub mod telemetry;
pub mod usage;

#[cfg(test)]
mod test_utils;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router, http,
    http::HeaderValue,
    routing::{get, post},
};
use bon::Builder;
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use config::Config;

use crate::{
    bosbase::{BosBaseConnector, RecordStore, StoreConnector},
    config::CorsOrigin,
    imagegen::{ImageGenerator, OpenAiImages},
    openapi::ApiDoc,
    usage::{Provisioner, SchemaDescriptor, UsageRecorder},
};

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .store(Arc::new(connector))
///     .images(Arc::new(images))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    /// Hands out an authenticated BosBase handle per operation
    pub store: Arc<dyn StoreConnector>,
    pub images: Arc<dyn ImageGenerator>,
}

impl AppState {
    pub fn provisioner(&self) -> Provisioner {
        Provisioner::new(self.config.bosbase.provision_settle_delay)
    }

    /// Descriptor of the configured usage-event collection.
    pub fn usage_schema(&self) -> SchemaDescriptor<'_> {
        SchemaDescriptor::api_calls(&self.config.bosbase.collection)
    }

    pub fn usage_recorder<'a>(&'a self, store: &'a dyn RecordStore, provisioner: &'a Provisioner) -> UsageRecorder<'a> {
        UsageRecorder::new(store, provisioner, self.usage_schema())
    }
}

fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let mut origins = Vec::new();
    for origin in &config.auth.cors.allowed_origins {
        let header_value = match origin {
            CorsOrigin::Wildcard => "*".parse::<HeaderValue>()?,
            CorsOrigin::Url(url) => url.as_str().trim_end_matches('/').parse::<HeaderValue>()?,
        };
        origins.push(header_value);
    }

    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([http::Method::GET, http::Method::POST])
        .allow_headers([http::header::CONTENT_TYPE])
        .allow_credentials(config.auth.cors.allow_credentials);

    if let Some(max_age) = config.auth.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router with all endpoints and middleware.
///
/// # Errors
///
/// Returns an error if the CORS configuration cannot be turned into header values.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let cors_layer = create_cors_layer(&state.config)?;

    let api_routes = Router::new()
        .route("/generate/image", post(api::handlers::generate::generate_image))
        .route("/bosbase/record-click", post(api::handlers::usage::record_click))
        .route("/bosbase/update-click", post(api::handlers::usage::update_click))
        .route("/bosbase/stats", get(api::handlers::usage::get_stats))
        .route("/bosbase/ensure-collection", post(api::handlers::usage::ensure_collection))
        .route("/auth/sign-in", post(api::handlers::auth::sign_in))
        .route("/auth/session", get(api::handlers::auth::get_session))
        .route("/auth/sign-out", post(api::handlers::auth::sign_out))
        .with_state(state);

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .nest("/api", api_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .layer(cors_layer)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    Ok(router)
}

pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance with its outbound clients
    pub fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting imagectl with configuration: {:#?}", config);

        let store = BosBaseConnector::new(&config.bosbase).context("Failed to build BosBase client")?;
        let images = OpenAiImages::new(&config.openai).context("Failed to build OpenAI client")?;
        if !images.is_configured() {
            info!("OPENAI_API_KEY is not set; image generation requests will fail");
        }

        let state = AppState::builder()
            .config(config.clone())
            .store(Arc::new(store))
            .images(Arc::new(images))
            .build();
        let router = build_router(state)?;

        Ok(Self { router, config })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "imagectl listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestApp;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_healthz() {
        let app = TestApp::new();
        let response = app.server.get("/healthz").await;
        response.assert_status_ok();
        response.assert_text("OK");
    }

    #[tokio::test]
    async fn test_docs_are_served() {
        let app = TestApp::new();
        app.server.get("/docs").await.assert_status_ok();
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let app = TestApp::new();
        let response = app
            .server
            .method(http::Method::OPTIONS, "/api/bosbase/stats")
            .add_header("origin", "http://localhost:3000")
            .add_header("access-control-request-method", "GET")
            .await;

        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(
            response.header("access-control-allow-origin").to_str().unwrap(),
            "http://localhost:3000"
        );
        assert_eq!(response.header("access-control-allow-credentials").to_str().unwrap(), "true");
    }

    #[test]
    fn test_application_builds_from_default_config() {
        let config = Config {
            bosbase: config::BosBaseConfig {
                admin_email: "admin@example.com".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(Application::new(config).is_ok());
    }
}
