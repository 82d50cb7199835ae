//! Shared fixtures for handler tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum_test::TestServer;

use crate::bosbase::in_memory::InMemoryStore;
use crate::config::{Config, StatsTimezone};
use crate::imagegen::{ImageGenerationParams, ImageGenerator, UpstreamError};
use crate::{AppState, build_router};

pub fn create_test_config() -> Config {
    let mut config = Config {
        secret_key: Some("test-secret-key-for-jwt".to_string()),
        ..Default::default()
    };
    config.bosbase.admin_email = "admin@example.com".to_string();
    config.bosbase.admin_password = Some("password".to_string());
    config.bosbase.provision_settle_delay = Duration::ZERO;
    config.stats.timezone = StatsTimezone::Utc;
    config
}

type FailureFn = Box<dyn Fn() -> UpstreamError + Send + Sync>;

/// Scripted [`ImageGenerator`].
pub struct FakeImages {
    configured: bool,
    images: Vec<String>,
    failure: Option<FailureFn>,
}

impl FakeImages {
    pub fn returning(images: Vec<&str>) -> Self {
        Self {
            configured: true,
            images: images.into_iter().map(str::to_string).collect(),
            failure: None,
        }
    }

    pub fn failing(failure: impl Fn() -> UpstreamError + Send + Sync + 'static) -> Self {
        Self {
            configured: true,
            images: Vec::new(),
            failure: Some(Box::new(failure)),
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            images: Vec::new(),
            failure: None,
        }
    }
}

#[async_trait]
impl ImageGenerator for FakeImages {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn generate(&self, _params: &ImageGenerationParams) -> Result<Vec<String>, UpstreamError> {
        if !self.configured {
            return Err(UpstreamError::MissingApiKey);
        }
        match &self.failure {
            Some(failure) => Err(failure()),
            None => Ok(self.images.clone()),
        }
    }
}

/// A router wired to an in-memory BosBase and a fake image generator.
pub struct TestApp {
    pub server: TestServer,
    pub store: InMemoryStore,
    config: Config,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_store(InMemoryStore::new())
    }

    pub fn with_store(store: InMemoryStore) -> Self {
        Self::build(create_test_config(), store, FakeImages::returning(vec!["https://img.example.com/default.png"]))
    }

    /// Rebuild the server around a different image generator, keeping the store.
    pub fn with_images(self, images: FakeImages) -> Self {
        Self::build(self.config, self.store, images)
    }

    fn build(config: Config, store: InMemoryStore, images: FakeImages) -> Self {
        let state = AppState::builder()
            .config(config.clone())
            .store(Arc::new(store.clone()))
            .images(Arc::new(images))
            .build();
        let router = build_router(state).expect("Failed to build router");
        let server = TestServer::new(router).expect("Failed to create test server");
        Self { server, store, config }
    }
}
