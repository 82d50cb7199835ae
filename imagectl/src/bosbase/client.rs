//! reqwest-backed [`RecordStore`] talking to a live BosBase instance.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, header::AUTHORIZATION};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};
use url::Url;

use super::errors::StoreError;
use super::models::{Collection, CollectionPatch, ListQuery, ListResult, Record};
use super::store::{RecordStore, StoreConnector};
use crate::config::BosBaseConfig;

/// Logs in as a superuser on every [`StoreConnector::connect`] call.
#[derive(Debug, Clone)]
pub struct BosBaseConnector {
    http: Client,
    base_url: Url,
    admin_email: String,
    admin_password: Option<String>,
}

impl BosBaseConnector {
    pub fn new(config: &BosBaseConfig) -> Result<Self, StoreError> {
        let http = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            http,
            base_url: config.url.clone(),
            admin_email: config.admin_email.clone(),
            admin_password: config.admin_password.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    token: String,
}

#[async_trait]
impl StoreConnector for BosBaseConnector {
    #[instrument(skip(self), fields(base_url = %self.base_url), err)]
    async fn connect(&self) -> Result<Arc<dyn RecordStore>, StoreError> {
        if self.admin_email.is_empty() {
            return Err(StoreError::Config("admin email is not set".to_string()));
        }
        let password = self
            .admin_password
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| StoreError::Config("admin password is not set".to_string()))?;

        let url = endpoint(&self.base_url, &["api", "collections", "_superusers", "auth-with-password"])?;
        let response = self
            .http
            .post(url)
            .json(&json!({ "identity": self.admin_email, "password": password }))
            .send()
            .await?;
        let auth: AuthResponse = read_json(response).await?;
        debug!("Authenticated against BosBase as superuser");

        Ok(Arc::new(BosBaseClient {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            token: auth.token,
        }))
    }
}

/// A superuser-authenticated BosBase handle.
#[derive(Debug, Clone)]
pub struct BosBaseClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl BosBaseClient {
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, StoreError> {
        let response = request.header(AUTHORIZATION, &self.token).send().await?;
        read_json(response).await
    }
}

#[async_trait]
impl RecordStore for BosBaseClient {
    #[instrument(skip(self), err(level = "debug"))]
    async fn list_records(&self, collection: &str, query: &ListQuery) -> Result<ListResult<Record>, StoreError> {
        let url = endpoint(&self.base_url, &["api", "collections", collection, "records"])?;
        self.send(self.http.get(url).query(&query.to_pairs())).await
    }

    #[instrument(skip(self, body), err(level = "debug"))]
    async fn create_record(&self, collection: &str, body: &Map<String, Value>) -> Result<Record, StoreError> {
        let url = endpoint(&self.base_url, &["api", "collections", collection, "records"])?;
        self.send(self.http.post(url).json(body)).await
    }

    #[instrument(skip(self, body), err(level = "debug"))]
    async fn update_record(&self, collection: &str, id: &str, body: &Map<String, Value>) -> Result<Record, StoreError> {
        let url = endpoint(&self.base_url, &["api", "collections", collection, "records", id])?;
        self.send(self.http.patch(url).json(body)).await
    }

    #[instrument(skip(self), err(level = "debug"))]
    async fn list_collections(&self, query: &ListQuery) -> Result<ListResult<Collection>, StoreError> {
        let url = endpoint(&self.base_url, &["api", "collections"])?;
        self.send(self.http.get(url).query(&query.to_pairs())).await
    }

    #[instrument(skip(self, collection), fields(name = %collection.name), err(level = "debug"))]
    async fn create_collection(&self, collection: &Collection) -> Result<Collection, StoreError> {
        let url = endpoint(&self.base_url, &["api", "collections"])?;
        self.send(self.http.post(url).json(collection)).await
    }

    #[instrument(skip(self, patch), err(level = "debug"))]
    async fn update_collection(&self, id: &str, patch: &CollectionPatch) -> Result<Collection, StoreError> {
        let url = endpoint(&self.base_url, &["api", "collections", id])?;
        self.send(self.http.patch(url).json(patch)).await
    }
}

/// Append path segments to the base url, percent-encoding each one.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, StoreError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| StoreError::Config(format!("{base} cannot be used as a base url")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, StoreError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(StoreError::from_response(status.as_u16(), &body));
    }
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}
