//! Writing usage events.
//!
//! Every write is preceded by [`Provisioner::ensure_schema`], and every `success` value passes
//! through [`normalize_success`]. If the store still rejects `success = false` because the live
//! schema marks the field as required, the recorder re-runs the provisioner once and, if the
//! field is still required, records `true` instead and logs the event as degraded.

use std::fmt;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{instrument, warn};

use super::normalize::{normalize_success, success_for_write};
use super::provision::{ProvisionError, Provisioner};
use super::schema::{PROMPT_MAX_CHARS, SUCCESS_FIELD, SchemaDescriptor};
use crate::bosbase::{RecordStore, StoreError};

pub const DEFAULT_ENDPOINT: &str = "/api/generate/image";
pub const DEFAULT_METHOD: &str = "POST";

/// Identifier of a stored usage event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EventId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// What is known about a call when it starts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageAttempt {
    pub endpoint: Option<String>,
    pub method: Option<String>,
    pub model: Option<String>,
    pub prompt: Option<String>,
    pub num_images: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// How a call ended. `success` is kept raw so that every writer goes through the normalizer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageOutcome {
    pub success: Option<Value>,
    pub error: Option<String>,
}

impl UsageOutcome {
    pub fn succeeded() -> Self {
        Self {
            success: Some(Value::Bool(true)),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: Some(Value::Bool(false)),
            error: Some(error.into()),
        }
    }

    fn error_message(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }
}

#[derive(Error, Debug)]
pub enum RecordError {
    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error("failed to write usage event: {0}")]
    Store(#[from] StoreError),
}

/// Usage event writer bound to one authenticated store handle.
pub struct UsageRecorder<'a> {
    store: &'a dyn RecordStore,
    provisioner: &'a Provisioner,
    descriptor: SchemaDescriptor<'a>,
}

impl<'a> UsageRecorder<'a> {
    pub fn new(store: &'a dyn RecordStore, provisioner: &'a Provisioner, descriptor: SchemaDescriptor<'a>) -> Self {
        Self {
            store,
            provisioner,
            descriptor,
        }
    }

    /// Record the start of a call with `success = false`.
    pub async fn record_start(&self, attempt: &UsageAttempt) -> Result<EventId, RecordError> {
        self.record_event(attempt, &UsageOutcome::default()).await
    }

    /// Record a call whose outcome may already be known.
    #[instrument(skip_all, fields(collection = self.descriptor.collection), err)]
    pub async fn record_event(&self, attempt: &UsageAttempt, outcome: &UsageOutcome) -> Result<EventId, RecordError> {
        self.provisioner.ensure_schema(self.store, &self.descriptor).await?;

        let success = normalize_success(outcome.success.as_ref());
        let mut body = event_body(attempt);
        body.insert(SUCCESS_FIELD.to_string(), Value::Bool(success));
        if let Some(error) = outcome.error_message() {
            body.insert("error".to_string(), json!(error));
        }
        body.insert("timestamp".to_string(), json!(now_timestamp()));

        let collection = self.descriptor.collection;
        let record = match self.store.create_record(collection, &body).await {
            Err(e) if !success && rejects_success(&e) => {
                self.degrade(&mut body, e).await?;
                self.store.create_record(collection, &body).await?
            }
            other => other?,
        };
        Ok(EventId(record.id))
    }

    /// Overwrite the outcome of a recorded call. Only `success` and `error` are written.
    ///
    /// `error` is never cleared: an outcome without an error message leaves any earlier one in
    /// place, so a success reported after a failure keeps the stale message next to
    /// `success = true`.
    #[instrument(skip_all, fields(collection = self.descriptor.collection, id = %id), err)]
    pub async fn record_outcome(&self, id: &EventId, outcome: &UsageOutcome) -> Result<(), RecordError> {
        self.provisioner.ensure_schema(self.store, &self.descriptor).await?;

        let success = normalize_success(outcome.success.as_ref());
        let mut body = Map::new();
        body.insert(SUCCESS_FIELD.to_string(), Value::Bool(success));
        if let Some(error) = outcome.error_message() {
            body.insert("error".to_string(), json!(error));
        }

        let collection = self.descriptor.collection;
        match self.store.update_record(collection, &id.0, &body).await {
            Err(e) if !success && rejects_success(&e) => {
                self.degrade(&mut body, e).await?;
                self.store.update_record(collection, &id.0, &body).await?;
            }
            other => {
                other?;
            }
        }
        Ok(())
    }

    /// Self-heal the schema once, then decide which `success` value the store will accept.
    async fn degrade(&self, body: &mut Map<String, Value>, rejection: StoreError) -> Result<(), RecordError> {
        warn!(error = %rejection, "Store rejected success=false, re-provisioning collection");
        self.provisioner.ensure_schema(self.store, &self.descriptor).await?;

        let live_required = match self.store.find_collection(self.descriptor.collection).await {
            Ok(live) => live.field(SUCCESS_FIELD).is_some_and(|f| f.required),
            // The store just told us the field is required.
            Err(_) => true,
        };

        let write = success_for_write(false, live_required);
        if write.degraded {
            warn!(
                degraded = true,
                collection = self.descriptor.collection,
                "success is still required in the live schema, recording the failed call as success=true"
            );
        }
        body.insert(SUCCESS_FIELD.to_string(), Value::Bool(write.value));
        Ok(())
    }
}

fn rejects_success(error: &StoreError) -> bool {
    matches!(error, StoreError::BadRequest { .. }) && error.mentions_field(SUCCESS_FIELD)
}

fn event_body(attempt: &UsageAttempt) -> Map<String, Value> {
    let non_empty = |value: &Option<String>| value.as_deref().filter(|v| !v.is_empty()).map(str::to_string);

    let mut body = Map::new();
    body.insert(
        "endpoint".to_string(),
        json!(non_empty(&attempt.endpoint).unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())),
    );
    body.insert(
        "method".to_string(),
        json!(non_empty(&attempt.method).unwrap_or_else(|| DEFAULT_METHOD.to_string())),
    );
    if let Some(model) = non_empty(&attempt.model) {
        body.insert("model".to_string(), json!(model));
    }
    if let Some(prompt) = non_empty(&attempt.prompt) {
        body.insert("prompt".to_string(), json!(truncate_chars(&prompt, PROMPT_MAX_CHARS)));
    }
    for (key, value) in [
        ("numImages", attempt.num_images),
        ("width", attempt.width),
        ("height", attempt.height),
    ] {
        if let Some(value) = value {
            body.insert(key.to_string(), json!(value));
        }
    }
    body
}

/// Cut `text` to at most `max` characters without splitting one.
fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
