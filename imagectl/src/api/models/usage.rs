//! API request/response models for usage tracking.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::usage::{EventId, UsageAttempt, UsageOutcome};

/// Attempt details and, optionally, the outcome of a generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClickMetadata {
    pub model: Option<String>,
    pub prompt: Option<String>,
    pub num_images: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Any JSON value; only `true`, `"true"` and `1` count as success
    #[schema(value_type = Option<Object>)]
    pub success: Option<Value>,
    pub error: Option<String>,
}

impl ClickMetadata {
    pub fn outcome(&self) -> UsageOutcome {
        UsageOutcome {
            success: self.success.clone(),
            error: self.error.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct RecordClickRequest {
    pub endpoint: Option<String>,
    pub method: Option<String>,
    #[serde(default)]
    pub metadata: ClickMetadata,
}

impl RecordClickRequest {
    pub fn attempt(&self) -> UsageAttempt {
        UsageAttempt {
            endpoint: self.endpoint.clone(),
            method: self.method.clone(),
            model: self.metadata.model.clone(),
            prompt: self.metadata.prompt.clone(),
            num_images: self.metadata.num_images,
            width: self.metadata.width,
            height: self.metadata.height,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateClickRequest {
    pub id: Option<String>,
    #[serde(default)]
    pub metadata: ClickMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClickResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub id: Option<EventId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClickResponse {
    pub fn recorded(id: EventId) -> Self {
        Self {
            success: true,
            id: Some(id),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            id: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnsureCollectionResponse {
    pub success: bool,
    pub message: String,
    /// `existing`, `patched` or `created`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
