use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Errors returned by the BosBase REST API or while talking to it.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Collection or record does not exist (HTTP 404)
    #[error("not found: {message}")]
    NotFound { message: String },

    /// Request rejected by validation (HTTP 400). `data` carries the per-field errors.
    #[error("bad request: {message}")]
    BadRequest { message: String, data: Value },

    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("forbidden: {message}")]
    Forbidden { message: String },

    /// Any other non-success status
    #[error("store returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The store cannot be reached with the current configuration
    #[error("store misconfigured: {0}")]
    Config(String),

    /// The store did not answer
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Error body shape shared by every BosBase endpoint.
#[derive(Debug, Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Value,
}

impl StoreError {
    /// Build an error from a non-success status and the raw response body.
    pub fn from_response(status: u16, body: &str) -> Self {
        let ErrorBody { message, data } = serde_json::from_str(body).unwrap_or_else(|_| ErrorBody {
            message: body.trim().to_string(),
            data: Value::Null,
        });

        match status {
            400 => StoreError::BadRequest { message, data },
            401 => StoreError::Unauthorized { message },
            403 => StoreError::Forbidden { message },
            404 => StoreError::NotFound { message },
            _ => StoreError::Status { status, message },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// HTTP status the store answered with, if it answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::BadRequest { .. } => Some(400),
            StoreError::Unauthorized { .. } => Some(401),
            StoreError::Forbidden { .. } => Some(403),
            StoreError::NotFound { .. } => Some(404),
            StoreError::Status { status, .. } => Some(*status),
            StoreError::Transport(e) => e.status().map(|s| s.as_u16()),
            StoreError::Config(_) | StoreError::Unavailable(_) | StoreError::Decode(_) => None,
        }
    }

    /// Whether the rejection names `field`, either in the message or in the per-field errors.
    pub fn mentions_field(&self, field: &str) -> bool {
        match self {
            StoreError::BadRequest { message, data } => {
                message.to_lowercase().contains(field) || data.get(field).is_some()
            }
            StoreError::Status { message, .. } => message.to_lowercase().contains(field),
            _ => false,
        }
    }
}
