use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

use crate::imagegen::UpstreamError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Authentication required but not provided
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// Invalid request data
    #[error("{message}")]
    BadRequest { message: String },

    /// A required setting is missing; the message is safe to show
    #[error("{message}")]
    Misconfigured { message: String },

    /// The image API failed
    #[error("Upstream error: {message}")]
    Upstream { message: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::Misconfigured { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Upstream { .. } => StatusCode::BAD_GATEWAY,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::BadRequest { message } => message.clone(),
            Error::Misconfigured { message } => message.clone(),
            Error::Upstream { message } => message.clone(),
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Internal { .. } | Error::Other(_) | Error::Misconfigured { .. } => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Upstream { .. } => {
                tracing::warn!("Upstream error: {}", self);
            }
            Error::Unauthenticated { .. } => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::BadRequest { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        (self.status_code(), Json(json!({ "error": self.user_message() }))).into_response()
    }
}

impl From<UpstreamError> for Error {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::InvalidRequest(message) => Error::BadRequest { message },
            UpstreamError::MissingApiKey => Error::Misconfigured {
                message: UpstreamError::MissingApiKey.to_string(),
            },
            UpstreamError::Api { message, .. } => Error::Upstream { message },
            UpstreamError::EmptyResponse => Error::Upstream {
                message: UpstreamError::EmptyResponse.to_string(),
            },
            UpstreamError::Transport(e) => Error::Upstream {
                message: format!("Failed to generate image: {e}"),
            },
        }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
