//! API request/response models for sign-in.

use axum::{
    Json,
    http::header,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::SessionClaims;

/// The signed-in user, as stored in the session cookie.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Id of the BosBase user record, absent when syncing failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_user_id: Option<String>,
    /// Unix timestamp at which the session expires
    pub expires_at: i64,
}

impl From<SessionClaims> for SessionResponse {
    fn from(claims: SessionClaims) -> Self {
        Self {
            id: claims.sub,
            email: claims.email,
            name: claims.name,
            image: claims.image,
            store_user_id: claims.store_user_id,
            expires_at: claims.exp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SignOutResponse {
    pub message: String,
}

/// Session payload plus the cookie that carries it
pub struct SignInResponse {
    pub session: SessionResponse,
    pub cookie: String,
}

impl IntoResponse for SignInResponse {
    fn into_response(self) -> Response {
        ([(header::SET_COOKIE, self.cookie)], Json(self.session)).into_response()
    }
}

/// Sign-out message plus the expired cookie that clears the session
pub struct ClearSessionResponse {
    pub body: SignOutResponse,
    pub cookie: String,
}

impl IntoResponse for ClearSessionResponse {
    fn into_response(self) -> Response {
        ([(header::SET_COOKIE, self.cookie)], Json(self.body)).into_response()
    }
}
