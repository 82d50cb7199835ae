//! Identity forwarded by the authenticating reverse proxy.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};
use serde::{Deserialize, Serialize};
use tracing::{instrument, trace};
use utoipa::ToSchema;

use crate::{
    AppState,
    config::ProxyHeaderAuthConfig,
    errors::{Error, Result},
};

/// The signed-in user as reported by the OAuth provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OAuthProfile {
    /// Provider account id (the Google subject)
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl OAuthProfile {
    /// Read the profile from proxy headers. The email header is mandatory; the user id falls
    /// back to the email when the proxy does not send one.
    pub fn from_headers(headers: &HeaderMap, config: &ProxyHeaderAuthConfig) -> Option<Self> {
        let email = header_value(headers, &config.email_header)?;
        let id = header_value(headers, &config.user_id_header).unwrap_or_else(|| email.clone());
        Some(Self {
            id,
            email,
            name: header_value(headers, &config.name_header),
            image: header_value(headers, &config.image_header),
        })
    }
}

impl FromRequestParts<AppState> for OAuthProfile {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let config = &state.config.auth.proxy_header;
        if !config.enabled {
            return Err(Error::Unauthenticated {
                message: Some("Proxy header authentication is disabled".to_string()),
            });
        }

        let profile = OAuthProfile::from_headers(&parts.headers, config).ok_or(Error::Unauthenticated {
            message: Some("Missing identity headers".to_string()),
        })?;
        trace!(email = %profile.email, "Identity forwarded by proxy");
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_profile_from_headers() {
        let config = ProxyHeaderAuthConfig::default();
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-user", HeaderValue::from_static("1122334455"));
        headers.insert("x-forwarded-email", HeaderValue::from_static("ada@example.com"));
        headers.insert("x-forwarded-preferred-username", HeaderValue::from_static("Ada"));
        headers.insert("x-forwarded-avatar", HeaderValue::from_static(" "));

        let profile = OAuthProfile::from_headers(&headers, &config).unwrap();
        assert_eq!(profile.id, "1122334455");
        assert_eq!(profile.email, "ada@example.com");
        assert_eq!(profile.name.as_deref(), Some("Ada"));
        assert_eq!(profile.image, None);
    }

    #[test]
    fn test_email_is_required_and_doubles_as_id() {
        let config = ProxyHeaderAuthConfig::default();
        let mut headers = HeaderMap::new();
        assert!(OAuthProfile::from_headers(&headers, &config).is_none());

        headers.insert("x-forwarded-email", HeaderValue::from_static("ada@example.com"));
        let profile = OAuthProfile::from_headers(&headers, &config).unwrap();
        assert_eq!(profile.id, "ada@example.com");
    }
}
