//! JWT session token creation and verification.

use axum::{extract::FromRequestParts, http::request::Parts};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::identity::OAuthProfile;
use crate::{AppState, config::Config, errors::Error};

/// JWT session claims
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SessionClaims {
    pub sub: String,   // Provider account id
    pub email: String, // User email
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Id of the matching record in the users collection, when sync succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_user_id: Option<String>,
    pub exp: i64, // Expiration time
    pub iat: i64, // Issued at
}

impl SessionClaims {
    pub fn new(profile: &OAuthProfile, store_user_id: Option<String>, config: &Config) -> Self {
        let now = Utc::now();
        let exp = now + config.auth.session.expiry;

        Self {
            sub: profile.id.clone(),
            email: profile.email.clone(),
            name: profile.name.clone(),
            image: profile.image.clone(),
            store_user_id,
            exp: exp.timestamp(),
            iat: now.timestamp(),
        }
    }
}

fn secret_key(config: &Config) -> Result<&str, Error> {
    config.secret_key.as_deref().ok_or_else(|| Error::Internal {
        operation: "JWT sessions: secret_key is required".to_string(),
    })
}

/// Create a JWT token for a user session
pub fn create_session_token(claims: &SessionClaims, config: &Config) -> Result<String, Error> {
    let key = EncodingKey::from_secret(secret_key(config)?.as_bytes());
    encode(&Header::default(), claims, &key).map_err(|e| Error::Internal {
        operation: format!("create JWT: {e}"),
    })
}

/// Verify and decode a JWT session token
pub fn verify_session_token(token: &str, config: &Config) -> Result<SessionClaims, Error> {
    let key = DecodingKey::from_secret(secret_key(config)?.as_bytes());
    let validation = Validation::default();

    let token_data = decode::<SessionClaims>(token, &key, &validation).map_err(|e| match e.kind() {
        // Client errors (401) - malformed tokens, invalid claims, expired tokens
        jsonwebtoken::errors::ErrorKind::InvalidToken
        | jsonwebtoken::errors::ErrorKind::InvalidSignature
        | jsonwebtoken::errors::ErrorKind::ExpiredSignature
        | jsonwebtoken::errors::ErrorKind::MissingRequiredClaim(_)
        | jsonwebtoken::errors::ErrorKind::InvalidIssuer
        | jsonwebtoken::errors::ErrorKind::InvalidAudience
        | jsonwebtoken::errors::ErrorKind::InvalidSubject
        | jsonwebtoken::errors::ErrorKind::ImmatureSignature
        | jsonwebtoken::errors::ErrorKind::Base64(_)
        | jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => Error::Unauthenticated { message: None },

        // Server errors (500) - key issues, internal failures
        jsonwebtoken::errors::ErrorKind::InvalidEcdsaKey
        | jsonwebtoken::errors::ErrorKind::InvalidRsaKey(_)
        | jsonwebtoken::errors::ErrorKind::RsaFailedSigning
        | jsonwebtoken::errors::ErrorKind::InvalidAlgorithmName
        | jsonwebtoken::errors::ErrorKind::InvalidKeyFormat
        | jsonwebtoken::errors::ErrorKind::MissingAlgorithm
        | jsonwebtoken::errors::ErrorKind::Json(_)
        | jsonwebtoken::errors::ErrorKind::Utf8(_)
        | jsonwebtoken::errors::ErrorKind::Crypto(_) => Error::Internal {
            operation: format!("JWT verification: {e}"),
        },

        _ => Error::Internal {
            operation: format!("JWT verification (unknown error): {e}"),
        },
    })?;

    Ok(token_data.claims)
}

/// `Set-Cookie` value carrying a session token.
pub fn session_cookie(token: &str, config: &Config) -> String {
    let session = &config.auth.session;
    format!(
        "{}={}; Path=/; HttpOnly{}; SameSite={}; Max-Age={}",
        session.cookie_name,
        token,
        secure_attribute(config),
        session.cookie_same_site,
        session.expiry.as_secs()
    )
}

/// `Set-Cookie` value that clears the session.
pub fn expired_session_cookie(config: &Config) -> String {
    let session = &config.auth.session;
    format!(
        "{}=; Path=/; HttpOnly{}; SameSite={}; Max-Age=0",
        session.cookie_name,
        secure_attribute(config),
        session.cookie_same_site
    )
}

// Browsers treat any `Secure` attribute as set, whatever its value
fn secure_attribute(config: &Config) -> &'static str {
    if config.auth.session.cookie_secure { "; Secure" } else { "" }
}

/// Find a named cookie in a `Cookie` header value.
fn find_cookie<'a>(cookie_header: &'a str, cookie_name: &str) -> Option<&'a str> {
    cookie_header
        .split(';')
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

impl FromRequestParts<AppState> for SessionClaims {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let cookie_header = parts
            .headers
            .get(axum::http::header::COOKIE)
            .and_then(|h| h.to_str().ok())
            .ok_or(Error::Unauthenticated { message: None })?;

        let token =
            find_cookie(cookie_header, &state.config.auth.session.cookie_name).ok_or(Error::Unauthenticated { message: None })?;

        verify_session_token(token, &state.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn create_test_config() -> Config {
        let mut config = Config {
            secret_key: Some("test-secret-key-for-jwt".to_string()),
            ..Default::default()
        };
        config.auth.session.expiry = Duration::from_secs(3600);
        config
    }

    fn profile() -> OAuthProfile {
        OAuthProfile {
            id: "109876543210".to_string(),
            email: "ada@example.com".to_string(),
            name: Some("Ada".to_string()),
            image: None,
        }
    }

    #[test]
    fn test_create_and_verify_session_token() {
        let config = create_test_config();
        let claims = SessionClaims::new(&profile(), Some("u_1".to_string()), &config);

        let token = create_session_token(&claims, &config).unwrap();
        let verified = verify_session_token(&token, &config).unwrap();

        assert_eq!(verified, claims);
        assert_eq!(verified.exp - verified.iat, 3600);
    }

    #[test]
    fn test_verify_token_wrong_secret() {
        let mut config = create_test_config();
        let token = create_session_token(&SessionClaims::new(&profile(), None, &config), &config).unwrap();

        config.secret_key = Some("different-secret".to_string());
        let result = verify_session_token(&token, &config);
        assert!(matches!(result.unwrap_err(), Error::Unauthenticated { .. }));
    }

    #[test]
    fn test_verify_expired_token() {
        let config = create_test_config();
        let mut claims = SessionClaims::new(&profile(), None, &config);
        claims.iat -= 7200;
        claims.exp = Utc::now().timestamp() - 3600;

        let token = create_session_token(&claims, &config).unwrap();
        let result = verify_session_token(&token, &config);
        assert!(matches!(result.unwrap_err(), Error::Unauthenticated { .. }));
    }

    #[test]
    fn test_missing_secret_is_internal() {
        let config = Config::default();
        let claims = SessionClaims::new(&profile(), None, &config);
        assert!(matches!(create_session_token(&claims, &config), Err(Error::Internal { .. })));
    }

    #[test]
    fn test_cookies() {
        let config = create_test_config();
        assert_eq!(
            session_cookie("abc", &config),
            "imagectl_session=abc; Path=/; HttpOnly; Secure; SameSite=lax; Max-Age=3600"
        );
        assert!(expired_session_cookie(&config).starts_with("imagectl_session=;"));
        assert!(expired_session_cookie(&config).ends_with("Max-Age=0"));

        assert_eq!(find_cookie("theme=dark; imagectl_session=tok", "imagectl_session"), Some("tok"));
        assert_eq!(find_cookie("imagectl_session=", "imagectl_session"), None);
        assert_eq!(find_cookie("other=1", "imagectl_session"), None);
    }

    #[test]
    fn test_insecure_cookies_omit_secure_attribute() {
        let mut config = create_test_config();
        config.auth.session.cookie_secure = false;

        for cookie in [session_cookie("tok", &config), expired_session_cookie(&config)] {
            let has_secure = cookie
                .split(';')
                .map(|attr| attr.trim().split('=').next().unwrap_or_default())
                .any(|name| name.eq_ignore_ascii_case("secure"));
            assert!(!has_secure, "unexpected Secure attribute in {cookie}");
        }
        assert_eq!(
            session_cookie("tok", &config),
            "imagectl_session=tok; Path=/; HttpOnly; SameSite=lax; Max-Age=3600"
        );
    }
}
