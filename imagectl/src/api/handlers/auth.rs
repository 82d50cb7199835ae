use axum::{Json, extract::State};
use tracing::{info, warn};

use crate::{
    AppState,
    api::models::auth::{ClearSessionResponse, SessionResponse, SignInResponse, SignOutResponse},
    auth::{
        OAuthProfile, SessionClaims,
        session::{create_session_token, expired_session_cookie, session_cookie},
        sync_user,
    },
    errors::Error,
};

/// Mirror the profile into BosBase. Failures are logged and never block sign-in.
async fn sync_profile(state: &AppState, profile: &OAuthProfile) -> Option<String> {
    let store = match state.store.connect().await {
        Ok(store) => store,
        Err(e) => {
            warn!("Skipping user sync, store unavailable: {}", e);
            return None;
        }
    };
    sync_user(store.as_ref(), &state.config.bosbase.users_collection, profile)
        .await
        .inspect_err(|e| warn!("User sync failed: {}", e))
        .ok()
}

/// Start a session for the identity forwarded by the auth proxy
#[utoipa::path(
    post,
    path = "/api/auth/sign-in",
    tag = "authentication",
    responses(
        (status = 200, description = "Signed in", body = SessionResponse),
        (status = 401, description = "No identity forwarded by the proxy"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn sign_in(State(state): State<AppState>, profile: OAuthProfile) -> Result<SignInResponse, Error> {
    let store_user_id = sync_profile(&state, &profile).await;

    let claims = SessionClaims::new(&profile, store_user_id, &state.config);
    let token = create_session_token(&claims, &state.config)?;
    let cookie = session_cookie(&token, &state.config);
    info!(email = %profile.email, synced = claims.store_user_id.is_some(), "User signed in");

    Ok(SignInResponse {
        session: claims.into(),
        cookie,
    })
}

/// Current session
#[utoipa::path(
    get,
    path = "/api/auth/session",
    tag = "authentication",
    responses(
        (status = 200, description = "Active session", body = SessionResponse),
        (status = 401, description = "No valid session cookie"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_session(claims: SessionClaims) -> Json<SessionResponse> {
    Json(claims.into())
}

/// Sign out (clear session)
#[utoipa::path(
    post,
    path = "/api/auth/sign-out",
    tag = "authentication",
    responses(
        (status = 200, description = "Signed out", body = SignOutResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn sign_out(State(state): State<AppState>) -> ClearSessionResponse {
    ClearSessionResponse {
        body: SignOutResponse {
            message: "Signed out".to_string(),
        },
        cookie: expired_session_cookie(&state.config),
    }
}
