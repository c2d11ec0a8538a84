//! Refresh-token gate
//!
//! Two-stage verification for the `/auth/refresh` and `/auth/logout` routes:
//! first the stateless check (HS256 signature, expiry, issuer), then the
//! stateful revocation check against the session store. A token whose session
//! row is gone is rejected even though its signature is still valid for up to
//! a year; that is what makes logout and rotation irreversible. If the store
//! cannot be queried the token is treated as revoked (fail closed).

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::cookie::CookieJar;
use uuid::Uuid;

use crate::auth::{verify_refresh_token, JwtError, RevocationCheck};
use crate::error::ApiError;
use crate::models::Role;
use crate::state::AppState;

/// Cookie carrying the refresh token
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// Verified refresh-token identity, available to the refresh/logout handlers
#[derive(Debug, Clone)]
pub struct RefreshGuard {
    pub user_id: Uuid,
    pub role: Role,
    /// Session row id, needed to revoke on rotation/logout
    pub session_id: Uuid,
}

#[async_trait]
impl<S> FromRequestParts<S> for RefreshGuard
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let jar = CookieJar::from_headers(&parts.headers);

        let token = jar
            .get(REFRESH_TOKEN_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .ok_or_else(|| ApiError::Authentication("Refresh token missing".to_string()))?;

        // Stage 1: stateless — signature, expiry, issuer
        let claims =
            verify_refresh_token(state.token_service.keys(), &token).map_err(|e| match e {
                JwtError::Expired => ApiError::Authentication("Token has expired".to_string()),
                _ => ApiError::Authentication("Invalid refresh token".to_string()),
            })?;

        let user_id = claims
            .user_id()
            .map_err(|_| ApiError::Authentication("Invalid refresh token".to_string()))?;
        let session_id = claims
            .session_id()
            .map_err(|_| ApiError::Authentication("Invalid refresh token".to_string()))?;

        // Stage 2: stateful — the session row must still exist
        match state.token_service.check_revocation(session_id, user_id).await {
            RevocationCheck::Active(_) => Ok(RefreshGuard {
                user_id,
                role: claims.role,
                session_id,
            }),
            RevocationCheck::Revoked => Err(ApiError::Authentication(
                "Refresh token has been revoked".to_string(),
            )),
            RevocationCheck::StoreUnavailable(e) => {
                // Fail closed: an unanswerable check never admits a token
                tracing::error!(session_id = %session_id, error = %e, "Session store lookup failed during refresh validation");
                Err(ApiError::Authentication(
                    "Refresh token has been revoked".to_string(),
                ))
            }
        }
    }
}
