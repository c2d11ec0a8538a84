//! Authentication HTTP handlers
//!
//! register, login, self, refresh, logout. Tokens travel as secure, http-only,
//! same-site-strict cookies; the response body carries only the user id.

use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde_json::{json, Value};
use validator::Validate;

use crate::auth::TokenPair;
use crate::error::{ApiError, ApiResult};
use crate::middleware::{
    AuthenticatedUser, RefreshGuard, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE,
};
use crate::models::{IdResponse, LoginRequest, RegisterRequest, Role, User};
use crate::services::UserError;
use crate::state::AppState;

fn auth_cookie(name: &'static str, value: String, max_age_seconds: i64) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);
    cookie.set_http_only(true);
    cookie.set_secure(true);
    cookie.set_same_site(SameSite::Strict);
    cookie.set_path("/");
    cookie.set_max_age(time::Duration::seconds(max_age_seconds));
    cookie
}

/// Set both token cookies on the jar
fn with_token_cookies(jar: CookieJar, state: &AppState, pair: &TokenPair) -> CookieJar {
    jar.add(auth_cookie(
        ACCESS_TOKEN_COOKIE,
        pair.access_token.clone(),
        state.access_token_ttl_seconds,
    ))
    .add(auth_cookie(
        REFRESH_TOKEN_COOKIE,
        pair.refresh_token.clone(),
        state.refresh_token_ttl_seconds,
    ))
}

/// Expire both token cookies
fn without_token_cookies(jar: CookieJar) -> CookieJar {
    let mut access = Cookie::from(ACCESS_TOKEN_COOKIE);
    access.set_path("/");
    let mut refresh = Cookie::from(REFRESH_TOKEN_COOKIE);
    refresh.set_path("/");
    jar.remove(access).remove(refresh)
}

/// POST /auth/register - Create a customer account and sign in
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, CookieJar, Json<IdResponse>)> {
    req.validate()?;

    let user = state
        .users
        .create(
            &req.first_name,
            &req.last_name,
            &req.email,
            &req.password,
            Role::Customer,
            None,
        )
        .await?;

    tracing::info!(user_id = %user.id, "User registered");

    let pair = state.token_service.issue_pair(user.id, user.role).await?;
    let jar = with_token_cookies(jar, &state, &pair);

    Ok((
        StatusCode::CREATED,
        jar,
        Json(IdResponse { id: user.id }),
    ))
}

/// POST /auth/login - Verify credentials and sign in
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> ApiResult<(CookieJar, Json<IdResponse>)> {
    req.validate()?;

    let user = state.users.verify_credentials(&req.email, &req.password).await?;

    tracing::info!(user_id = %user.id, "User logged in");

    let pair = state.token_service.issue_pair(user.id, user.role).await?;
    let jar = with_token_cookies(jar, &state, &pair);

    Ok((jar, Json(IdResponse { id: user.id })))
}

/// GET /auth/self - Current user's profile, password redacted
pub async fn self_profile(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> ApiResult<Json<User>> {
    let user = state.users.get_by_id(auth.user_id).await?;
    Ok(Json(user))
}

/// GET /auth/refresh - Rotate the refresh session and reissue both tokens
///
/// The refresh gate has already verified the token and its session row, so
/// `guard` holds `{sub, role, jti}`. The new session is created before the
/// old one is revoked.
pub async fn refresh(
    State(state): State<AppState>,
    guard: RefreshGuard,
    jar: CookieJar,
) -> ApiResult<(CookieJar, Json<IdResponse>)> {
    // The user may have been deleted since the token was issued
    let user = state
        .users
        .get_by_id(guard.user_id)
        .await
        .map_err(|e| match e {
            UserError::NotFound => {
                ApiError::Authentication("Invalid refresh token".to_string())
            }
            other => other.into(),
        })?;

    let pair = state
        .token_service
        .rotate(user.id, user.role, guard.session_id)
        .await?;
    let jar = with_token_cookies(jar, &state, &pair);

    Ok((jar, Json(IdResponse { id: user.id })))
}

/// POST /auth/logout - Revoke the session and clear both cookies
///
/// Requires both gates: a valid access token and a valid, unrevoked refresh
/// token.
pub async fn logout(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    guard: RefreshGuard,
    jar: CookieJar,
) -> ApiResult<(CookieJar, Json<Value>)> {
    state.token_service.revoke_session(guard.session_id).await?;

    tracing::info!(user_id = %auth.user_id, session_id = %guard.session_id, "User logged out");

    Ok((without_token_cookies(jar), Json(json!({}))))
}
