//! Access-token gate
//!
//! Extractors that verify the inbound access token before a handler runs.
//! The token is taken from the `Authorization: Bearer` header when it is
//! well-formed, falling back to the `accessToken` cookie. Verification is
//! signature (RSA public key), expiry, and issuer; any failure rejects the
//! request with 401.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use axum_extra::extract::cookie::CookieJar;
use uuid::Uuid;

use crate::auth::{verify_access_token, JwtError};
use crate::error::ApiError;
use crate::models::Role;
use crate::state::AppState;

/// Cookie carrying the access token
pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";

/// Decoded identity attached to the request after the gate passes
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthenticatedUser {
    /// Authorization check for role-gated routes
    pub fn require_role(&self, allowed: &[Role]) -> Result<(), ApiError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(ApiError::Authorization(
                "You are not authorized to access this resource".to_string(),
            ))
        }
    }
}

/// Pick the access token out of a request.
///
/// A well-formed `Bearer <nonempty>` header wins over the cookie; a malformed
/// header falls through to the cookie rather than rejecting outright.
pub fn extract_access_token(headers: &HeaderMap, jar: &CookieJar) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            let mut parts = value.split_whitespace();
            if let (Some("Bearer"), Some(token)) = (parts.next(), parts.next()) {
                if !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }

    jar.get(ACCESS_TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_string())
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let jar = CookieJar::from_headers(&parts.headers);

        let token = extract_access_token(&parts.headers, &jar)
            .ok_or_else(|| ApiError::Authentication("Access token missing".to_string()))?;

        let claims =
            verify_access_token(state.token_service.keys(), &token).map_err(|e| match e {
                JwtError::Expired => ApiError::Authentication("Token has expired".to_string()),
                _ => ApiError::Authentication("Invalid access token".to_string()),
            })?;

        let user_id = claims
            .user_id()
            .map_err(|_| ApiError::Authentication("Invalid access token".to_string()))?;

        Ok(AuthenticatedUser {
            user_id,
            role: claims.role,
        })
    }
}

/// Extractor that additionally requires the admin role
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthenticatedUser);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        user.require_role(&[Role::Admin])?;
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with_auth(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    fn jar_with_cookie(token: &str) -> CookieJar {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("{}={}", ACCESS_TOKEN_COOKIE, token)).unwrap(),
        );
        CookieJar::from_headers(&headers)
    }

    #[test]
    fn test_bearer_header_wins_over_cookie() {
        let headers = headers_with_auth("Bearer header-token");
        let jar = jar_with_cookie("cookie-token");

        assert_eq!(
            extract_access_token(&headers, &jar),
            Some("header-token".to_string())
        );
    }

    #[test]
    fn test_malformed_header_falls_back_to_cookie() {
        let jar = jar_with_cookie("cookie-token");

        // Bare "Bearer" with no token
        let headers = headers_with_auth("Bearer");
        assert_eq!(
            extract_access_token(&headers, &jar),
            Some("cookie-token".to_string())
        );

        // Wrong scheme
        let headers = headers_with_auth("Basic dXNlcjpwYXNz");
        assert_eq!(
            extract_access_token(&headers, &jar),
            Some("cookie-token".to_string())
        );
    }

    #[test]
    fn test_no_token_anywhere() {
        let headers = HeaderMap::new();
        let jar = CookieJar::new();
        assert_eq!(extract_access_token(&headers, &jar), None);
    }

    #[test]
    fn test_require_role() {
        let user = AuthenticatedUser {
            user_id: Uuid::new_v4(),
            role: Role::Manager,
        };

        assert!(user.require_role(&[Role::Admin, Role::Manager]).is_ok());
        assert!(matches!(
            user.require_role(&[Role::Admin]),
            Err(ApiError::Authorization(_))
        ));
    }
}
