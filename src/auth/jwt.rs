//! JWT signing and verification
//!
//! Two token kinds with two signing schemes: short-lived access tokens are
//! RS256 (verifiable with the public key alone) and long-lived refresh tokens
//! are HS256 with their `jti` bound to a session row. Both carry the service
//! issuer claim, which is enforced on verification.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::keys::JwtKeys;
use crate::models::Role;

/// Issuer claim stamped into every token
pub const ISSUER: &str = "auth-service";

#[derive(Error, Debug)]
pub enum JwtError {
    #[error("Token signing failed: {0}")]
    Signing(String),

    #[error("Token expired")]
    Expired,

    #[error("Invalid token: {0}")]
    Invalid(String),
}

/// Claims carried by an access token
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AccessClaims {
    /// Subject (user id)
    pub sub: String,
    pub role: Role,
    pub iss: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

/// Claims carried by a refresh token
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RefreshClaims {
    /// Subject (user id)
    pub sub: String,
    pub role: Role,
    /// Session identifier this token is bound to
    pub jti: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

impl AccessClaims {
    pub fn user_id(&self) -> Result<Uuid, JwtError> {
        Uuid::parse_str(&self.sub).map_err(|e| JwtError::Invalid(e.to_string()))
    }
}

impl RefreshClaims {
    pub fn user_id(&self) -> Result<Uuid, JwtError> {
        Uuid::parse_str(&self.sub).map_err(|e| JwtError::Invalid(e.to_string()))
    }

    pub fn session_id(&self) -> Result<Uuid, JwtError> {
        Uuid::parse_str(&self.jti).map_err(|e| JwtError::Invalid(e.to_string()))
    }
}

/// Sign an access token with the RSA private key
pub fn sign_access_token(
    keys: &JwtKeys,
    user_id: Uuid,
    role: Role,
    ttl_seconds: i64,
) -> Result<String, JwtError> {
    let now = Utc::now();
    let claims = AccessClaims {
        sub: user_id.to_string(),
        role,
        iss: ISSUER.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::seconds(ttl_seconds)).timestamp(),
    };

    encode(
        &Header::new(Algorithm::RS256),
        &claims,
        &keys.access_encoding,
    )
    .map_err(|e| JwtError::Signing(e.to_string()))
}

/// Sign a refresh token with the shared secret, bound to a session id
pub fn sign_refresh_token(
    keys: &JwtKeys,
    user_id: Uuid,
    role: Role,
    session_id: Uuid,
    ttl_seconds: i64,
) -> Result<String, JwtError> {
    let now = Utc::now();
    let claims = RefreshClaims {
        sub: user_id.to_string(),
        role,
        jti: session_id.to_string(),
        iss: ISSUER.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::seconds(ttl_seconds)).timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &keys.refresh_encoding,
    )
    .map_err(|e| JwtError::Signing(e.to_string()))
}

/// Verify an access token against the public key
pub fn verify_access_token(keys: &JwtKeys, token: &str) -> Result<AccessClaims, JwtError> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_issuer(&[ISSUER]);

    decode::<AccessClaims>(token, &keys.access_decoding, &validation)
        .map(|data| data.claims)
        .map_err(map_decode_error)
}

/// Verify a refresh token against the shared secret (stateless stage only;
/// the revocation check against the session store happens separately)
pub fn verify_refresh_token(keys: &JwtKeys, token: &str) -> Result<RefreshClaims, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);

    decode::<RefreshClaims>(token, &keys.refresh_decoding, &validation)
        .map(|data| data.claims)
        .map_err(map_decode_error)
}

fn map_decode_error(e: jsonwebtoken::errors::Error) -> JwtError {
    match e.kind() {
        ErrorKind::ExpiredSignature => JwtError::Expired,
        _ => JwtError::Invalid(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_PRIVATE_PEM: &str = include_str!("../../tests/fixtures/test_private.pem");
    const TEST_PUBLIC_PEM: &str = include_str!("../../tests/fixtures/test_public.pem");

    fn test_keys() -> JwtKeys {
        JwtKeys::from_pem(
            TEST_PRIVATE_PEM.as_bytes(),
            TEST_PUBLIC_PEM.as_bytes(),
            b"test-refresh-secret",
        )
        .unwrap()
    }

    #[test]
    fn test_access_token_round_trip() {
        let keys = test_keys();
        let user_id = Uuid::new_v4();

        let token = sign_access_token(&keys, user_id, Role::Customer, 3600).unwrap();
        let claims = verify_access_token(&keys, &token).unwrap();

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.role, Role::Customer);
        assert_eq!(claims.iss, ISSUER);
        assert_eq!(claims.user_id().unwrap(), user_id);
    }

    #[test]
    fn test_expired_access_token_is_rejected() {
        let keys = test_keys();

        // Past the default 60s validation leeway
        let token = sign_access_token(&keys, Uuid::new_v4(), Role::Admin, -120).unwrap();
        let err = verify_access_token(&keys, &token).unwrap_err();
        assert!(matches!(err, JwtError::Expired));
    }

    #[test]
    fn test_refresh_token_round_trip_carries_jti() {
        let keys = test_keys();
        let user_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();

        let token =
            sign_refresh_token(&keys, user_id, Role::Manager, session_id, 3600).unwrap();
        let claims = verify_refresh_token(&keys, &token).unwrap();

        assert_eq!(claims.session_id().unwrap(), session_id);
        assert_eq!(claims.user_id().unwrap(), user_id);
        assert_eq!(claims.role, Role::Manager);
    }

    #[test]
    fn test_tokens_do_not_cross_verify() {
        let keys = test_keys();
        let user_id = Uuid::new_v4();

        // An access token must not pass the refresh verifier and vice versa:
        // different algorithms, different keys.
        let access = sign_access_token(&keys, user_id, Role::Customer, 3600).unwrap();
        assert!(verify_refresh_token(&keys, &access).is_err());

        let refresh =
            sign_refresh_token(&keys, user_id, Role::Customer, Uuid::new_v4(), 3600).unwrap();
        assert!(verify_access_token(&keys, &refresh).is_err());
    }

    #[test]
    fn test_wrong_refresh_secret_is_rejected() {
        let keys = test_keys();
        let other = JwtKeys::from_pem(
            TEST_PRIVATE_PEM.as_bytes(),
            TEST_PUBLIC_PEM.as_bytes(),
            b"a-different-secret",
        )
        .unwrap();

        let token =
            sign_refresh_token(&keys, Uuid::new_v4(), Role::Customer, Uuid::new_v4(), 3600)
                .unwrap();
        assert!(verify_refresh_token(&other, &token).is_err());
    }

    #[test]
    fn test_garbage_token_is_invalid() {
        let keys = test_keys();
        assert!(matches!(
            verify_access_token(&keys, "not.a.token"),
            Err(JwtError::Invalid(_))
        ));
    }
}
