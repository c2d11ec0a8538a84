//! Token service
//!
//! The only component that touches signing keys. Issues the access/refresh
//! token pair, creates and revokes the session rows backing refresh tokens,
//! and performs the rotate-on-refresh protocol.

use chrono::{Duration, Utc};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::jwt::{self, JwtError};
use super::keys::JwtKeys;
use super::session::{RevocationCheck, Session, SessionStore, SessionStoreError};
use crate::error::ApiError;
use crate::models::Role;

#[derive(Error, Debug)]
pub enum TokenError {
    #[error(transparent)]
    Jwt(#[from] JwtError),

    #[error(transparent)]
    Store(#[from] SessionStoreError),
}

impl From<TokenError> for ApiError {
    fn from(e: TokenError) -> Self {
        // Issuance-side failures (unreadable key, store down) are server
        // faults; the request must fail rather than degrade to a weaker or
        // unsigned token.
        ApiError::Internal(e.to_string())
    }
}

/// A freshly issued access/refresh token pair
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Issues and invalidates tokens. Key material is injected once at
/// construction and immutable thereafter.
#[derive(Clone)]
pub struct TokenService {
    keys: JwtKeys,
    sessions: Arc<dyn SessionStore>,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
}

impl TokenService {
    pub fn new(
        keys: JwtKeys,
        sessions: Arc<dyn SessionStore>,
        access_ttl_seconds: i64,
        refresh_ttl_days: i64,
    ) -> Self {
        Self {
            keys,
            sessions,
            access_ttl_seconds,
            refresh_ttl_seconds: refresh_ttl_days * 24 * 60 * 60,
        }
    }

    /// Key set for the request-time verifiers
    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    /// Sign a stateless access token for `{sub, role}`
    pub fn issue_access_token(&self, user_id: Uuid, role: Role) -> Result<String, TokenError> {
        Ok(jwt::sign_access_token(
            &self.keys,
            user_id,
            role,
            self.access_ttl_seconds,
        )?)
    }

    /// Insert the session row backing a refresh token. Must complete before
    /// the token is signed: the row id becomes the `jti` claim.
    pub async fn create_session(&self, user_id: Uuid) -> Result<Session, TokenError> {
        let expires_at = Utc::now() + Duration::seconds(self.refresh_ttl_seconds);
        Ok(self.sessions.create(user_id, expires_at).await?)
    }

    /// Sign a refresh token bound to an existing session row
    pub fn issue_refresh_token(
        &self,
        user_id: Uuid,
        role: Role,
        session_id: Uuid,
    ) -> Result<String, TokenError> {
        Ok(jwt::sign_refresh_token(
            &self.keys,
            user_id,
            role,
            session_id,
            self.refresh_ttl_seconds,
        )?)
    }

    /// Create a session and sign both tokens for it
    pub async fn issue_pair(&self, user_id: Uuid, role: Role) -> Result<TokenPair, TokenError> {
        let session = self.create_session(user_id).await?;
        let access_token = self.issue_access_token(user_id, role)?;
        let refresh_token = self.issue_refresh_token(user_id, role, session.id)?;

        tracing::debug!(user_id = %user_id, session_id = %session.id, "Issued token pair");

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Rotate a refresh token: issue a replacement pair, then revoke the old
    /// session.
    ///
    /// The new session is created before the old one is revoked, so a crash
    /// between the two store calls leaves the user with two valid sessions
    /// rather than zero. The stale one is rejected at its next refresh.
    pub async fn rotate(
        &self,
        user_id: Uuid,
        role: Role,
        old_session_id: Uuid,
    ) -> Result<TokenPair, TokenError> {
        let pair = self.issue_pair(user_id, role).await?;
        self.revoke_session(old_session_id).await?;

        tracing::info!(user_id = %user_id, revoked = %old_session_id, "Rotated refresh session");

        Ok(pair)
    }

    /// Delete the session row, revoking its refresh token. Idempotent.
    pub async fn revoke_session(&self, session_id: Uuid) -> Result<(), TokenError> {
        Ok(self.sessions.delete(session_id).await?)
    }

    /// Stateful half of refresh-token verification: does the bound session
    /// row still exist for this user?
    pub async fn check_revocation(&self, session_id: Uuid, user_id: Uuid) -> RevocationCheck {
        match self.sessions.find(session_id, user_id).await {
            Ok(Some(session)) => RevocationCheck::Active(session),
            Ok(None) => RevocationCheck::Revoked,
            Err(e) => RevocationCheck::StoreUnavailable(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::verify_refresh_token;
    use crate::auth::session::memory::InMemorySessionStore;
    use async_trait::async_trait;
    use chrono::DateTime;

    const TEST_PRIVATE_PEM: &str = include_str!("../../tests/fixtures/test_private.pem");
    const TEST_PUBLIC_PEM: &str = include_str!("../../tests/fixtures/test_public.pem");

    fn service_with(store: Arc<dyn SessionStore>) -> TokenService {
        let keys = JwtKeys::from_pem(
            TEST_PRIVATE_PEM.as_bytes(),
            TEST_PUBLIC_PEM.as_bytes(),
            b"test-refresh-secret",
        )
        .unwrap();
        TokenService::new(keys, store, 3600, 365)
    }

    /// Store that always fails, for the fail-closed path
    struct DownStore;

    #[async_trait]
    impl SessionStore for DownStore {
        async fn create(
            &self,
            _user_id: Uuid,
            _expires_at: DateTime<Utc>,
        ) -> Result<Session, SessionStoreError> {
            Err(SessionStoreError("connection refused".to_string()))
        }

        async fn delete(&self, _id: Uuid) -> Result<(), SessionStoreError> {
            Err(SessionStoreError("connection refused".to_string()))
        }

        async fn find(
            &self,
            _id: Uuid,
            _user_id: Uuid,
        ) -> Result<Option<Session>, SessionStoreError> {
            Err(SessionStoreError("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_issue_pair_binds_refresh_token_to_session() {
        let store = Arc::new(InMemorySessionStore::new());
        let service = service_with(store.clone());
        let user_id = Uuid::new_v4();

        let pair = service.issue_pair(user_id, Role::Customer).await.unwrap();

        let claims = verify_refresh_token(service.keys(), &pair.refresh_token).unwrap();
        let session_id = claims.session_id().unwrap();

        assert_eq!(store.len(), 1);
        assert!(matches!(
            service.check_revocation(session_id, user_id).await,
            RevocationCheck::Active(_)
        ));
    }

    #[tokio::test]
    async fn test_rotation_replaces_session() {
        let store = Arc::new(InMemorySessionStore::new());
        let service = service_with(store.clone());
        let user_id = Uuid::new_v4();

        let pair = service.issue_pair(user_id, Role::Customer).await.unwrap();
        let old_jti = verify_refresh_token(service.keys(), &pair.refresh_token)
            .unwrap()
            .session_id()
            .unwrap();

        service.rotate(user_id, Role::Customer, old_jti).await.unwrap();

        // Old jti gone, exactly one new session for the same user
        assert!(matches!(
            service.check_revocation(old_jti, user_id).await,
            RevocationCheck::Revoked
        ));
        assert_eq!(store.sessions_for(user_id).len(), 1);
        assert_ne!(store.sessions_for(user_id)[0].id, old_jti);
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let store = Arc::new(InMemorySessionStore::new());
        let service = service_with(store.clone());

        let session = service.create_session(Uuid::new_v4()).await.unwrap();
        service.revoke_session(session.id).await.unwrap();
        service.revoke_session(session.id).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_revoked_session_fails_check_despite_valid_token() {
        let store = Arc::new(InMemorySessionStore::new());
        let service = service_with(store.clone());
        let user_id = Uuid::new_v4();

        let pair = service.issue_pair(user_id, Role::Customer).await.unwrap();
        let claims = verify_refresh_token(service.keys(), &pair.refresh_token).unwrap();
        let jti = claims.session_id().unwrap();

        service.revoke_session(jti).await.unwrap();

        // Signature and expiry still verify; only the stateful check fails
        assert!(verify_refresh_token(service.keys(), &pair.refresh_token).is_ok());
        assert!(matches!(
            service.check_revocation(jti, user_id).await,
            RevocationCheck::Revoked
        ));
    }

    #[tokio::test]
    async fn test_store_outage_reports_unavailable_not_active() {
        let service = service_with(Arc::new(DownStore));

        let check = service
            .check_revocation(Uuid::new_v4(), Uuid::new_v4())
            .await;
        assert!(matches!(check, RevocationCheck::StoreUnavailable(_)));
    }
}
