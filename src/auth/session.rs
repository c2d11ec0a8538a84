//! Refresh-token session store
//!
//! Each outstanding refresh token is backed by one `refresh_tokens` row whose
//! id is the token's `jti` claim. The row is the sole source of revocation
//! truth: deleting it revokes the token immediately, regardless of the
//! token's remaining cryptographic lifetime.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

/// One outstanding refresh-token grant
#[derive(Debug, Serialize, sqlx::FromRow, Clone)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The store could not answer; distinct from "row absent"
#[derive(Error, Debug)]
#[error("Session store unavailable: {0}")]
pub struct SessionStoreError(pub String);

impl From<sqlx::Error> for SessionStoreError {
    fn from(e: sqlx::Error) -> Self {
        SessionStoreError(e.to_string())
    }
}

/// Outcome of the stateful revocation check for a refresh token.
///
/// `StoreUnavailable` is deliberately its own variant rather than an `Err`:
/// the call site must visibly decide what an unanswerable check means, and
/// the refresh gate maps it to rejection (fail closed).
#[derive(Debug)]
pub enum RevocationCheck {
    /// Session row exists and has not expired
    Active(Session),
    /// No matching row: the token has been revoked or rotated away
    Revoked,
    /// The store could not be queried
    StoreUnavailable(SessionStoreError),
}

/// Persistence seam for refresh-token sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new session row and return it. The returned id becomes the
    /// refresh token's `jti`, so this must complete before the token is
    /// signed.
    async fn create(
        &self,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<Session, SessionStoreError>;

    /// Delete a session row. Idempotent: deleting an absent id succeeds.
    async fn delete(&self, id: Uuid) -> Result<(), SessionStoreError>;

    /// Look up a live session by `{id, user_id}`. `Ok(None)` means revoked.
    async fn find(&self, id: Uuid, user_id: Uuid) -> Result<Option<Session>, SessionStoreError>;
}

/// PostgreSQL-backed session store
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(
        &self,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<Session, SessionStoreError> {
        let session: Session = sqlx::query_as(
            r#"
            INSERT INTO refresh_tokens (id, user_id, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, expires_at, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(session)
    }

    async fn delete(&self, id: Uuid) -> Result<(), SessionStoreError> {
        sqlx::query(
            r#"
            DELETE FROM refresh_tokens WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, id: Uuid, user_id: Uuid) -> Result<Option<Session>, SessionStoreError> {
        let session: Option<Session> = sqlx::query_as(
            r#"
            SELECT id, user_id, expires_at, created_at, updated_at
            FROM refresh_tokens
            WHERE id = $1 AND user_id = $2 AND expires_at > NOW()
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }
}

/// In-memory session store for tests and local development
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemorySessionStore {
        sessions: Mutex<HashMap<Uuid, Session>>,
    }

    impl InMemorySessionStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn len(&self) -> usize {
            self.sessions.lock().unwrap().len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        /// All sessions belonging to one user
        pub fn sessions_for(&self, user_id: Uuid) -> Vec<Session> {
            self.sessions
                .lock()
                .unwrap()
                .values()
                .filter(|s| s.user_id == user_id)
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl SessionStore for InMemorySessionStore {
        async fn create(
            &self,
            user_id: Uuid,
            expires_at: DateTime<Utc>,
        ) -> Result<Session, SessionStoreError> {
            let now = Utc::now();
            let session = Session {
                id: Uuid::new_v4(),
                user_id,
                expires_at,
                created_at: now,
                updated_at: now,
            };
            self.sessions
                .lock()
                .unwrap()
                .insert(session.id, session.clone());
            Ok(session)
        }

        async fn delete(&self, id: Uuid) -> Result<(), SessionStoreError> {
            self.sessions.lock().unwrap().remove(&id);
            Ok(())
        }

        async fn find(
            &self,
            id: Uuid,
            user_id: Uuid,
        ) -> Result<Option<Session>, SessionStoreError> {
            Ok(self
                .sessions
                .lock()
                .unwrap()
                .get(&id)
                .filter(|s| s.user_id == user_id && s.expires_at > Utc::now())
                .cloned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::InMemorySessionStore;
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_create_then_find() {
        let store = InMemorySessionStore::new();
        let user_id = Uuid::new_v4();

        let session = store
            .create(user_id, Utc::now() + Duration::days(365))
            .await
            .unwrap();

        let found = store.find(session.id, user_id).await.unwrap();
        assert_eq!(found.unwrap().id, session.id);
    }

    #[tokio::test]
    async fn test_find_scopes_by_user() {
        let store = InMemorySessionStore::new();
        let session = store
            .create(Uuid::new_v4(), Utc::now() + Duration::days(365))
            .await
            .unwrap();

        // Same id, different user: no match
        let found = store.find(session.id, Uuid::new_v4()).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = InMemorySessionStore::new();
        let session = store
            .create(Uuid::new_v4(), Utc::now() + Duration::days(365))
            .await
            .unwrap();

        store.delete(session.id).await.unwrap();
        // Second delete of the same id is not an error
        store.delete(session.id).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_expired_session_is_not_found() {
        let store = InMemorySessionStore::new();
        let user_id = Uuid::new_v4();
        let session = store
            .create(user_id, Utc::now() - Duration::seconds(1))
            .await
            .unwrap();

        assert!(store.find(session.id, user_id).await.unwrap().is_none());
    }
}
