//! Tenant persistence
//!
//! Plain CRUD plus the cascading delete, which is all-or-nothing: read the
//! tenant, delete or detach its users, delete the tenant. The Postgres store
//! runs it as one transaction (rolled back on drop if not committed); every
//! store implementation must uphold the same contract.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use thiserror::Error;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{Paginated, Pagination, Tenant, TenantListQuery, TenantRequest};

const TENANT_COLUMNS: &str = "id, name, address, created_at, updated_at";

#[derive(Error, Debug)]
pub enum TenantError {
    #[error("Tenant not found")]
    NotFound,

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for TenantError {
    fn from(e: sqlx::Error) -> Self {
        TenantError::Database(e.to_string())
    }
}

impl From<TenantError> for ApiError {
    fn from(e: TenantError) -> Self {
        match e {
            TenantError::NotFound => ApiError::NotFound(e.to_string()),
            TenantError::Database(detail) => ApiError::Internal(detail),
        }
    }
}

/// Persistence seam for the tenants table
#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn insert(&self, name: &str, address: &str) -> Result<Tenant, TenantError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Tenant>, TenantError>;

    /// `Ok(None)` when the id does not exist
    async fn update(
        &self,
        id: Uuid,
        name: &str,
        address: &str,
    ) -> Result<Option<Tenant>, TenantError>;

    /// Delete the tenant, deleting (`delete_managers`) or detaching its users
    /// in the same atomic unit. Returns false when the tenant does not exist;
    /// a failure must leave no partial effect behind.
    async fn delete(&self, id: Uuid, delete_managers: bool) -> Result<bool, TenantError>;

    /// One filtered page plus the total count for the same filter
    async fn list(
        &self,
        query: &TenantListQuery,
        pagination: Pagination,
    ) -> Result<(Vec<Tenant>, i64), TenantError>;
}

/// PostgreSQL-backed tenant store
#[derive(Clone)]
pub struct PgTenantStore {
    pool: PgPool,
}

impl PgTenantStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantStore for PgTenantStore {
    async fn insert(&self, name: &str, address: &str) -> Result<Tenant, TenantError> {
        let tenant: Tenant = sqlx::query_as(&format!(
            r#"
            INSERT INTO tenants (id, name, address)
            VALUES ($1, $2, $3)
            RETURNING {TENANT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(address)
        .fetch_one(&self.pool)
        .await?;

        Ok(tenant)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Tenant>, TenantError> {
        let tenant: Option<Tenant> = sqlx::query_as(&format!(
            r#"
            SELECT {TENANT_COLUMNS} FROM tenants WHERE id = $1
            "#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(tenant)
    }

    async fn update(
        &self,
        id: Uuid,
        name: &str,
        address: &str,
    ) -> Result<Option<Tenant>, TenantError> {
        let tenant: Option<Tenant> = sqlx::query_as(&format!(
            r#"
            UPDATE tenants
            SET name = $1, address = $2, updated_at = NOW()
            WHERE id = $3
            RETURNING {TENANT_COLUMNS}
            "#
        ))
        .bind(name)
        .bind(address)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(tenant)
    }

    async fn delete(&self, id: Uuid, delete_managers: bool) -> Result<bool, TenantError> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM tenants WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        if exists.is_none() {
            return Ok(false);
        }

        if delete_managers {
            sqlx::query(
                r#"
                DELETE FROM users WHERE tenant_id = $1
                "#,
            )
            .bind(id)
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query(
                r#"
                UPDATE users SET tenant_id = NULL, updated_at = NOW() WHERE tenant_id = $1
                "#,
            )
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            DELETE FROM tenants WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(true)
    }

    async fn list(
        &self,
        query: &TenantListQuery,
        pagination: Pagination,
    ) -> Result<(Vec<Tenant>, i64), TenantError> {
        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM tenants");
        push_tenant_filters(&mut count_qb, query);
        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await?;

        let mut qb =
            QueryBuilder::<Postgres>::new(format!("SELECT {TENANT_COLUMNS} FROM tenants"));
        push_tenant_filters(&mut qb, query);
        qb.push(" ORDER BY created_at DESC LIMIT ");
        qb.push_bind(i64::from(pagination.limit));
        qb.push(" OFFSET ");
        qb.push_bind(pagination.offset());

        let data: Vec<Tenant> = qb.build_query_as().fetch_all(&self.pool).await?;

        Ok((data, total))
    }
}

fn push_tenant_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &TenantListQuery) {
    if let Some(q) = query.q.as_deref().filter(|q| !q.is_empty()) {
        let pattern = format!("%{}%", q);
        qb.push(" WHERE (name ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR address ILIKE ");
        qb.push_bind(pattern);
        qb.push(")");
    }
}

/// Tenant operations over an injected store
#[derive(Clone)]
pub struct TenantService {
    store: Arc<dyn TenantStore>,
}

impl TenantService {
    pub fn new(store: Arc<dyn TenantStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, req: &TenantRequest) -> Result<Tenant, TenantError> {
        self.store.insert(&req.name, &req.address).await
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Tenant, TenantError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(TenantError::NotFound)
    }

    pub async fn update(&self, id: Uuid, req: &TenantRequest) -> Result<Tenant, TenantError> {
        self.store
            .update(id, &req.name, &req.address)
            .await?
            .ok_or(TenantError::NotFound)
    }

    /// Delete a tenant. With `delete_managers` its manager users are deleted
    /// in the same atomic unit; otherwise they are detached (tenant_id set to
    /// null) so the foreign key never blocks the delete.
    pub async fn delete(&self, id: Uuid, delete_managers: bool) -> Result<(), TenantError> {
        if !self.store.delete(id, delete_managers).await? {
            return Err(TenantError::NotFound);
        }

        tracing::info!(tenant_id = %id, delete_managers, "Tenant deleted");

        Ok(())
    }

    /// List tenants with free-text search over name and address
    pub async fn list(&self, query: &TenantListQuery) -> Result<Paginated<Tenant>, TenantError> {
        let pagination = Pagination::new(query.page, query.limit);
        let (data, total) = self.store.list(query, pagination).await?;

        Ok(Paginated {
            data,
            total,
            page: pagination.page,
            limit: pagination.limit,
        })
    }
}

/// In-memory tenant store for tests and local development
pub mod memory {
    use super::*;
    use crate::services::users::memory::InMemoryUserStore;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// In-memory tenant store. Sharing a user store lets the delete cascade
    /// and detach operate on real user records.
    #[derive(Default)]
    pub struct InMemoryTenantStore {
        tenants: Mutex<HashMap<Uuid, Tenant>>,
        users: Option<Arc<InMemoryUserStore>>,
        fail_deletes: AtomicBool,
    }

    impl InMemoryTenantStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_users(users: Arc<InMemoryUserStore>) -> Self {
            Self {
                users: Some(users),
                ..Self::default()
            }
        }

        /// Make subsequent deletes fail before any effect is applied,
        /// simulating a transaction that never commits
        pub fn set_fail_deletes(&self, fail: bool) {
            self.fail_deletes.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl TenantStore for InMemoryTenantStore {
        async fn insert(&self, name: &str, address: &str) -> Result<Tenant, TenantError> {
            let now = Utc::now();
            let tenant = Tenant {
                id: Uuid::new_v4(),
                name: name.to_string(),
                address: address.to_string(),
                created_at: now,
                updated_at: now,
            };
            self.tenants
                .lock()
                .unwrap()
                .insert(tenant.id, tenant.clone());
            Ok(tenant)
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<Tenant>, TenantError> {
            Ok(self.tenants.lock().unwrap().get(&id).cloned())
        }

        async fn update(
            &self,
            id: Uuid,
            name: &str,
            address: &str,
        ) -> Result<Option<Tenant>, TenantError> {
            let mut tenants = self.tenants.lock().unwrap();
            let Some(tenant) = tenants.get_mut(&id) else {
                return Ok(None);
            };

            tenant.name = name.to_string();
            tenant.address = address.to_string();
            tenant.updated_at = Utc::now();

            Ok(Some(tenant.clone()))
        }

        async fn delete(&self, id: Uuid, delete_managers: bool) -> Result<bool, TenantError> {
            // Fails before touching anything, mirroring a rolled-back
            // transaction
            if self.fail_deletes.load(Ordering::SeqCst) {
                return Err(TenantError::Database("store offline".to_string()));
            }

            let mut tenants = self.tenants.lock().unwrap();
            if !tenants.contains_key(&id) {
                return Ok(false);
            }

            if let Some(users) = &self.users {
                if delete_managers {
                    users.delete_by_tenant(id);
                } else {
                    users.detach_tenant(id);
                }
            }

            tenants.remove(&id);
            Ok(true)
        }

        async fn list(
            &self,
            query: &TenantListQuery,
            pagination: Pagination,
        ) -> Result<(Vec<Tenant>, i64), TenantError> {
            let tenants = self.tenants.lock().unwrap();
            let mut matched: Vec<Tenant> = tenants
                .values()
                .filter(|t| {
                    query.q.as_deref().filter(|q| !q.is_empty()).map_or(true, |q| {
                        let q = q.to_lowercase();
                        t.name.to_lowercase().contains(&q)
                            || t.address.to_lowercase().contains(&q)
                    })
                })
                .cloned()
                .collect();

            matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            let total = matched.len() as i64;
            let page = matched
                .into_iter()
                .skip(pagination.offset() as usize)
                .take(pagination.limit as usize)
                .collect();

            Ok((page, total))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::InMemoryTenantStore;
    use super::*;
    use crate::models::Role;
    use crate::services::users::memory::InMemoryUserStore;
    use crate::services::users::UserService;

    fn tenant_req(name: &str) -> TenantRequest {
        TenantRequest {
            name: name.to_string(),
            address: "1 Main St".to_string(),
        }
    }

    struct Fixture {
        tenants: TenantService,
        users: UserService,
        user_store: Arc<InMemoryUserStore>,
        tenant_store: Arc<InMemoryTenantStore>,
    }

    fn fixture() -> Fixture {
        let user_store = Arc::new(InMemoryUserStore::new());
        let tenant_store = Arc::new(InMemoryTenantStore::with_users(user_store.clone()));
        Fixture {
            tenants: TenantService::new(tenant_store.clone()),
            users: UserService::new(user_store.clone()),
            user_store,
            tenant_store,
        }
    }

    async fn seed_managers(f: &Fixture, tenant_id: Uuid, emails: &[&str]) {
        for email in emails {
            f.users
                .create("M", "Anager", email, "Secret@123", Role::Manager, Some(tenant_id))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_delete_with_managers_removes_them_and_the_tenant() {
        let f = fixture();
        let tenant = f.tenants.create(&tenant_req("Acme")).await.unwrap();
        seed_managers(&f, tenant.id, &["m1@acme.com", "m2@acme.com"]).await;
        assert_eq!(f.user_store.users_for_tenant(tenant.id).len(), 2);

        f.tenants.delete(tenant.id, true).await.unwrap();

        // Tenant and both manager rows are gone
        assert!(matches!(
            f.tenants.get_by_id(tenant.id).await,
            Err(TenantError::NotFound)
        ));
        assert!(f.user_store.users_for_tenant(tenant.id).is_empty());
        assert!(f.users.find_by_email("m1@acme.com").await.unwrap().is_none());

        // Retrying the delete reports the tenant as missing
        assert!(matches!(
            f.tenants.delete(tenant.id, true).await,
            Err(TenantError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_delete_without_flag_detaches_managers() {
        let f = fixture();
        let tenant = f.tenants.create(&tenant_req("Acme")).await.unwrap();
        seed_managers(&f, tenant.id, &["m1@acme.com"]).await;

        f.tenants.delete(tenant.id, false).await.unwrap();

        // The manager survives with its tenant association nulled
        let user = f.users.find_by_email("m1@acme.com").await.unwrap().unwrap();
        assert_eq!(user.tenant_id, None);
        assert!(f.user_store.users_for_tenant(tenant.id).is_empty());
    }

    #[tokio::test]
    async fn test_failed_delete_leaves_everything_in_place() {
        let f = fixture();
        let tenant = f.tenants.create(&tenant_req("Acme")).await.unwrap();
        seed_managers(&f, tenant.id, &["m1@acme.com"]).await;

        f.tenant_store.set_fail_deletes(true);
        assert!(f.tenants.delete(tenant.id, true).await.is_err());

        // No partial effect: tenant and manager both untouched
        assert!(f.tenants.get_by_id(tenant.id).await.is_ok());
        assert_eq!(f.user_store.users_for_tenant(tenant.id).len(), 1);

        f.tenant_store.set_fail_deletes(false);
        f.tenants.delete(tenant.id, true).await.unwrap();
    }

    #[test]
    fn test_tenant_error_status_mapping() {
        use axum::http::StatusCode;

        let e: ApiError = TenantError::NotFound.into();
        assert_eq!(e.status_code(), StatusCode::NOT_FOUND);

        let e: ApiError = TenantError::Database("down".to_string()).into();
        assert_eq!(e.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
