//! User persistence and credential checks

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use thiserror::Error;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{
    CreateUserRequest, Paginated, Pagination, Role, UpdateUserRequest, User, UserListQuery,
};

const USER_COLUMNS: &str =
    "id, first_name, last_name, email, password, role, tenant_id, created_at, updated_at";

#[derive(Error, Debug)]
pub enum UserError {
    #[error("User with this email already exists")]
    EmailTaken,

    /// Single indistinguishable error for unknown email and wrong password
    #[error("Email or password is incorrect")]
    InvalidCredentials,

    #[error("User not found")]
    NotFound,

    #[error("Tenant is required for the manager role")]
    TenantRequired,

    #[error("Tenant does not exist")]
    TenantMissing,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Password hashing failed: {0}")]
    Hash(String),
}

impl From<sqlx::Error> for UserError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                return UserError::EmailTaken;
            }
            if db.is_foreign_key_violation() {
                return UserError::TenantMissing;
            }
        }
        UserError::Database(e.to_string())
    }
}

impl From<bcrypt::BcryptError> for UserError {
    fn from(e: bcrypt::BcryptError) -> Self {
        UserError::Hash(e.to_string())
    }
}

impl From<UserError> for ApiError {
    fn from(e: UserError) -> Self {
        match e {
            UserError::EmailTaken => ApiError::Conflict(e.to_string()),
            UserError::InvalidCredentials => ApiError::Authentication(e.to_string()),
            UserError::NotFound => ApiError::NotFound(e.to_string()),
            UserError::TenantRequired | UserError::TenantMissing => {
                ApiError::Validation(e.to_string())
            }
            UserError::Database(detail) | UserError::Hash(detail) => ApiError::Internal(detail),
        }
    }
}

/// Resolve the tenant association for a role: required for managers,
/// dropped for admins and customers.
pub fn tenant_for_role(role: Role, tenant_id: Option<Uuid>) -> Result<Option<Uuid>, UserError> {
    match role {
        Role::Manager => tenant_id.map(Some).ok_or(UserError::TenantRequired),
        Role::Admin | Role::Customer => Ok(None),
    }
}

/// Insert payload for the user store. `password` is already the bcrypt hash.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub tenant_id: Option<Uuid>,
}

/// Full field replacement applied by an update
#[derive(Debug, Clone)]
pub struct UserChanges {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
    pub tenant_id: Option<Uuid>,
}

/// Persistence seam for the users table
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: NewUser) -> Result<User, UserError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, UserError>;

    /// `Ok(None)` when the id does not exist
    async fn update(&self, id: Uuid, changes: UserChanges) -> Result<Option<User>, UserError>;

    /// Returns whether a row was removed
    async fn delete(&self, id: Uuid) -> Result<bool, UserError>;

    /// One filtered page plus the total count for the same filters
    async fn list(
        &self,
        query: &UserListQuery,
        pagination: Pagination,
    ) -> Result<(Vec<User>, i64), UserError>;
}

/// PostgreSQL-backed user store
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: NewUser) -> Result<User, UserError> {
        let user: User = sqlx::query_as(&format!(
            r#"
            INSERT INTO users (id, first_name, last_name, email, password, role, tenant_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.password)
        .bind(user.role)
        .bind(user.tenant_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserError> {
        let user: Option<User> = sqlx::query_as(&format!(
            r#"
            SELECT {USER_COLUMNS} FROM users WHERE email = $1
            "#
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, UserError> {
        let user: Option<User> = sqlx::query_as(&format!(
            r#"
            SELECT {USER_COLUMNS} FROM users WHERE id = $1
            "#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> Result<Option<User>, UserError> {
        let user: Option<User> = sqlx::query_as(&format!(
            r#"
            UPDATE users
            SET first_name = $1, last_name = $2, email = $3, role = $4, tenant_id = $5,
                updated_at = NOW()
            WHERE id = $6
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&changes.first_name)
        .bind(&changes.last_name)
        .bind(&changes.email)
        .bind(changes.role)
        .bind(changes.tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Outstanding refresh-token sessions go with the row via the
    /// `ON DELETE CASCADE` foreign key.
    async fn delete(&self, id: Uuid) -> Result<bool, UserError> {
        let rows_affected = sqlx::query(
            r#"
            DELETE FROM users WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(rows_affected > 0)
    }

    async fn list(
        &self,
        query: &UserListQuery,
        pagination: Pagination,
    ) -> Result<(Vec<User>, i64), UserError> {
        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
        push_user_filters(&mut count_qb, query);
        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await?;

        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {USER_COLUMNS} FROM users"));
        push_user_filters(&mut qb, query);
        qb.push(" ORDER BY created_at DESC LIMIT ");
        qb.push_bind(i64::from(pagination.limit));
        qb.push(" OFFSET ");
        qb.push_bind(pagination.offset());

        let data: Vec<User> = qb.build_query_as().fetch_all(&self.pool).await?;

        Ok((data, total))
    }
}

fn push_user_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &UserListQuery) {
    let mut has_where = false;

    if let Some(q) = query.q.as_deref().filter(|q| !q.is_empty()) {
        let pattern = format!("%{}%", q);
        qb.push(" WHERE (first_name || ' ' || last_name ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR email ILIKE ");
        qb.push_bind(pattern);
        qb.push(")");
        has_where = true;
    }

    if let Some(role) = query.role {
        qb.push(if has_where { " AND " } else { " WHERE " });
        qb.push("role = ");
        qb.push_bind(role);
    }
}

/// User operations over an injected store
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// Create a user with a bcrypt-hashed password
    pub async fn create(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
        password: &str,
        role: Role,
        tenant_id: Option<Uuid>,
    ) -> Result<User, UserError> {
        let tenant_id = tenant_for_role(role, tenant_id)?;

        if self.store.find_by_email(email).await?.is_some() {
            return Err(UserError::EmailTaken);
        }

        let hashed = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;

        self.store
            .insert(NewUser {
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                email: email.to_string(),
                password: hashed,
                role,
                tenant_id,
            })
            .await
    }

    pub async fn create_from_request(&self, req: &CreateUserRequest) -> Result<User, UserError> {
        self.create(
            &req.first_name,
            &req.last_name,
            &req.email,
            &req.password,
            req.role,
            req.tenant_id,
        )
        .await
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserError> {
        self.store.find_by_email(email).await
    }

    /// Look up by email and compare the password hash.
    ///
    /// Unknown email and wrong password both return `InvalidCredentials`;
    /// nothing in the result reveals which check failed.
    pub async fn verify_credentials(&self, email: &str, password: &str) -> Result<User, UserError> {
        let user = self
            .store
            .find_by_email(email)
            .await?
            .ok_or(UserError::InvalidCredentials)?;

        let matched = bcrypt::verify(password, &user.password)?;
        if !matched {
            return Err(UserError::InvalidCredentials);
        }

        Ok(user)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<User, UserError> {
        self.store.find_by_id(id).await?.ok_or(UserError::NotFound)
    }

    pub async fn update(&self, id: Uuid, req: &UpdateUserRequest) -> Result<User, UserError> {
        let tenant_id = tenant_for_role(req.role, req.tenant_id)?;

        self.store
            .update(
                id,
                UserChanges {
                    first_name: req.first_name.clone(),
                    last_name: req.last_name.clone(),
                    email: req.email.clone(),
                    role: req.role,
                    tenant_id,
                },
            )
            .await?
            .ok_or(UserError::NotFound)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), UserError> {
        if !self.store.delete(id).await? {
            return Err(UserError::NotFound);
        }
        Ok(())
    }

    /// List users with free-text search over full name and email, exact role
    /// filter, and pagination
    pub async fn list(&self, query: &UserListQuery) -> Result<Paginated<User>, UserError> {
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

/// In-memory user store for tests and local development
pub mod memory {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryUserStore {
        users: Mutex<HashMap<Uuid, User>>,
    }

    impl InMemoryUserStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// All users attached to one tenant
        pub fn users_for_tenant(&self, tenant_id: Uuid) -> Vec<User> {
            self.users
                .lock()
                .unwrap()
                .values()
                .filter(|u| u.tenant_id == Some(tenant_id))
                .cloned()
                .collect()
        }

        /// Remove every user attached to the tenant
        pub fn delete_by_tenant(&self, tenant_id: Uuid) {
            self.users
                .lock()
                .unwrap()
                .retain(|_, u| u.tenant_id != Some(tenant_id));
        }

        /// Null out the tenant association for every attached user
        pub fn detach_tenant(&self, tenant_id: Uuid) {
            for user in self.users.lock().unwrap().values_mut() {
                if user.tenant_id == Some(tenant_id) {
                    user.tenant_id = None;
                    user.updated_at = Utc::now();
                }
            }
        }
    }

    #[async_trait]
    impl UserStore for InMemoryUserStore {
        async fn insert(&self, user: NewUser) -> Result<User, UserError> {
            let mut users = self.users.lock().unwrap();
            if users.values().any(|u| u.email == user.email) {
                return Err(UserError::EmailTaken);
            }

            let now = Utc::now();
            let user = User {
                id: Uuid::new_v4(),
                first_name: user.first_name,
                last_name: user.last_name,
                email: user.email,
                password: user.password,
                role: user.role,
                tenant_id: user.tenant_id,
                created_at: now,
                updated_at: now,
            };
            users.insert(user.id, user.clone());
            Ok(user)
        }

        async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserError> {
            Ok(self
                .users
                .lock()
                .unwrap()
                .values()
                .find(|u| u.email == email)
                .cloned())
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, UserError> {
            Ok(self.users.lock().unwrap().get(&id).cloned())
        }

        async fn update(&self, id: Uuid, changes: UserChanges) -> Result<Option<User>, UserError> {
            let mut users = self.users.lock().unwrap();
            let Some(user) = users.get_mut(&id) else {
                return Ok(None);
            };

            user.first_name = changes.first_name;
            user.last_name = changes.last_name;
            user.email = changes.email;
            user.role = changes.role;
            user.tenant_id = changes.tenant_id;
            user.updated_at = Utc::now();

            Ok(Some(user.clone()))
        }

        async fn delete(&self, id: Uuid) -> Result<bool, UserError> {
            Ok(self.users.lock().unwrap().remove(&id).is_some())
        }

        async fn list(
            &self,
            query: &UserListQuery,
            pagination: Pagination,
        ) -> Result<(Vec<User>, i64), UserError> {
            let users = self.users.lock().unwrap();
            let mut matched: Vec<User> = users
                .values()
                .filter(|u| {
                    let q_ok = query.q.as_deref().filter(|q| !q.is_empty()).map_or(true, |q| {
                        let q = q.to_lowercase();
                        format!("{} {}", u.first_name, u.last_name)
                            .to_lowercase()
                            .contains(&q)
                            || u.email.to_lowercase().contains(&q)
                    });
                    let role_ok = query.role.map_or(true, |r| u.role == r);
                    q_ok && role_ok
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
