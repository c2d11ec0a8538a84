//! Shared application state

use sqlx::PgPool;
use std::sync::Arc;

use crate::auth::TokenService;
use crate::config::Config;
use crate::services::{TenantService, UserService};

/// State threaded through every handler and extractor
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub token_service: Arc<TokenService>,
    pub users: UserService,
    pub tenants: TenantService,
    /// Cookie max-age for `accessToken`
    pub access_token_ttl_seconds: i64,
    /// Cookie max-age for `refreshToken`
    pub refresh_token_ttl_seconds: i64,
}

impl AppState {
    pub fn new(
        config: &Config,
        pool: PgPool,
        token_service: TokenService,
        users: UserService,
        tenants: TenantService,
    ) -> Self {
        Self {
            pool,
            token_service: Arc::new(token_service),
            users,
            tenants,
            access_token_ttl_seconds: config.access_token_ttl_seconds,
            refresh_token_ttl_seconds: config.refresh_token_ttl_days * 24 * 60 * 60,
        }
    }
}
