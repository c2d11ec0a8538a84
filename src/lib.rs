//! Multi-tenant authentication and user-management service
//!
//! Issues short-lived RS256 access tokens and long-lived HS256 refresh
//! tokens backed by revocable session rows, with role-based CRUD for users
//! and tenants on top.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

use axum::routing::get;
use axum::Router;

use state::AppState;

/// Assemble the full application router
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health_check))
        .merge(routes::auth_routes())
        .merge(routes::user_routes())
        .merge(routes::tenant_routes())
        .with_state(state)
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(axum::middleware::from_fn(middleware::request_logging))
}
