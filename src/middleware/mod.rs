//! Request-time middleware
//!
//! The access-token and refresh-token gates plus request logging and
//! security headers.

pub mod auth;
mod logging;
pub mod refresh;
mod security;

pub use auth::{AdminUser, AuthenticatedUser, ACCESS_TOKEN_COOKIE};
pub use logging::request_logging;
pub use refresh::{RefreshGuard, REFRESH_TOKEN_COOKIE};
pub use security::security_headers;
