//! Token issuance, verification, and revocation

pub mod jwt;
pub mod keys;
pub mod service;
pub mod session;

pub use jwt::{verify_access_token, verify_refresh_token, AccessClaims, JwtError, RefreshClaims};
pub use keys::{JwtKeys, KeyError};
pub use service::{TokenError, TokenPair, TokenService};
pub use session::{
    PgSessionStore, RevocationCheck, Session, SessionStore, SessionStoreError,
};
