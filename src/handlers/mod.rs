//! HTTP handlers

pub mod auth;
pub mod tenants;
pub mod users;
