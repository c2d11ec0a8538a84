//! Domain services over the user and tenant tables

pub mod tenants;
pub mod users;

pub use tenants::{PgTenantStore, TenantError, TenantService, TenantStore};
pub use users::{PgUserStore, UserError, UserService, UserStore};
