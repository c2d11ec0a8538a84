//! Tenant management handlers
//!
//! Mutations are admin only; reads need any authenticated user.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::error::ApiResult;
use crate::middleware::{AdminUser, AuthenticatedUser};
use crate::models::{
    DeleteTenantQuery, IdResponse, Paginated, Tenant, TenantListQuery, TenantRequest,
};
use crate::state::AppState;

/// POST /tenant
pub async fn create_tenant(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(req): Json<TenantRequest>,
) -> ApiResult<(StatusCode, Json<IdResponse>)> {
    req.validate()?;

    let tenant = state.tenants.create(&req).await?;

    tracing::info!(tenant_id = %tenant.id, created_by = %admin.user_id, "Tenant created");

    Ok((StatusCode::CREATED, Json(IdResponse { id: tenant.id })))
}

/// GET /tenant - Paginated list with search
pub async fn list_tenants(
    State(state): State<AppState>,
    _auth: AuthenticatedUser,
    Query(query): Query<TenantListQuery>,
) -> ApiResult<Json<Paginated<Tenant>>> {
    let tenants = state.tenants.list(&query).await?;
    Ok(Json(tenants))
}

/// GET /tenant/:id
pub async fn get_tenant(
    State(state): State<AppState>,
    _auth: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Tenant>> {
    let tenant = state.tenants.get_by_id(id).await?;
    Ok(Json(tenant))
}

/// PUT /tenant/:id
pub async fn update_tenant(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Path(id): Path<Uuid>,
    Json(req): Json<TenantRequest>,
) -> ApiResult<Json<Tenant>> {
    req.validate()?;

    let tenant = state.tenants.update(id, &req).await?;
    Ok(Json(tenant))
}

/// DELETE /tenant/:id?deleteManagers=true
///
/// With the flag set, the tenant's manager users are deleted in the same
/// transaction as the tenant row.
pub async fn delete_tenant(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Query(query): Query<DeleteTenantQuery>,
) -> ApiResult<Json<IdResponse>> {
    state.tenants.delete(id, query.delete_managers).await?;

    tracing::info!(tenant_id = %id, deleted_by = %admin.user_id, "Tenant deleted");

    Ok(Json(IdResponse { id }))
}
