//! User management handlers (admin only)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::error::ApiResult;
use crate::middleware::AdminUser;
use crate::models::{
    CreateUserRequest, IdResponse, Paginated, UpdateUserRequest, User, UserListQuery,
};
use crate::state::AppState;

/// POST /users - Create a user with an explicit role
pub async fn create_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<IdResponse>)> {
    req.validate()?;

    let user = state.users.create_from_request(&req).await?;

    tracing::info!(user_id = %user.id, created_by = %admin.user_id, role = user.role.as_str(), "User created");

    Ok((StatusCode::CREATED, Json(IdResponse { id: user.id })))
}

/// GET /users - Paginated list with search and role filter
pub async fn list_users(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Query(query): Query<UserListQuery>,
) -> ApiResult<Json<Paginated<User>>> {
    let users = state.users.list(&query).await?;
    Ok(Json(users))
}

/// GET /users/:id
pub async fn get_user(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<User>> {
    let user = state.users.get_by_id(id).await?;
    Ok(Json(user))
}

/// PUT /users/:id
pub async fn update_user(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> ApiResult<Json<User>> {
    req.validate()?;

    let user = state.users.update(id, &req).await?;
    Ok(Json(user))
}

/// DELETE /users/:id - Outstanding sessions are cascaded away with the row
pub async fn delete_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<IdResponse>> {
    state.users.delete(id).await?;

    tracing::info!(user_id = %id, deleted_by = %admin.user_id, "User deleted");

    Ok(Json(IdResponse { id }))
}
