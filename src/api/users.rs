//! User management endpoints. All routes here are admin-gated by the
//! router, so handlers only deal with the operation itself.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::Claims;
use crate::db::UserResponse;
use crate::AppState;

use super::error::ApiError;
use super::validation;

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateNameRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// GET /api/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let users = state.auth.list_users().await?;
    Ok(Json(users))
}

/// PUT /api/users/:id/role
pub async fn update_role(
    State(state): State<Arc<AppState>>,
    claims: Claims,
    Path(id): Path<String>,
    Json(request): Json<UpdateRoleRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .auth
        .update_user_role(&claims, &id, &request.role)
        .await?;
    Ok(Json(MessageResponse {
        message: "Role updated".to_string(),
    }))
}

/// PUT /api/users/:id/name
pub async fn update_name(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<UpdateNameRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if let Err(e) = validation::validate_name(&request.name) {
        return Err(ApiError::validation_field("name", e));
    }
    state.auth.update_user_name(&id, &request.name).await?;
    Ok(Json(MessageResponse {
        message: "Name updated".to_string(),
    }))
}

/// DELETE /api/users/:id
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    claims: Claims,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.auth.delete_user(&claims, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
