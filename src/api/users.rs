//! Admin user management. Every route in here sits behind the admin
//! middleware, so handlers can assume the caller is an authenticated admin.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_sessions::Session;

use super::{ApiError, ApiResponse, AppState, UserStats, auth::current_principal};
use crate::db::UserPatch;
use crate::services::{Principal, Role};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub role: Option<String>,
    pub avatar: Option<String>,
}

/// GET /api/admin/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<Principal>>>, ApiError> {
    let users = state.store().list_users().await?;
    let principals: Vec<Principal> = users.into_iter().map(Principal::from).collect();
    Ok(Json(ApiResponse::success(principals)))
}

/// GET /api/admin/users/{id}
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<Principal>>, ApiError> {
    let user = state
        .store()
        .get_user(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User", id))?;

    Ok(Json(ApiResponse::success(Principal::from(user))))
}

/// PUT /api/admin/users/{id}
/// Partial update of name, role and avatar. Admins can change anyone's role
/// except their own, so a lone admin cannot demote themselves out of the
/// admin area.
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<ApiResponse<Principal>>, ApiError> {
    let caller = current_principal(&state, &session).await?;

    let target = state
        .store()
        .get_user(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User", id))?;

    let role = match payload.role.as_deref() {
        Some(raw) => {
            let role: Role = raw
                .parse()
                .map_err(|_| ApiError::validation(format!("Invalid role: {raw}")))?;
            if caller.id == id && role.as_str() != target.role {
                return Err(ApiError::validation("You cannot change your own role"));
            }
            Some(role.as_str().to_string())
        }
        None => None,
    };

    if let Some(name) = payload.name.as_deref()
        && name.trim().is_empty()
    {
        return Err(ApiError::validation("Name cannot be empty"));
    }

    let patch = UserPatch {
        name: payload.name,
        role,
        avatar: payload.avatar,
    };

    if patch.is_empty() {
        return Err(ApiError::validation("No fields to update"));
    }

    let updated = state
        .store()
        .update_user(id, patch)
        .await?
        .ok_or_else(|| ApiError::not_found("User", id))?;

    tracing::info!(user_id = id, admin_id = caller.id, "User updated by admin");

    Ok(Json(ApiResponse::success(Principal::from(updated))))
}

/// GET /api/admin/stats
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<UserStats>>, ApiError> {
    let users = state.store().list_users().await?;

    let mut by_role: BTreeMap<String, usize> = BTreeMap::new();
    for user in &users {
        *by_role.entry(user.role.clone()).or_insert(0) += 1;
    }

    Ok(Json(ApiResponse::success(UserStats {
        total: users.len(),
        by_role,
    })))
}
