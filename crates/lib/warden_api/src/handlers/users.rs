//! User administration handlers.

use axum::Json;
use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use uuid::Uuid;

use crate::AppState;
use crate::error::AppResult;
use crate::models::{ApiResponse, PermissionsResponse};

/// `GET /v1/users/{id}/permissions`: another user's effective permissions.
/// Requires `user:view`.
pub async fn user_permissions_handler(
    State(state): State<AppState>,
    user_id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<ApiResponse<PermissionsResponse>>> {
    let Path(user_id) = user_id?;
    let set = state
        .authority
        .permissions()
        .effective_permissions(user_id)
        .await?;
    Ok(Json(ApiResponse::ok(PermissionsResponse {
        user_id,
        permissions: set.names().into_iter().map(str::to_string).collect(),
    })))
}
