//! Authentication request handlers.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use warden_core::AuthError;
use warden_core::auth::guard::extract_bearer;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::guard::AuthenticatedUser;
use crate::models::{
    ApiResponse, LoginRequest, LogoutResponse, MeResponse, PermissionsResponse, RegisterRequest,
    TokenResponse, UserResponse,
};

/// Header consulted when the login body carries no device id.
pub const DEVICE_ID_HEADER: &str = "x-device-id";

const DEFAULT_DEVICE_ID: &str = "default";

/// `POST /v1/auth/register`: create a user account.
pub async fn register_handler(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<ApiResponse<UserResponse>>)> {
    let Json(body) = body?;
    let who = state
        .authority
        .sessions()
        .register(&body.email, &body.password)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(UserResponse {
            id: who.user_id,
            email: who.email,
        })),
    ))
}

/// `POST /v1/auth/login`: authenticate and issue a session.
pub async fn login_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<TokenResponse>>> {
    let Json(body) = body?;
    let device_id = body
        .device_id
        .or_else(|| {
            headers
                .get(DEVICE_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_else(|| DEFAULT_DEVICE_ID.to_string());

    let (_, issued) = state
        .authority
        .sessions()
        .login(&body.email, &body.password, &device_id)
        .await?;
    Ok(Json(ApiResponse::ok(issued.into())))
}

/// `POST /v1/auth/refresh`: exchange the presented bearer token for a new
/// one. The old token stops working.
pub async fn refresh_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<ApiResponse<TokenResponse>>> {
    let token = extract_bearer(headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()))
        .ok_or(AuthError::Unauthenticated)?;
    let issued = state.authority.sessions().rotate_session(token).await?;
    Ok(Json(ApiResponse::ok(issued.into())))
}

/// `POST /v1/auth/logout`: revoke the caller's session.
pub async fn logout_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(who)): Extension<AuthenticatedUser>,
) -> AppResult<Json<ApiResponse<LogoutResponse>>> {
    let session_id = who.session_id.ok_or(AuthError::Unauthenticated)?;
    state.authority.sessions().revoke_session(session_id).await?;
    Ok(Json(ApiResponse::ok(LogoutResponse { revoked: 1 })))
}

/// `POST /v1/auth/logout-all`: revoke every session of the caller.
pub async fn logout_all_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(who)): Extension<AuthenticatedUser>,
) -> AppResult<Json<ApiResponse<LogoutResponse>>> {
    let revoked = state
        .authority
        .sessions()
        .revoke_all_for_user(who.user_id)
        .await?;
    Ok(Json(ApiResponse::ok(LogoutResponse { revoked })))
}

/// `GET /v1/auth/me`: the caller's identity.
pub async fn me_handler(
    Extension(AuthenticatedUser(who)): Extension<AuthenticatedUser>,
) -> Json<ApiResponse<MeResponse>> {
    Json(ApiResponse::ok(who.into()))
}

/// `GET /v1/auth/me/permissions`: the caller's effective permissions.
pub async fn my_permissions_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(who)): Extension<AuthenticatedUser>,
) -> AppResult<Json<ApiResponse<PermissionsResponse>>> {
    let set = state
        .authority
        .permissions()
        .effective_permissions(who.user_id)
        .await?;
    Ok(Json(ApiResponse::ok(PermissionsResponse {
        user_id: who.user_id,
        permissions: set.names().into_iter().map(str::to_string).collect(),
    })))
}
