//! Application error type and its HTTP rendering.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;
use warden_core::AuthError;

use crate::models::ErrorBody;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Any failure a handler can return. Rendered as
/// `{"success": false, "code": ..., "error": ...}`.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct AppError(#[from] pub AuthError);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError(AuthError::ValidationFailed(rejection.body_text()))
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError(AuthError::ValidationFailed(rejection.body_text()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(code = self.0.code(), error = %self.0, "request failed");
        }
        let body = Json(ErrorBody {
            success: false,
            code: self.0.code().to_string(),
            error: self.0.public_message(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn render(err: AuthError) -> (StatusCode, serde_json::Value) {
        let resp = AppError(err).into_response();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn status_classes() {
        for (err, status) in [
            (AuthError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (AuthError::PermissionDenied, StatusCode::FORBIDDEN),
            (AuthError::EntitlementRequired, StatusCode::PAYMENT_REQUIRED),
            (AuthError::ValidationFailed("email is required".into()), StatusCode::BAD_REQUEST),
            (AuthError::DuplicateEmail, StatusCode::CONFLICT),
            (AuthError::PersistenceUnavailable, StatusCode::INTERNAL_SERVER_ERROR),
        ] {
            assert_eq!(render(err).await.0, status);
        }
    }

    #[tokio::test]
    async fn internal_detail_is_not_rendered() {
        let (_, json) = render(AuthError::Internal("argon2 exploded at 0xdeadbeef".into())).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Internal error");
        assert!(!json.to_string().contains("deadbeef"));
    }

    #[tokio::test]
    async fn validation_message_is_rendered() {
        let (_, json) = render(AuthError::ValidationFailed("email is required".into())).await;
        assert_eq!(json["code"], "VALIDATION_FAILED");
        assert_eq!(json["error"], "email is required");
    }
}
