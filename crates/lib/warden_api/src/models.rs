//! Request and response bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warden_core::models::auth::{IssuedSession, UserIdentity};

/// Success envelope: `{"success": true, "data": ...}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Failure envelope.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub code: String,
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub session_id: Uuid,
    pub token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub expires_in: i64,
    pub issuer: String,
    pub audience: String,
}

impl From<IssuedSession> for TokenResponse {
    fn from(s: IssuedSession) -> Self {
        Self {
            session_id: s.session_id,
            token: s.token,
            token_type: s.token_type,
            expires_at: s.expires_at,
            expires_in: s.expires_in,
            issuer: s.issuer,
            audience: s.audience,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: Uuid,
    pub email: String,
    pub session_id: Option<Uuid>,
}

impl From<UserIdentity> for MeResponse {
    fn from(who: UserIdentity) -> Self {
        Self {
            id: who.user_id,
            email: who.email,
            session_id: who.session_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PermissionsResponse {
    pub user_id: Uuid,
    /// Sorted by name.
    pub permissions: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub revoked: u64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
