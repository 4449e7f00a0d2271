//! Authentication and authorization logic.
//!
//! Password hashing, session token lifecycle, permission evaluation and the
//! guard, shared by every transport that fronts the authority.

pub mod catalog;
pub mod guard;
pub mod hooks;
pub mod password;
pub mod permissions;
pub mod session;
pub mod token;

use thiserror::Error;

/// Authentication and authorization failures.
///
/// Each kind has a stable public code, an HTTP-equivalent status class and a
/// message that is safe to show to clients. Internal detail is only reported
/// through hooks and logs.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Salt generation failed")]
    SaltGenerationFailed,

    #[error("Invalid salt encoding")]
    InvalidSaltEncoding,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Session expired")]
    SessionExpired,

    #[error("Session revoked")]
    SessionRevoked,

    #[error("Unauthenticated")]
    Unauthenticated,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Entitlement required")]
    EntitlementRequired,

    #[error("Persistence unavailable")]
    PersistenceUnavailable,

    #[error("Validation error: {0}")]
    ValidationFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::SaltGenerationFailed => "SALT_GENERATION_FAILED",
            AuthError::InvalidSaltEncoding => "INVALID_SALT_ENCODING",
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::DuplicateEmail => "DUPLICATE_EMAIL",
            AuthError::SessionNotFound => "SESSION_NOT_FOUND",
            AuthError::SessionExpired => "SESSION_EXPIRED",
            AuthError::SessionRevoked => "SESSION_REVOKED",
            AuthError::Unauthenticated => "UNAUTHENTICATED",
            AuthError::PermissionDenied => "PERMISSION_DENIED",
            AuthError::EntitlementRequired => "ENTITLEMENT_REQUIRED",
            AuthError::PersistenceUnavailable => "PERSISTENCE_UNAVAILABLE",
            AuthError::ValidationFailed(_) => "VALIDATION_FAILED",
            AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP-equivalent status class.
    pub fn status(&self) -> u16 {
        match self {
            AuthError::InvalidCredentials
            | AuthError::SessionNotFound
            | AuthError::SessionExpired
            | AuthError::SessionRevoked
            | AuthError::Unauthenticated => 401,
            AuthError::EntitlementRequired => 402,
            AuthError::PermissionDenied => 403,
            AuthError::DuplicateEmail => 409,
            AuthError::ValidationFailed(_) => 400,
            AuthError::SaltGenerationFailed
            | AuthError::InvalidSaltEncoding
            | AuthError::PersistenceUnavailable
            | AuthError::Internal(_) => 500,
        }
    }

    /// Message safe to return to a client.
    pub fn public_message(&self) -> String {
        match self {
            AuthError::InvalidCredentials => "Invalid credentials".into(),
            AuthError::SessionNotFound
            | AuthError::SessionExpired
            | AuthError::SessionRevoked
            | AuthError::Unauthenticated => "Unauthorized".into(),
            AuthError::PermissionDenied => "Permission denied".into(),
            AuthError::EntitlementRequired => "Subscription required".into(),
            AuthError::DuplicateEmail => "Email already registered".into(),
            AuthError::ValidationFailed(msg) => msg.clone(),
            AuthError::SaltGenerationFailed
            | AuthError::InvalidSaltEncoding
            | AuthError::PersistenceUnavailable
            | AuthError::Internal(_) => "Internal error".into(),
        }
    }

    /// True for the session-state failures that the guard folds into
    /// `Unauthenticated`.
    pub fn is_session_failure(&self) -> bool {
        matches!(
            self,
            AuthError::SessionNotFound | AuthError::SessionExpired | AuthError::SessionRevoked
        )
    }
}
