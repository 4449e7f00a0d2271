//! Authentication domain models.
//!
//! Records carry identifiers only; related rows are fetched through the
//! store, never embedded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered principal with its stored credential.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    /// Base64 Argon2id digest.
    pub password_hash: String,
    /// Base64 salt the digest was computed with.
    pub password_salt: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for user creation. Hash and salt are always set together.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub password_salt: String,
}

/// Per-device login history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub device_id: String,
    pub login_count: i64,
    pub last_login_at: DateTime<Utc>,
}

/// A persisted session. Only the SHA-256 digest of the token is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub login_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

/// Input for session creation.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle state of a session at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Expired,
    Revoked,
}

impl Session {
    /// Revocation wins over expiry; both are terminal.
    pub fn state_at(&self, now: DateTime<Utc>) -> SessionState {
        if self.revoked_at.is_some() {
            SessionState::Revoked
        } else if now >= self.expires_at {
            SessionState::Expired
        } else {
            SessionState::Active
        }
    }
}

/// Named bundle of permissions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: String,
}

/// Atomic capability, e.g. `user:create`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permission {
    pub id: Uuid,
    pub name: String,
    pub description: String,
}

/// The authenticated principal bound to a validated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: Uuid,
    pub email: String,
    /// Session the identity was resolved from; `None` right after
    /// authentication, before a session exists.
    pub session_id: Option<Uuid>,
}

/// A freshly issued session as handed to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedSession {
    pub session_id: Uuid,
    /// Opaque bearer token. Never persisted.
    pub token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    /// Seconds until expiry at issue time.
    pub expires_in: i64,
    pub issuer: String,
    pub audience: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(expires_at: DateTime<Utc>, revoked_at: Option<DateTime<Utc>>) -> Session {
        Session {
            id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            login_id: Uuid::now_v7(),
            token_hash: "h".into(),
            expires_at,
            created_at: expires_at - Duration::hours(1),
            revoked_at,
        }
    }

    #[test]
    fn active_before_expiry() {
        let now = Utc::now();
        assert_eq!(
            session(now + Duration::minutes(1), None).state_at(now),
            SessionState::Active
        );
    }

    #[test]
    fn expired_at_boundary() {
        let now = Utc::now();
        assert_eq!(session(now, None).state_at(now), SessionState::Expired);
    }

    #[test]
    fn revoked_beats_expired() {
        let now = Utc::now();
        let s = session(now - Duration::minutes(1), Some(now - Duration::minutes(2)));
        assert_eq!(s.state_at(now), SessionState::Revoked);
    }
}
