//! Persistence contract for users, sessions and RBAC data.
//!
//! The core only talks to storage through [`AuthStore`], and only through a
//! [`BoundedStore`], which puts a deadline on every call. A request that is
//! cancelled drops the in-flight future, which abandons the call and rolls
//! back any open transaction.

pub mod memory;
pub mod postgres;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::auth::AuthError;
use crate::auth::hooks::{AuthEvent, HookPipeline};
use crate::models::auth::{LoginRecord, NewSession, NewUser, Permission, Role, Session, User};

pub use memory::InMemoryAuthStore;
pub use postgres::PgAuthStore;

/// Storage failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Role '{0}' already exists")]
    DuplicateRole(String),

    #[error("Missing reference: {0}")]
    MissingReference(String),

    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable storage consumed by the authority.
///
/// Lookups return `Ok(None)` when nothing matches.
#[async_trait]
pub trait AuthStore: Send + Sync {
    /// Insert a user, stamping `created_at`/`updated_at`. Fails with
    /// [`StoreError::DuplicateEmail`] if the email is taken.
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;

    async fn get_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Insert-or-increment the login record for `(user_id, device_id)`.
    /// Atomic under concurrent callers.
    async fn upsert_login_record(
        &self,
        user_id: Uuid,
        device_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<LoginRecord>;

    /// Upsert the login record and insert the session in one transaction.
    async fn create_session(
        &self,
        device_id: &str,
        session: NewSession,
    ) -> StoreResult<(Session, LoginRecord)>;

    async fn get_session_by_token_hash(&self, token_hash: &str) -> StoreResult<Option<Session>>;

    /// Mark a session revoked. Returns whether an active row changed.
    async fn revoke_session(&self, session_id: Uuid, at: DateTime<Utc>) -> StoreResult<bool>;

    /// Revoke every active session of a user. Returns how many changed.
    async fn revoke_sessions_for_user(&self, user_id: Uuid, at: DateTime<Utc>)
    -> StoreResult<u64>;

    async fn delete_session(&self, session_id: Uuid) -> StoreResult<()>;

    /// Revoke `old_session_id` and insert `new` in one transaction, reusing
    /// the old session's login record. Returns `None` without inserting if
    /// the old session was no longer active.
    async fn rotate_session(
        &self,
        old_session_id: Uuid,
        new: NewSession,
    ) -> StoreResult<Option<Session>>;

    async fn roles_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Role>>;

    async fn permissions_for_role(&self, role_id: Uuid) -> StoreResult<Vec<Permission>>;

    /// Whether the user holds an entitlement valid at `at`.
    async fn has_active_entitlement(&self, user_id: Uuid, at: DateTime<Utc>) -> StoreResult<bool>;
}

/// An [`AuthStore`] whose every call is bounded by a deadline and whose
/// failures are reported to hooks before being collapsed into
/// [`AuthError`].
#[derive(Clone)]
pub struct BoundedStore {
    store: Arc<dyn AuthStore>,
    timeout: Duration,
    hooks: Arc<HookPipeline>,
}

impl BoundedStore {
    pub fn new(store: Arc<dyn AuthStore>, timeout: Duration, hooks: Arc<HookPipeline>) -> Self {
        Self {
            store,
            timeout,
            hooks,
        }
    }

    /// The unbounded store, for building calls to pass to [`Self::call`].
    pub fn inner(&self) -> &dyn AuthStore {
        self.store.as_ref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `fut` under the deadline and map failures.
    pub async fn call<T, F>(&self, operation: &'static str, fut: F) -> Result<T, AuthError>
    where
        F: Future<Output = StoreResult<T>>,
    {
        let result = match tokio::time::timeout(self.timeout, fut).await {
            Ok(inner) => inner,
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        };
        match result {
            Ok(value) => Ok(value),
            Err(StoreError::DuplicateEmail) => Err(AuthError::DuplicateEmail),
            Err(e) => {
                warn!(operation, error = %e, "store call failed");
                self.hooks
                    .emit(AuthEvent::PersistenceFailure {
                        operation,
                        detail: e.to_string(),
                    })
                    .await;
                Err(AuthError::PersistenceUnavailable)
            }
        }
    }
}

impl std::fmt::Debug for BoundedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedStore")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
