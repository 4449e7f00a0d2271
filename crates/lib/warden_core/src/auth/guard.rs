//! Request-time enforcement point.
//!
//! [`Guard::enforce`] authenticates the presented token, then checks the
//! required permission, then the entitlement, in that order. It keeps no
//! state of its own.

use std::sync::Arc;

use tracing::debug;

use super::AuthError;
use super::hooks::{AuthEvent, HookPipeline};
use super::permissions::PermissionEvaluator;
use super::session::SessionManager;
use crate::clock::Clock;
use crate::models::auth::UserIdentity;
use crate::store::BoundedStore;

/// What a protected operation requires beyond a valid session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardOptions {
    pub permission: Option<String>,
    pub require_active_entitlement: bool,
}

impl GuardOptions {
    /// Any authenticated caller.
    pub fn authenticated() -> Self {
        Self::default()
    }

    pub fn permission(name: impl Into<String>) -> Self {
        Self {
            permission: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn require_entitlement(mut self) -> Self {
        self.require_active_entitlement = true;
        self
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` header value.
pub fn extract_bearer(header: Option<&str>) -> Option<&str> {
    let value = header?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[derive(Clone)]
pub struct Guard {
    sessions: Arc<SessionManager>,
    permissions: Arc<PermissionEvaluator>,
    store: BoundedStore,
    clock: Arc<dyn Clock>,
    hooks: Arc<HookPipeline>,
}

impl std::fmt::Debug for Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guard").finish_non_exhaustive()
    }
}

impl Guard {
    pub fn new(
        sessions: Arc<SessionManager>,
        permissions: Arc<PermissionEvaluator>,
        store: BoundedStore,
        clock: Arc<dyn Clock>,
        hooks: Arc<HookPipeline>,
    ) -> Self {
        Self {
            sessions,
            permissions,
            store,
            clock,
            hooks,
        }
    }

    /// Allow with the caller's identity, or deny with a structured reason.
    ///
    /// Any session failure surfaces as [`AuthError::Unauthenticated`];
    /// storage failures keep their own kind.
    pub async fn enforce(
        &self,
        token: Option<&str>,
        options: &GuardOptions,
    ) -> Result<UserIdentity, AuthError> {
        let Some(token) = token else {
            return Err(AuthError::Unauthenticated);
        };
        let identity = match self.sessions.validate_session(token).await {
            Ok(identity) => identity,
            Err(e) if e.is_session_failure() => {
                debug!(code = e.code(), "guard: unauthenticated");
                return Err(AuthError::Unauthenticated);
            }
            Err(e) => return Err(e),
        };

        if let Some(permission) = options.permission.as_deref() {
            self.permissions.require(identity.user_id, permission).await?;
        }

        if options.require_active_entitlement {
            let now = self.clock.now();
            let entitled = self
                .store
                .call(
                    "has_active_entitlement",
                    self.store.inner().has_active_entitlement(identity.user_id, now),
                )
                .await?;
            if !entitled {
                self.hooks
                    .emit(AuthEvent::EntitlementRequired {
                        user_id: identity.user_id,
                    })
                    .await;
                return Err(AuthError::EntitlementRequired);
            }
        }

        Ok(identity)
    }
}
