//! Observability hook points.
//!
//! The authority reports outcomes as [`AuthEvent`]s to an ordered pipeline of
//! [`AuthHook`]s. Hooks observe only: they cannot fail a request or change a
//! decision, and the core does not know what sink sits behind them.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Something the authority did or refused to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    UserRegistered {
        user_id: Uuid,
    },
    AuthenticationAttempt {
        email: String,
        succeeded: bool,
    },
    SessionIssued {
        user_id: Uuid,
        session_id: Uuid,
        device_id: String,
        login_count: i64,
    },
    SessionRotated {
        user_id: Uuid,
        old_session_id: Uuid,
        new_session_id: Uuid,
    },
    SessionRevoked {
        session_id: Uuid,
    },
    SessionsRevokedForUser {
        user_id: Uuid,
        count: u64,
    },
    SessionRejected {
        reason: &'static str,
    },
    PermissionDenied {
        user_id: Uuid,
        permission: String,
    },
    EntitlementRequired {
        user_id: Uuid,
    },
    PersistenceFailure {
        operation: &'static str,
        detail: String,
    },
}

impl AuthEvent {
    /// Short stable name, handy as a metric label.
    pub fn name(&self) -> &'static str {
        match self {
            AuthEvent::UserRegistered { .. } => "user_registered",
            AuthEvent::AuthenticationAttempt { .. } => "authentication_attempt",
            AuthEvent::SessionIssued { .. } => "session_issued",
            AuthEvent::SessionRotated { .. } => "session_rotated",
            AuthEvent::SessionRevoked { .. } => "session_revoked",
            AuthEvent::SessionsRevokedForUser { .. } => "sessions_revoked_for_user",
            AuthEvent::SessionRejected { .. } => "session_rejected",
            AuthEvent::PermissionDenied { .. } => "permission_denied",
            AuthEvent::EntitlementRequired { .. } => "entitlement_required",
            AuthEvent::PersistenceFailure { .. } => "persistence_failure",
        }
    }
}

/// Implement to record authority events somewhere.
#[async_trait]
pub trait AuthHook: Send + Sync {
    async fn on_event(&self, event: &AuthEvent, at: DateTime<Utc>);

    /// Hook identifier for debugging/logging.
    fn name(&self) -> &str;
}

/// Ordered list of hooks, each seeing every event.
#[derive(Clone, Default)]
pub struct HookPipeline {
    hooks: Vec<Arc<dyn AuthHook>>,
}

impl HookPipeline {
    pub fn new(hooks: Vec<Arc<dyn AuthHook>>) -> Self {
        Self { hooks }
    }

    /// A pipeline that drops every event.
    pub fn empty() -> Self {
        Self { hooks: Vec::new() }
    }

    pub fn with(mut self, hook: Arc<dyn AuthHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Deliver `event` to every hook in order.
    pub async fn emit(&self, event: AuthEvent) {
        let at = Utc::now();
        for hook in &self.hooks {
            hook.on_event(&event, at).await;
        }
    }
}

impl std::fmt::Debug for HookPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.hooks.iter().map(|h| h.name()))
            .finish()
    }
}

/// Writes every event to `tracing`.
#[derive(Debug, Default)]
pub struct TracingHook;

#[async_trait]
impl AuthHook for TracingHook {
    async fn on_event(&self, event: &AuthEvent, _at: DateTime<Utc>) {
        match event {
            AuthEvent::AuthenticationAttempt { email, succeeded } => {
                info!(event = event.name(), email, succeeded, "authentication attempt");
            }
            AuthEvent::SessionIssued {
                user_id,
                session_id,
                device_id,
                login_count,
            } => {
                info!(event = event.name(), %user_id, %session_id, device_id, login_count, "session issued");
            }
            AuthEvent::PermissionDenied {
                user_id,
                permission,
            } => {
                info!(event = event.name(), %user_id, permission, "permission denied");
            }
            AuthEvent::PersistenceFailure { operation, detail } => {
                warn!(event = event.name(), operation, detail, "persistence failure");
            }
            other => debug!(event = other.name(), ?other, "auth event"),
        }
    }

    fn name(&self) -> &str {
        "TracingHook"
    }
}
