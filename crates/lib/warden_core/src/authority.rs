//! Assembly of the authority's components.
//!
//! Everything is wired here, leaves first: store bound and hasher, then the
//! session manager and permission evaluator, then the guard over both.

use std::sync::Arc;

use tracing::info;

use crate::auth::guard::Guard;
use crate::auth::hooks::HookPipeline;
use crate::auth::password::{CredentialHasher, HashingPool};
use crate::auth::permissions::PermissionEvaluator;
use crate::auth::session::SessionManager;
use crate::clock::Clock;
use crate::config::{AuthorityConfig, ConfigError};
use crate::store::{AuthStore, BoundedStore};

/// The credential and session authority.
#[derive(Debug, Clone)]
pub struct Authority {
    config: AuthorityConfig,
    sessions: Arc<SessionManager>,
    permissions: Arc<PermissionEvaluator>,
    guard: Guard,
    hooks: Arc<HookPipeline>,
}

impl Authority {
    /// Validate `config` and build every component.
    pub fn new(
        config: AuthorityConfig,
        store: Arc<dyn AuthStore>,
        clock: Arc<dyn Clock>,
        hooks: HookPipeline,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let hooks = Arc::new(hooks);
        let store = BoundedStore::new(store, config.persistence.timeout(), hooks.clone());
        let hasher = CredentialHasher::new(&config.hashing)?;
        let hashing = HashingPool::new(hasher, config.hashing.max_concurrent);

        let sessions = Arc::new(SessionManager::new(
            store.clone(),
            hashing,
            config.session.clone(),
            clock.clone(),
            hooks.clone(),
        ));
        let permissions = Arc::new(PermissionEvaluator::new(store.clone(), hooks.clone()));
        let guard = Guard::new(
            sessions.clone(),
            permissions.clone(),
            store,
            clock,
            hooks.clone(),
        );

        info!(
            ttl_secs = config.session.ttl_secs,
            hash_workers = config.hashing.max_concurrent,
            hooks = hooks.len(),
            "authority ready"
        );
        Ok(Self {
            config,
            sessions,
            permissions,
            guard,
            hooks,
        })
    }

    pub fn config(&self) -> &AuthorityConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn permissions(&self) -> &PermissionEvaluator {
        &self.permissions
    }

    pub fn guard(&self) -> &Guard {
        &self.guard
    }

    pub fn hooks(&self) -> &HookPipeline {
        &self.hooks
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::auth::guard::GuardOptions;
    use crate::auth::password::test_hashing_config;
    use crate::clock::ManualClock;
    use crate::store::InMemoryAuthStore;

    fn config() -> AuthorityConfig {
        AuthorityConfig {
            hashing: test_hashing_config(),
            ..AuthorityConfig::default()
        }
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let mut cfg = config();
        cfg.session.ttl_secs = 0;
        let err = Authority::new(
            cfg,
            Arc::new(InMemoryAuthStore::new()),
            Arc::new(ManualClock::new(Utc::now())),
            HookPipeline::empty(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Session(_)));
    }

    #[tokio::test]
    async fn components_share_one_store() {
        let authority = Authority::new(
            config(),
            Arc::new(InMemoryAuthStore::new()),
            Arc::new(ManualClock::new(Utc::now())),
            HookPipeline::empty(),
        )
        .unwrap();

        authority
            .sessions()
            .register("a@x.com", "Secret1!")
            .await
            .unwrap();
        let (who, issued) = authority
            .sessions()
            .login("a@x.com", "Secret1!", "device-1")
            .await
            .unwrap();
        let allowed = authority
            .guard()
            .enforce(Some(&issued.token), &GuardOptions::authenticated())
            .await
            .unwrap();
        assert_eq!(allowed.user_id, who.user_id);
        assert!(
            authority
                .permissions()
                .effective_permissions(who.user_id)
                .await
                .unwrap()
                .is_empty()
        );
    }
}
