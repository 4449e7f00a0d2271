//! Role-based permission evaluation.

use std::collections::BTreeMap;
use std::sync::Arc;

use uuid::Uuid;

use super::AuthError;
use super::hooks::{AuthEvent, HookPipeline};
use crate::models::auth::Permission;
use crate::store::BoundedStore;

/// A user's effective permissions, keyed and deduplicated by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    by_name: BTreeMap<String, Permission>,
}

impl PermissionSet {
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Permissions in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.by_name.values()
    }

    pub fn names(&self) -> Vec<&str> {
        self.by_name.keys().map(String::as_str).collect()
    }

    fn insert(&mut self, permission: Permission) {
        self.by_name.entry(permission.name.clone()).or_insert(permission);
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        let mut set = Self::default();
        for p in iter {
            set.insert(p);
        }
        set
    }
}

/// Resolves user -> roles -> permissions.
#[derive(Debug, Clone)]
pub struct PermissionEvaluator {
    store: BoundedStore,
    hooks: Arc<HookPipeline>,
}

impl PermissionEvaluator {
    pub fn new(store: BoundedStore, hooks: Arc<HookPipeline>) -> Self {
        Self { store, hooks }
    }

    /// Union of the permissions of every role assigned to `user_id`. A user
    /// with no roles has an empty set.
    pub async fn effective_permissions(&self, user_id: Uuid) -> Result<PermissionSet, AuthError> {
        let roles = self
            .store
            .call("roles_for_user", self.store.inner().roles_for_user(user_id))
            .await?;

        let mut set = PermissionSet::default();
        for role in roles {
            let granted = self
                .store
                .call(
                    "permissions_for_role",
                    self.store.inner().permissions_for_role(role.id),
                )
                .await?;
            for p in granted {
                set.insert(p);
            }
        }
        Ok(set)
    }

    pub async fn has_permission(&self, user_id: Uuid, permission: &str) -> Result<bool, AuthError> {
        Ok(self.effective_permissions(user_id).await?.contains(permission))
    }

    /// Like [`Self::has_permission`] but fails with
    /// [`AuthError::PermissionDenied`] and reports the denial.
    pub async fn require(&self, user_id: Uuid, permission: &str) -> Result<(), AuthError> {
        if self.has_permission(user_id, permission).await? {
            return Ok(());
        }
        self.hooks
            .emit(AuthEvent::PermissionDenied {
                user_id,
                permission: permission.to_string(),
            })
            .await;
        Err(AuthError::PermissionDenied)
    }
}
