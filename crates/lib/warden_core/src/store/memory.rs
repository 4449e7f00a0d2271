//! In-process [`AuthStore`].
//!
//! All tables live behind one mutex, so every trait call is a single atomic
//! step. Also carries the administrative writes (roles, permissions,
//! entitlements) that the authority itself never performs.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{AuthStore, StoreError, StoreResult};
use crate::auth::token::constant_time_eq;
use crate::models::auth::{LoginRecord, NewSession, NewUser, Permission, Role, Session, User};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    logins: HashMap<(Uuid, String), LoginRecord>,
    sessions: HashMap<Uuid, Session>,
    roles: HashMap<Uuid, Role>,
    permissions: HashMap<Uuid, Permission>,
    role_permissions: BTreeSet<(Uuid, Uuid)>,
    user_roles: BTreeSet<(Uuid, Uuid)>,
    /// user id -> expiry (`None` = open-ended)
    entitlements: HashMap<Uuid, Option<DateTime<Utc>>>,
}

impl Tables {
    fn upsert_login(&mut self, user_id: Uuid, device_id: &str, at: DateTime<Utc>) -> LoginRecord {
        let record = self
            .logins
            .entry((user_id, device_id.to_string()))
            .and_modify(|r| {
                r.login_count += 1;
                r.last_login_at = at;
            })
            .or_insert_with(|| LoginRecord {
                id: Uuid::now_v7(),
                user_id,
                device_id: device_id.to_string(),
                login_count: 1,
                last_login_at: at,
            });
        record.clone()
    }

    fn insert_session(&mut self, new: NewSession, login_id: Uuid) -> Session {
        let session = Session {
            id: Uuid::now_v7(),
            user_id: new.user_id,
            login_id,
            token_hash: new.token_hash,
            expires_at: new.expires_at,
            created_at: new.created_at,
            revoked_at: None,
        };
        self.sessions.insert(session.id, session.clone());
        session
    }
}

/// Mutex-backed store for tests and single-process embedding.
#[derive(Debug, Default)]
pub struct InMemoryAuthStore {
    tables: Mutex<Tables>,
}

impl InMemoryAuthStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a role. Names are unique.
    pub fn create_role(&self, name: &str, description: &str) -> StoreResult<Role> {
        let mut t = self.tables();
        if t.roles.values().any(|r| r.name == name) {
            return Err(StoreError::DuplicateRole(name.to_string()));
        }
        let role = Role {
            id: Uuid::now_v7(),
            name: name.to_string(),
            description: description.to_string(),
        };
        t.roles.insert(role.id, role.clone());
        Ok(role)
    }

    /// Create a permission, or return the existing one with that name.
    pub fn create_permission(&self, name: &str, description: &str) -> Permission {
        let mut t = self.tables();
        if let Some(existing) = t.permissions.values().find(|p| p.name == name) {
            return existing.clone();
        }
        let perm = Permission {
            id: Uuid::now_v7(),
            name: name.to_string(),
            description: description.to_string(),
        };
        t.permissions.insert(perm.id, perm.clone());
        perm
    }

    /// Attach a permission to a role. Both must exist; repeats are no-ops.
    pub fn grant_permission(&self, role_id: Uuid, permission_id: Uuid) -> StoreResult<()> {
        let mut t = self.tables();
        if !t.roles.contains_key(&role_id) || !t.permissions.contains_key(&permission_id) {
            return Err(StoreError::MissingReference(
                "role and permission must both exist".into(),
            ));
        }
        t.role_permissions.insert((role_id, permission_id));
        Ok(())
    }

    /// Assign a role to a user. Repeats are no-ops.
    pub fn assign_role(&self, user_id: Uuid, role_id: Uuid) -> StoreResult<()> {
        let mut t = self.tables();
        if !t.users.contains_key(&user_id) || !t.roles.contains_key(&role_id) {
            return Err(StoreError::MissingReference("user and role must both exist".into()));
        }
        t.user_roles.insert((user_id, role_id));
        Ok(())
    }

    /// Grant an entitlement valid until `expires_at` (or forever).
    pub fn grant_entitlement(&self, user_id: Uuid, expires_at: Option<DateTime<Utc>>) {
        self.tables().entitlements.insert(user_id, expires_at);
    }

    /// Login record for a pair, if any.
    pub fn login_record(&self, user_id: Uuid, device_id: &str) -> Option<LoginRecord> {
        self.tables()
            .logins
            .get(&(user_id, device_id.to_string()))
            .cloned()
    }

    pub fn session(&self, session_id: Uuid) -> Option<Session> {
        self.tables().sessions.get(&session_id).cloned()
    }

    pub fn session_count(&self) -> usize {
        self.tables().sessions.len()
    }
}

#[async_trait]
impl AuthStore for InMemoryAuthStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut t = self.tables();
        if t.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::DuplicateEmail);
        }
        let now = Utc::now();
        let user = User {
            id: Uuid::now_v7(),
            email: user.email,
            password_hash: user.password_hash,
            password_salt: user.password_salt,
            created_at: now,
            updated_at: now,
        };
        t.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.tables().users.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .tables()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn upsert_login_record(
        &self,
        user_id: Uuid,
        device_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<LoginRecord> {
        Ok(self.tables().upsert_login(user_id, device_id, at))
    }

    async fn create_session(
        &self,
        device_id: &str,
        session: NewSession,
    ) -> StoreResult<(Session, LoginRecord)> {
        let mut t = self.tables();
        if !t.users.contains_key(&session.user_id) {
            return Err(StoreError::MissingReference("session references unknown user".into()));
        }
        let login = t.upsert_login(session.user_id, device_id, session.created_at);
        let session = t.insert_session(session, login.id);
        Ok((session, login))
    }

    async fn get_session_by_token_hash(&self, token_hash: &str) -> StoreResult<Option<Session>> {
        Ok(self
            .tables()
            .sessions
            .values()
            .find(|s| constant_time_eq(s.token_hash.as_bytes(), token_hash.as_bytes()))
            .cloned())
    }

    async fn revoke_session(&self, session_id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut t = self.tables();
        match t.sessions.get_mut(&session_id) {
            Some(s) if s.revoked_at.is_none() => {
                s.revoked_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_sessions_for_user(
        &self,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let mut t = self.tables();
        let mut count = 0;
        for s in t
            .sessions
            .values_mut()
            .filter(|s| s.user_id == user_id && s.revoked_at.is_none())
        {
            s.revoked_at = Some(at);
            count += 1;
        }
        Ok(count)
    }

    async fn delete_session(&self, session_id: Uuid) -> StoreResult<()> {
        self.tables().sessions.remove(&session_id);
        Ok(())
    }

    async fn rotate_session(
        &self,
        old_session_id: Uuid,
        new: NewSession,
    ) -> StoreResult<Option<Session>> {
        let mut t = self.tables();
        let login_id = match t.sessions.get_mut(&old_session_id) {
            Some(old) if old.revoked_at.is_none() => {
                old.revoked_at = Some(new.created_at);
                old.login_id
            }
            _ => return Ok(None),
        };
        Ok(Some(t.insert_session(new, login_id)))
    }

    async fn roles_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Role>> {
        let t = self.tables();
        Ok(t.user_roles
            .iter()
            .filter(|(u, _)| *u == user_id)
            .filter_map(|(_, r)| t.roles.get(r).cloned())
            .collect())
    }

    async fn permissions_for_role(&self, role_id: Uuid) -> StoreResult<Vec<Permission>> {
        let t = self.tables();
        Ok(t.role_permissions
            .iter()
            .filter(|(r, _)| *r == role_id)
            .filter_map(|(_, p)| t.permissions.get(p).cloned())
            .collect())
    }

    async fn has_active_entitlement(&self, user_id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        Ok(match self.tables().entitlements.get(&user_id) {
            Some(None) => true,
            Some(Some(expires_at)) => *expires_at > at,
            None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.into(),
            password_hash: "h".into(),
            password_salt: "s".into(),
        }
    }

    fn new_session(user_id: Uuid, hash: &str) -> NewSession {
        let now = Utc::now();
        NewSession {
            user_id,
            token_hash: hash.into(),
            expires_at: now + Duration::hours(1),
            created_at: now,
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = InMemoryAuthStore::new();
        store.create_user(new_user("a@x.com")).await.unwrap();
        let err = store.create_user(new_user("a@x.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
    }

    #[tokio::test]
    async fn login_count_increments_per_device() {
        let store = InMemoryAuthStore::new();
        let user = store.create_user(new_user("a@x.com")).await.unwrap();
        let now = Utc::now();
        store.upsert_login_record(user.id, "d1", now).await.unwrap();
        let second = store.upsert_login_record(user.id, "d1", now).await.unwrap();
        let other = store.upsert_login_record(user.id, "d2", now).await.unwrap();
        assert_eq!(second.login_count, 2);
        assert_eq!(other.login_count, 1);
    }

    #[tokio::test]
    async fn rotate_refuses_an_already_revoked_session() {
        let store = InMemoryAuthStore::new();
        let user = store.create_user(new_user("a@x.com")).await.unwrap();
        let (s, _) = store
            .create_session("d1", new_session(user.id, "h1"))
            .await
            .unwrap();
        assert!(store.revoke_session(s.id, Utc::now()).await.unwrap());
        assert!(!store.revoke_session(s.id, Utc::now()).await.unwrap());
        let rotated = store
            .rotate_session(s.id, new_session(user.id, "h2"))
            .await
            .unwrap();
        assert!(rotated.is_none());
        assert_eq!(store.session_count(), 1);
    }

    #[tokio::test]
    async fn rotated_session_keeps_login_record() {
        let store = InMemoryAuthStore::new();
        let user = store.create_user(new_user("a@x.com")).await.unwrap();
        let (old, login) = store
            .create_session("d1", new_session(user.id, "h1"))
            .await
            .unwrap();
        let new = store
            .rotate_session(old.id, new_session(user.id, "h2"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(new.login_id, login.id);
        assert!(store.session(old.id).unwrap().revoked_at.is_some());
    }

    #[tokio::test]
    async fn assignments_require_existing_rows() {
        let store = InMemoryAuthStore::new();
        let role = store.create_role("editor", "").unwrap();
        assert!(matches!(
            store.grant_permission(role.id, Uuid::now_v7()),
            Err(StoreError::MissingReference(_))
        ));
        assert!(matches!(
            store.assign_role(Uuid::now_v7(), role.id),
            Err(StoreError::MissingReference(_))
        ));
        assert!(matches!(
            store.create_role("editor", "again"),
            Err(StoreError::DuplicateRole(name)) if name == "editor"
        ));
    }

    #[tokio::test]
    async fn entitlement_expiry_is_respected() {
        let store = InMemoryAuthStore::new();
        let uid = Uuid::now_v7();
        let now = Utc::now();
        assert!(!store.has_active_entitlement(uid, now).await.unwrap());
        store.grant_entitlement(uid, Some(now + Duration::days(1)));
        assert!(store.has_active_entitlement(uid, now).await.unwrap());
        assert!(
            !store
                .has_active_entitlement(uid, now + Duration::days(2))
                .await
                .unwrap()
        );
    }
}
