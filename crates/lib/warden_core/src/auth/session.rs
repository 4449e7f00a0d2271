//! Session lifecycle: registration, authentication, issuance, validation,
//! rotation and revocation.
//!
//! A session is `Active` until it expires or is revoked; both end states are
//! terminal. Re-authenticating always creates a new session.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use super::AuthError;
use super::hooks::{AuthEvent, HookPipeline};
use super::password::HashingPool;
use super::token::{TOKEN_LEN, constant_time_eq, generate_token, hash_token};
use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::models::auth::{IssuedSession, NewSession, NewUser, Session, SessionState, UserIdentity};
use crate::store::BoundedStore;

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Longest password we are willing to feed the KDF.
pub const MAX_PASSWORD_LEN: usize = 1024;

const MAX_EMAIL_LEN: usize = 254;
const MAX_DEVICE_ID_LEN: usize = 128;

/// Verified against when the email is unknown so both paths cost one KDF run.
const DUMMY_SALT: &str = "AAAAAAAAAAAAAAAAAAAAAA";
const DUMMY_DIGEST: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// Trim and lower-case an email, rejecting anything that is not shaped like
/// `local@domain`.
pub fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(AuthError::ValidationFailed("email is required".into()));
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(AuthError::ValidationFailed("email is too long".into()));
    }
    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace) =>
        {
            Ok(email)
        }
        _ => Err(AuthError::ValidationFailed(
            "email is not a valid address".into(),
        )),
    }
}

fn validate_new_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::ValidationFailed(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(AuthError::ValidationFailed("password is too long".into()));
    }
    Ok(())
}

fn validate_device_id(device_id: &str) -> Result<&str, AuthError> {
    let device_id = device_id.trim();
    if device_id.is_empty() {
        return Err(AuthError::ValidationFailed("device id is required".into()));
    }
    if device_id.len() > MAX_DEVICE_ID_LEN {
        return Err(AuthError::ValidationFailed("device id is too long".into()));
    }
    Ok(device_id)
}

/// Cheap shape check so obviously bogus tokens never reach storage.
fn plausible_token(token: &str) -> bool {
    token.len() == TOKEN_LEN && token.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Issues, validates, rotates and revokes sessions.
#[derive(Clone)]
pub struct SessionManager {
    store: BoundedStore,
    hashing: HashingPool,
    config: SessionConfig,
    clock: Arc<dyn Clock>,
    hooks: Arc<HookPipeline>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(
        store: BoundedStore,
        hashing: HashingPool,
        config: SessionConfig,
        clock: Arc<dyn Clock>,
        hooks: Arc<HookPipeline>,
    ) -> Self {
        Self {
            store,
            hashing,
            config,
            clock,
            hooks,
        }
    }

    /// Create a user with a freshly salted credential.
    pub async fn register(&self, email: &str, password: &str) -> Result<UserIdentity, AuthError> {
        let email = normalize_email(email)?;
        validate_new_password(password)?;

        let (password_hash, password_salt) = self.hashing.hash_new(password.to_string()).await?;
        let user = self
            .store
            .call(
                "create_user",
                self.store.inner().create_user(NewUser {
                    email,
                    password_hash,
                    password_salt,
                }),
            )
            .await?;

        info!(user_id = %user.id, "user registered");
        self.hooks
            .emit(AuthEvent::UserRegistered { user_id: user.id })
            .await;
        Ok(UserIdentity {
            user_id: user.id,
            email: user.email,
            session_id: None,
        })
    }

    /// Check an email/password pair. Unknown email and wrong password are
    /// indistinguishable to the caller.
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<UserIdentity, AuthError> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::ValidationFailed(
                "email and password are required".into(),
            ));
        }

        let user = self
            .store
            .call("get_user_by_email", self.store.inner().get_user_by_email(&email))
            .await?;

        let verified = match &user {
            Some(u) => {
                self.hashing
                    .verify(
                        password.to_string(),
                        u.password_salt.clone(),
                        u.password_hash.clone(),
                    )
                    .await
            }
            None => {
                self.hashing
                    .verify(password.to_string(), DUMMY_SALT.into(), DUMMY_DIGEST.into())
                    .await;
                false
            }
        };

        self.hooks
            .emit(AuthEvent::AuthenticationAttempt {
                email: email.clone(),
                succeeded: verified,
            })
            .await;

        match user {
            Some(u) if verified => Ok(UserIdentity {
                user_id: u.id,
                email: u.email,
                session_id: None,
            }),
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    /// Issue a session for `user_id` on `device_id`, recording the login in
    /// the same transaction.
    pub async fn issue_session(
        &self,
        user_id: Uuid,
        device_id: &str,
    ) -> Result<IssuedSession, AuthError> {
        let device_id = validate_device_id(device_id)?;
        let now = self.clock.now();
        let token = generate_token();
        let new = NewSession {
            user_id,
            token_hash: hash_token(&token),
            expires_at: self.expiry_from(now)?,
            created_at: now,
        };

        let (session, login) = self
            .store
            .call(
                "create_session",
                self.store.inner().create_session(device_id, new),
            )
            .await?;

        debug!(%user_id, session_id = %session.id, device_id, "session issued");
        self.hooks
            .emit(AuthEvent::SessionIssued {
                user_id,
                session_id: session.id,
                device_id: device_id.to_string(),
                login_count: login.login_count,
            })
            .await;
        Ok(self.issued(&session, token))
    }

    /// Authenticate and issue in one step.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        device_id: &str,
    ) -> Result<(UserIdentity, IssuedSession), AuthError> {
        validate_device_id(device_id)?;
        let identity = self.authenticate(email, password).await?;
        let issued = self.issue_session(identity.user_id, device_id).await?;
        Ok((
            UserIdentity {
                session_id: Some(issued.session_id),
                ..identity
            },
            issued,
        ))
    }

    /// Resolve a bearer token to the identity it was issued for.
    pub async fn validate_session(&self, token: &str) -> Result<UserIdentity, AuthError> {
        let session = self.active_session(token).await?;
        let user = self
            .store
            .call("get_user_by_id", self.store.inner().get_user_by_id(session.user_id))
            .await?;
        match user {
            Some(u) => Ok(UserIdentity {
                user_id: u.id,
                email: u.email,
                session_id: Some(session.id),
            }),
            None => self.reject(AuthError::SessionNotFound, "user_missing").await,
        }
    }

    /// Revoke one session. Unknown or already revoked sessions are fine.
    pub async fn revoke_session(&self, session_id: Uuid) -> Result<(), AuthError> {
        let now = self.clock.now();
        let changed = self
            .store
            .call(
                "revoke_session",
                self.store.inner().revoke_session(session_id, now),
            )
            .await?;
        if changed {
            self.hooks
                .emit(AuthEvent::SessionRevoked { session_id })
                .await;
        }
        Ok(())
    }

    /// Revoke every active session belonging to `user_id`.
    pub async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, AuthError> {
        let now = self.clock.now();
        let count = self
            .store
            .call(
                "revoke_sessions_for_user",
                self.store.inner().revoke_sessions_for_user(user_id, now),
            )
            .await?;
        self.hooks
            .emit(AuthEvent::SessionsRevokedForUser { user_id, count })
            .await;
        Ok(count)
    }

    /// Swap a valid token for a new one. The old session is revoked in the
    /// same transaction that creates the new one.
    pub async fn rotate_session(&self, old_token: &str) -> Result<IssuedSession, AuthError> {
        let old = self.active_session(old_token).await?;
        let now = self.clock.now();
        let token = generate_token();
        let new = NewSession {
            user_id: old.user_id,
            token_hash: hash_token(&token),
            expires_at: self.expiry_from(now)?,
            created_at: now,
        };

        let rotated = self
            .store
            .call(
                "rotate_session",
                self.store.inner().rotate_session(old.id, new),
            )
            .await?;
        let Some(session) = rotated else {
            // Lost a race with a concurrent revoke or rotation.
            return self.reject(AuthError::SessionRevoked, "revoked").await;
        };

        self.hooks
            .emit(AuthEvent::SessionRotated {
                user_id: old.user_id,
                old_session_id: old.id,
                new_session_id: session.id,
            })
            .await;
        Ok(self.issued(&session, token))
    }

    /// Look up the session behind `token` and require it to be active.
    async fn active_session(&self, token: &str) -> Result<Session, AuthError> {
        if !plausible_token(token) {
            return self.reject(AuthError::SessionNotFound, "malformed").await;
        }
        let token_hash = hash_token(token);
        let session = self
            .store
            .call(
                "get_session_by_token_hash",
                self.store.inner().get_session_by_token_hash(&token_hash),
            )
            .await?;
        let Some(session) = session
            .filter(|s| constant_time_eq(s.token_hash.as_bytes(), token_hash.as_bytes()))
        else {
            return self.reject(AuthError::SessionNotFound, "not_found").await;
        };

        match session.state_at(self.clock.now()) {
            SessionState::Active => Ok(session),
            SessionState::Revoked => self.reject(AuthError::SessionRevoked, "revoked").await,
            SessionState::Expired => {
                // Lazy purge. A later lookup of this token reports not-found,
                // which the guard collapses to unauthenticated just like
                // expiry. Failure only delays cleanup.
                let _ = self
                    .store
                    .call(
                        "delete_session",
                        self.store.inner().delete_session(session.id),
                    )
                    .await;
                self.reject(AuthError::SessionExpired, "expired").await
            }
        }
    }

    /// `now` plus the session TTL, without panicking on overflow.
    fn expiry_from(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, AuthError> {
        self.config
            .ttl()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| {
                AuthError::Internal(format!(
                    "session expiry overflows for ttl_secs={}",
                    self.config.ttl_secs
                ))
            })
    }

    async fn reject<T>(&self, err: AuthError, reason: &'static str) -> Result<T, AuthError> {
        self.hooks.emit(AuthEvent::SessionRejected { reason }).await;
        Err(err)
    }

    fn issued(&self, session: &Session, token: String) -> IssuedSession {
        IssuedSession {
            session_id: session.id,
            token,
            token_type: "Bearer".into(),
            expires_at: session.expires_at,
            expires_in: (session.expires_at - session.created_at).num_seconds(),
            issuer: self.config.issuer.clone(),
            audience: self.config.audience.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use chrono::{Duration, Utc};

    use super::*;
    use crate::auth::hooks::AuthHook;
    use crate::auth::hooks::testing::RecordingHook;
    use crate::auth::password::{CredentialHasher, test_hashing_config};
    use crate::clock::ManualClock;
    use crate::store::{AuthStore, InMemoryAuthStore};

    struct Fixture {
        manager: SessionManager,
        store: Arc<InMemoryAuthStore>,
        clock: Arc<ManualClock>,
        hook: Arc<RecordingHook>,
    }

    fn fixture() -> Fixture {
        fixture_with(SessionConfig::default())
    }

    fn fixture_with(config: SessionConfig) -> Fixture {
        let store = Arc::new(InMemoryAuthStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let hook = Arc::new(RecordingHook::default());
        let sinks: Vec<Arc<dyn AuthHook>> = vec![hook.clone()];
        let hooks = Arc::new(HookPipeline::new(sinks));
        let bounded = BoundedStore::new(
            store.clone() as Arc<dyn AuthStore>,
            StdDuration::from_secs(2),
            hooks.clone(),
        );
        let hashing = HashingPool::new(
            CredentialHasher::new(&test_hashing_config()).unwrap(),
            2,
        );
        let manager = SessionManager::new(
            bounded,
            hashing,
            config,
            clock.clone(),
            hooks,
        );
        Fixture {
            manager,
            store,
            clock,
            hook,
        }
    }

    #[tokio::test]
    async fn register_then_authenticate() {
        let f = fixture();
        let registered = f.manager.register("a@x.com", "Secret1!").await.unwrap();
        let ok = f.manager.authenticate("a@x.com", "Secret1!").await.unwrap();
        assert_eq!(ok.user_id, registered.user_id);

        let wrong = f.manager.authenticate("a@x.com", "wrong").await.unwrap_err();
        assert!(matches!(wrong, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn unknown_email_looks_like_wrong_password() {
        let f = fixture();
        f.manager.register("a@x.com", "Secret1!").await.unwrap();
        let unknown = f
            .manager
            .authenticate("nobody@x.com", "Secret1!")
            .await
            .unwrap_err();
        let wrong = f.manager.authenticate("a@x.com", "nope").await.unwrap_err();
        assert_eq!(unknown.code(), wrong.code());
        assert_eq!(unknown.public_message(), wrong.public_message());
    }

    #[tokio::test]
    async fn email_is_normalized() {
        let f = fixture();
        f.manager.register("  A@X.com ", "Secret1!").await.unwrap();
        assert!(f.manager.authenticate("a@x.COM", "Secret1!").await.is_ok());
        let dup = f.manager.register("a@x.com", "Secret1!").await.unwrap_err();
        assert!(matches!(dup, AuthError::DuplicateEmail));
    }

    #[tokio::test]
    async fn stored_credential_is_not_plaintext() {
        let f = fixture();
        let id = f.manager.register("a@x.com", "Secret1!").await.unwrap();
        let user = f.store.get_user_by_id(id.user_id).await.unwrap().unwrap();
        assert_ne!(user.password_hash, "Secret1!");
        assert!(!user.password_salt.is_empty());
    }

    #[tokio::test]
    async fn registration_validates_input() {
        let f = fixture();
        for (email, password) in [("", "Secret1!"), ("no-at-sign", "Secret1!"), ("a@x.com", "short")]
        {
            let err = f.manager.register(email, password).await.unwrap_err();
            assert!(matches!(err, AuthError::ValidationFailed(_)), "{email}");
        }
    }

    #[tokio::test]
    async fn session_valid_until_ttl_then_expired() {
        let f = fixture();
        let id = f.manager.register("a@x.com", "Secret1!").await.unwrap();
        let issued = f.manager.issue_session(id.user_id, "device-1").await.unwrap();
        assert_eq!(issued.expires_in, 3600);

        f.clock.advance(Duration::minutes(30));
        let who = f.manager.validate_session(&issued.token).await.unwrap();
        assert_eq!(who.user_id, id.user_id);
        assert_eq!(who.session_id, Some(issued.session_id));

        f.clock.advance(Duration::minutes(90));
        let err = f.manager.validate_session(&issued.token).await.unwrap_err();
        assert!(matches!(err, AuthError::SessionExpired));

        // Lazily purged on the expired lookup.
        assert!(f.store.session(issued.session_id).is_none());
        let err = f.manager.validate_session(&issued.token).await.unwrap_err();
        assert!(matches!(err, AuthError::SessionNotFound));
    }

    #[tokio::test]
    async fn oversized_ttl_fails_without_panicking() {
        let f = fixture_with(SessionConfig {
            ttl_secs: 10_000_000_000_000,
            ..SessionConfig::default()
        });
        let id = f.manager.register("a@x.com", "Secret1!").await.unwrap();
        let err = f
            .manager
            .issue_session(id.user_id, "device-1")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Internal(_)));
        assert_eq!(err.code(), "INTERNAL_ERROR");

        let f = fixture_with(SessionConfig {
            ttl_secs: i64::MAX,
            ..SessionConfig::default()
        });
        let id = f.manager.register("a@x.com", "Secret1!").await.unwrap();
        assert!(f.manager.issue_session(id.user_id, "device-1").await.is_err());
    }

    #[tokio::test]
    async fn revoked_session_never_validates() {
        let f = fixture();
        let id = f.manager.register("a@x.com", "Secret1!").await.unwrap();
        let issued = f.manager.issue_session(id.user_id, "device-1").await.unwrap();
        f.manager.revoke_session(issued.session_id).await.unwrap();
        let err = f.manager.validate_session(&issued.token).await.unwrap_err();
        assert!(matches!(err, AuthError::SessionRevoked | AuthError::SessionNotFound));

        // Idempotent, including for sessions that never existed.
        f.manager.revoke_session(issued.session_id).await.unwrap();
        f.manager.revoke_session(Uuid::now_v7()).await.unwrap();
    }

    #[tokio::test]
    async fn revoke_all_hits_every_device() {
        let f = fixture();
        let id = f.manager.register("a@x.com", "Secret1!").await.unwrap();
        let a = f.manager.issue_session(id.user_id, "device-1").await.unwrap();
        let b = f.manager.issue_session(id.user_id, "device-2").await.unwrap();
        assert_eq!(f.manager.revoke_all_for_user(id.user_id).await.unwrap(), 2);
        for token in [a.token, b.token] {
            assert!(f.manager.validate_session(&token).await.is_err());
        }
        assert_eq!(f.manager.revoke_all_for_user(id.user_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_and_malformed_tokens_are_not_found() {
        let f = fixture();
        let wrong_alphabet = "-".repeat(TOKEN_LEN);
        let never_issued = generate_token();
        for token in ["", "short", wrong_alphabet.as_str(), never_issued.as_str()] {
            let err = f.manager.validate_session(token).await.unwrap_err();
            assert!(matches!(err, AuthError::SessionNotFound));
        }
    }

    #[tokio::test]
    async fn rotation_replaces_the_token() {
        let f = fixture();
        let id = f.manager.register("a@x.com", "Secret1!").await.unwrap();
        let old = f.manager.issue_session(id.user_id, "device-1").await.unwrap();
        f.clock.advance(Duration::minutes(50));

        let new = f.manager.rotate_session(&old.token).await.unwrap();
        assert_ne!(new.token, old.token);
        assert!(new.expires_at > old.expires_at);

        assert!(matches!(
            f.manager.validate_session(&old.token).await.unwrap_err(),
            AuthError::SessionRevoked
        ));
        assert!(f.manager.validate_session(&new.token).await.is_ok());

        // The old token cannot be rotated a second time.
        assert!(f.manager.rotate_session(&old.token).await.is_err());
    }

    #[tokio::test]
    async fn expired_token_cannot_be_rotated() {
        let f = fixture();
        let id = f.manager.register("a@x.com", "Secret1!").await.unwrap();
        let old = f.manager.issue_session(id.user_id, "device-1").await.unwrap();
        f.clock.advance(Duration::hours(2));
        let err = f.manager.rotate_session(&old.token).await.unwrap_err();
        assert!(matches!(err, AuthError::SessionExpired));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_logins_do_not_lose_updates() {
        let f = fixture();
        let id = f.manager.register("a@x.com", "Secret1!").await.unwrap();
        f.manager.issue_session(id.user_id, "device-1").await.unwrap();
        let before = f.store.login_record(id.user_id, "device-1").unwrap().login_count;

        let (m1, m2) = (f.manager.clone(), f.manager.clone());
        let uid = id.user_id;
        let (a, b) = tokio::join!(
            tokio::spawn(async move { m1.issue_session(uid, "device-1").await }),
            tokio::spawn(async move { m2.issue_session(uid, "device-1").await }),
        );
        a.unwrap().unwrap();
        b.unwrap().unwrap();

        let after = f.store.login_record(id.user_id, "device-1").unwrap().login_count;
        assert_eq!(after, before + 2);
    }

    #[tokio::test]
    async fn login_returns_identity_bound_to_session() {
        let f = fixture();
        f.manager.register("a@x.com", "Secret1!").await.unwrap();
        let (who, issued) = f
            .manager
            .login("a@x.com", "Secret1!", "device-1")
            .await
            .unwrap();
        assert_eq!(who.session_id, Some(issued.session_id));
        assert_eq!(issued.token_type, "Bearer");
        assert_eq!(issued.issuer, "warden");

        let err = f.manager.login("a@x.com", "Secret1!", "  ").await.unwrap_err();
        assert!(matches!(err, AuthError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn hooks_see_the_lifecycle() {
        let f = fixture();
        let id = f.manager.register("a@x.com", "Secret1!").await.unwrap();
        let _ = f.manager.authenticate("a@x.com", "bad").await;
        let issued = f.manager.issue_session(id.user_id, "device-1").await.unwrap();
        f.manager.revoke_session(issued.session_id).await.unwrap();
        let _ = f.manager.validate_session(&issued.token).await;

        assert_eq!(
            f.hook.names(),
            vec![
                "user_registered",
                "authentication_attempt",
                "session_issued",
                "session_revoked",
                "session_rejected",
            ]
        );
    }
}
