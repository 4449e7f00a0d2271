//! Password hashing via Argon2id.
//!
//! Salts and digests are stored as unpadded standard base64. Cost parameters
//! come from [`HashingConfig`] and are fixed for the lifetime of a hasher.

use std::sync::Arc;

use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use rand::TryRngCore;
use rand::rngs::OsRng;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::AuthError;
use super::token::constant_time_eq;
use crate::config::{ConfigError, HashingConfig};

/// Memory-hard password hasher.
#[derive(Clone)]
pub struct CredentialHasher {
    argon2: Argon2<'static>,
    salt_len: usize,
    output_len: usize,
}

impl std::fmt::Debug for CredentialHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialHasher")
            .field("salt_len", &self.salt_len)
            .field("output_len", &self.output_len)
            .finish_non_exhaustive()
    }
}

impl CredentialHasher {
    pub fn new(config: &HashingConfig) -> Result<Self, ConfigError> {
        let params = Params::new(
            config.memory_cost_kib,
            config.time_cost,
            config.parallelism,
            Some(config.output_len),
        )
        .map_err(|e| ConfigError::Hashing(format!("argon2 params: {e}")))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            salt_len: config.salt_len,
            output_len: config.output_len,
        })
    }

    /// Generate a random base64 salt of the configured length.
    pub fn generate_salt(&self) -> Result<String, AuthError> {
        let mut salt = vec![0u8; self.salt_len];
        OsRng.try_fill_bytes(&mut salt).map_err(|e| {
            warn!("entropy source unavailable: {e}");
            AuthError::SaltGenerationFailed
        })?;
        Ok(STANDARD_NO_PAD.encode(salt))
    }

    /// Hash `password` with an existing base64 `salt`.
    pub fn hash(&self, password: &str, salt: &str) -> Result<String, AuthError> {
        let salt_bytes = STANDARD_NO_PAD
            .decode(salt)
            .map_err(|_| AuthError::InvalidSaltEncoding)?;
        let mut out = vec![0u8; self.output_len];
        self.argon2
            .hash_password_into(password.as_bytes(), &salt_bytes, &mut out)
            .map_err(|e| match e {
                argon2::Error::SaltTooShort | argon2::Error::SaltTooLong => {
                    AuthError::InvalidSaltEncoding
                }
                other => AuthError::Internal(format!("argon2 hash: {other}")),
            })?;
        Ok(STANDARD_NO_PAD.encode(out))
    }

    /// Hash with a fresh salt. Returns `(digest, salt)`.
    pub fn hash_new(&self, password: &str) -> Result<(String, String), AuthError> {
        let salt = self.generate_salt()?;
        let digest = self.hash(password, &salt)?;
        Ok((digest, salt))
    }

    /// Recompute and compare. Any failure reads as a mismatch.
    pub fn verify(&self, password: &str, salt: &str, digest: &str) -> bool {
        match self.hash(password, salt) {
            Ok(computed) => constant_time_eq(computed.as_bytes(), digest.as_bytes()),
            Err(e) => {
                debug!(code = e.code(), "password verification could not compute digest");
                false
            }
        }
    }
}

/// Runs hashing off the async executor, at most `max_concurrent` at a time.
#[derive(Debug, Clone)]
pub struct HashingPool {
    hasher: Arc<CredentialHasher>,
    permits: Arc<Semaphore>,
}

impl HashingPool {
    pub fn new(hasher: CredentialHasher, max_concurrent: usize) -> Self {
        Self {
            hasher: Arc::new(hasher),
            permits: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    pub fn hasher(&self) -> &CredentialHasher {
        &self.hasher
    }

    pub async fn hash_new(&self, password: String) -> Result<(String, String), AuthError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| AuthError::Internal(format!("hashing pool closed: {e}")))?;
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            hasher.hash_new(&password)
        })
        .await
        .map_err(|e| AuthError::Internal(format!("hashing task: {e}")))?
    }

    pub async fn verify(&self, password: String, salt: String, digest: String) -> bool {
        let Ok(permit) = self.permits.clone().acquire_owned().await else {
            return false;
        };
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            hasher.verify(&password, &salt, &digest)
        })
        .await
        .unwrap_or(false)
    }
}

#[cfg(test)]
pub(crate) fn test_hashing_config() -> HashingConfig {
    HashingConfig {
        time_cost: 1,
        memory_cost_kib: 64,
        parallelism: 1,
        output_len: 32,
        salt_len: 16,
        max_concurrent: 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> CredentialHasher {
        CredentialHasher::new(&test_hashing_config()).unwrap()
    }

    #[test]
    fn hash_is_deterministic_for_fixed_salt() {
        let h = hasher();
        let salt = h.generate_salt().unwrap();
        assert_eq!(h.hash("pw", &salt).unwrap(), h.hash("pw", &salt).unwrap());
    }

    #[test]
    fn salt_has_configured_length() {
        let h = hasher();
        let salt = h.generate_salt().unwrap();
        assert_eq!(STANDARD_NO_PAD.decode(salt).unwrap().len(), 16);
    }

    #[test]
    fn hash_new_twice_gives_four_distinct_values() {
        let h = hasher();
        let (d1, s1) = h.hash_new("Secret1!").unwrap();
        let (d2, s2) = h.hash_new("Secret1!").unwrap();
        let all = [&d1, &s1, &d2, &s2];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn verify_accepts_matching_password() {
        let h = hasher();
        let (digest, salt) = h.hash_new("Secret1!").unwrap();
        assert!(h.verify("Secret1!", &salt, &digest));
    }

    #[test]
    fn verify_rejects_other_password_under_same_salt() {
        let h = hasher();
        let salt = h.generate_salt().unwrap();
        let other = h.hash("other", &salt).unwrap();
        assert!(!h.verify("Secret1!", &salt, &other));
    }

    #[test]
    fn malformed_salt_fails_hash_and_verify_quietly() {
        let h = hasher();
        assert!(matches!(
            h.hash("pw", "not base64!!"),
            Err(AuthError::InvalidSaltEncoding)
        ));
        assert!(!h.verify("pw", "not base64!!", "whatever"));
    }

    #[test]
    fn too_short_salt_is_an_encoding_error() {
        let h = hasher();
        let short = STANDARD_NO_PAD.encode([1u8, 2, 3]);
        assert!(matches!(
            h.hash("pw", &short),
            Err(AuthError::InvalidSaltEncoding)
        ));
    }

    #[test]
    fn cost_parameters_change_the_digest() {
        let a = hasher();
        let mut cfg = test_hashing_config();
        cfg.time_cost = 2;
        let b = CredentialHasher::new(&cfg).unwrap();
        let salt = a.generate_salt().unwrap();
        assert_ne!(a.hash("pw", &salt).unwrap(), b.hash("pw", &salt).unwrap());
    }

    #[tokio::test]
    async fn pool_round_trip() {
        let pool = HashingPool::new(hasher(), 1);
        let (digest, salt) = pool.hash_new("Secret1!".into()).await.unwrap();
        assert!(pool.verify("Secret1!".into(), salt.clone(), digest.clone()).await);
        assert!(!pool.verify("wrong".into(), salt, digest).await);
    }
}
