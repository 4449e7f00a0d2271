//! Authority configuration.
//!
//! Built once at startup and handed to [`crate::Authority::new`]; nothing in
//! the core reads configuration from anywhere else.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid hashing parameters: {0}")]
    Hashing(String),

    #[error("Invalid session configuration: {0}")]
    Session(String),

    #[error("Invalid persistence configuration: {0}")]
    Persistence(String),
}

/// Argon2id cost parameters and salt sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashingConfig {
    /// Iterations (t_cost).
    pub time_cost: u32,
    /// Memory in KiB (m_cost).
    pub memory_cost_kib: u32,
    /// Lanes (p_cost).
    pub parallelism: u32,
    /// Digest length in bytes.
    pub output_len: usize,
    /// Salt length in bytes.
    pub salt_len: usize,
    /// Upper bound on concurrently running hash computations.
    pub max_concurrent: usize,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            time_cost: 3,
            memory_cost_kib: 64 * 1024,
            parallelism: 2,
            output_len: 32,
            salt_len: 16,
            max_concurrent: 4,
        }
    }
}

/// Session token settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session lifetime in seconds.
    pub ttl_secs: i64,
    /// Opaque issuer label handed back with every issued session.
    pub issuer: String,
    /// Opaque audience label handed back with every issued session.
    pub audience: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 60 * 60,
            issuer: "warden".into(),
            audience: "warden-clients".into(),
        }
    }
}

/// Longest session lifetime accepted: ten years.
pub const MAX_SESSION_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

impl SessionConfig {
    /// `None` when `ttl_secs` does not fit a `TimeDelta`.
    pub fn ttl(&self) -> Option<chrono::TimeDelta> {
        chrono::TimeDelta::try_seconds(self.ttl_secs)
    }
}

/// Persistence call bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Deadline applied to every store call, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self { timeout_ms: 3_000 }
    }
}

impl PersistenceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Top-level configuration consumed by the authority.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityConfig {
    #[serde(default)]
    pub hashing: HashingConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl AuthorityConfig {
    /// Check the values are usable before any component is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let h = &self.hashing;
        if h.time_cost == 0 {
            return Err(ConfigError::Hashing("time_cost must be at least 1".into()));
        }
        if h.parallelism == 0 {
            return Err(ConfigError::Hashing("parallelism must be at least 1".into()));
        }
        if h.memory_cost_kib < 8 * h.parallelism {
            return Err(ConfigError::Hashing(format!(
                "memory_cost_kib must be at least {} for parallelism {}",
                8 * h.parallelism,
                h.parallelism
            )));
        }
        if h.output_len < 4 {
            return Err(ConfigError::Hashing("output_len must be at least 4".into()));
        }
        if h.salt_len < 8 {
            return Err(ConfigError::Hashing("salt_len must be at least 8".into()));
        }
        if h.max_concurrent == 0 {
            return Err(ConfigError::Hashing("max_concurrent must be at least 1".into()));
        }
        if self.session.ttl_secs <= 0 {
            return Err(ConfigError::Session("ttl_secs must be positive".into()));
        }
        if self.session.ttl_secs > MAX_SESSION_TTL_SECS {
            return Err(ConfigError::Session(format!(
                "ttl_secs must be at most {MAX_SESSION_TTL_SECS}"
            )));
        }
        if self.persistence.timeout_ms == 0 {
            return Err(ConfigError::Persistence("timeout_ms must be positive".into()));
        }
        Ok(())
    }
}
