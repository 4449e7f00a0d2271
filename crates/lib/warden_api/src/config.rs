//! API server configuration.

use std::str::FromStr;

use thiserror::Error;
use warden_core::config::AuthorityConfig;

#[derive(Debug, Error)]
pub enum EnvConfigError {
    #[error("{var}: cannot parse '{value}'")]
    Invalid { var: &'static str, value: String },
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// Hashing, session and persistence settings for the authority.
    pub authority: AuthorityConfig,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                    | Default                           |
    /// |-----------------------------|-----------------------------------|
    /// | `BIND_ADDR`                 | `127.0.0.1:3100`                  |
    /// | `DATABASE_URL`              | `postgres://localhost:5432/warden`|
    /// | `WARDEN_ARGON2_TIME`        | `3`                               |
    /// | `WARDEN_ARGON2_MEMORY_KIB`  | `65536`                           |
    /// | `WARDEN_ARGON2_PARALLELISM` | `2`                               |
    /// | `WARDEN_ARGON2_KEY_LEN`     | `32`                              |
    /// | `WARDEN_ARGON2_SALT_LEN`    | `16`                              |
    /// | `WARDEN_HASH_WORKERS`       | `4`                               |
    /// | `WARDEN_SESSION_TTL_SECS`   | `3600`                            |
    /// | `WARDEN_TOKEN_ISSUER`       | `warden`                          |
    /// | `WARDEN_TOKEN_AUDIENCE`     | `warden-clients`                  |
    /// | `WARDEN_DB_TIMEOUT_MS`      | `3000`                            |
    pub fn from_env() -> Result<Self, EnvConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Self::from_env`] over an arbitrary variable source.
    pub fn from_lookup<F>(get: F) -> Result<Self, EnvConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut authority = AuthorityConfig::default();

        let h = &mut authority.hashing;
        h.time_cost = parse_or(&get, "WARDEN_ARGON2_TIME", h.time_cost)?;
        h.memory_cost_kib = parse_or(&get, "WARDEN_ARGON2_MEMORY_KIB", h.memory_cost_kib)?;
        h.parallelism = parse_or(&get, "WARDEN_ARGON2_PARALLELISM", h.parallelism)?;
        h.output_len = parse_or(&get, "WARDEN_ARGON2_KEY_LEN", h.output_len)?;
        h.salt_len = parse_or(&get, "WARDEN_ARGON2_SALT_LEN", h.salt_len)?;
        h.max_concurrent = parse_or(&get, "WARDEN_HASH_WORKERS", h.max_concurrent)?;

        let s = &mut authority.session;
        s.ttl_secs = parse_or(&get, "WARDEN_SESSION_TTL_SECS", s.ttl_secs)?;
        if let Some(issuer) = get("WARDEN_TOKEN_ISSUER") {
            s.issuer = issuer;
        }
        if let Some(audience) = get("WARDEN_TOKEN_AUDIENCE") {
            s.audience = audience;
        }

        let p = &mut authority.persistence;
        p.timeout_ms = parse_or(&get, "WARDEN_DB_TIMEOUT_MS", p.timeout_ms)?;

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:3100".into()),
            pg_connection_url: get("DATABASE_URL")
                .unwrap_or_else(|| "postgres://localhost:5432/warden".into()),
            authority,
        })
    }
}

fn parse_or<F, T>(get: &F, var: &'static str, default: T) -> Result<T, EnvConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match get(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| EnvConfigError::Invalid { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = ApiConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.bind_addr, "127.0.0.1:3100");
        assert_eq!(cfg.authority, AuthorityConfig::default());
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = ApiConfig::from_lookup(lookup(&[
            ("WARDEN_ARGON2_MEMORY_KIB", "19456"),
            ("WARDEN_SESSION_TTL_SECS", "900"),
            ("WARDEN_TOKEN_ISSUER", "auth.example"),
            ("WARDEN_DB_TIMEOUT_MS", " 1500 "),
        ]))
        .unwrap();
        assert_eq!(cfg.authority.hashing.memory_cost_kib, 19456);
        assert_eq!(cfg.authority.session.ttl_secs, 900);
        assert_eq!(cfg.authority.session.issuer, "auth.example");
        assert_eq!(cfg.authority.persistence.timeout_ms, 1500);
    }

    #[test]
    fn oversized_ttl_parses_but_fails_validation() {
        let cfg =
            ApiConfig::from_lookup(lookup(&[("WARDEN_SESSION_TTL_SECS", "10000000000000")]))
                .unwrap();
        assert!(cfg.authority.validate().is_err());
    }

    #[test]
    fn unparsable_value_names_the_variable() {
        let err = ApiConfig::from_lookup(lookup(&[("WARDEN_HASH_WORKERS", "many")])).unwrap_err();
        assert!(err.to_string().contains("WARDEN_HASH_WORKERS"));
    }
}
