//! # warden_core
//!
//! Credential & session authority: password hashing, session token
//! lifecycle, role-based permission evaluation, and the guard that composes
//! them at the request boundary.

pub mod auth;
pub mod authority;
pub mod clock;
pub mod config;
pub mod migrate;
pub mod models;
pub mod store;

pub use auth::AuthError;
pub use authority::Authority;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
