//! Request handlers.

pub mod auth;
pub mod org;
pub mod users;
