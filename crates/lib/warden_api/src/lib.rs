//! # warden_api
//!
//! HTTP API library for Warden.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use warden_core::Authority;
use warden_core::auth::catalog;
use warden_core::auth::guard::GuardOptions;

use crate::handlers::{auth, org, users};
use crate::middleware::guard::{GuardedState, enforce};

/// Route paths.
pub mod routes {
    pub const POST_AUTH_REGISTER: &str = "/v1/auth/register";
    pub const POST_AUTH_LOGIN: &str = "/v1/auth/login";
    pub const POST_AUTH_REFRESH: &str = "/v1/auth/refresh";
    pub const POST_AUTH_LOGOUT: &str = "/v1/auth/logout";
    pub const POST_AUTH_LOGOUT_ALL: &str = "/v1/auth/logout-all";
    pub const GET_AUTH_ME: &str = "/v1/auth/me";
    pub const GET_AUTH_ME_PERMISSIONS: &str = "/v1/auth/me/permissions";
    pub const GET_USER_PERMISSIONS: &str = "/v1/users/{id}/permissions";
    pub const GET_ORG_HEALTH: &str = "/v1/org/health";
}

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub authority: Arc<Authority>,
}

/// Run embedded database migrations.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    warden_core::migrate::migrate(pool).await
}

/// Put every route in `group` behind the guard with `options`.
fn guarded(group: Router<AppState>, state: &AppState, options: GuardOptions) -> Router<AppState> {
    group.layer(axum::middleware::from_fn_with_state(
        GuardedState::new(state.clone(), options),
        enforce,
    ))
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no session required)
    let public = Router::new()
        .route(routes::POST_AUTH_REGISTER, post(auth::register_handler))
        .route(routes::POST_AUTH_LOGIN, post(auth::login_handler))
        .route(routes::POST_AUTH_REFRESH, post(auth::refresh_handler));

    let authenticated = guarded(
        Router::new()
            .route(routes::POST_AUTH_LOGOUT, post(auth::logout_handler))
            .route(routes::POST_AUTH_LOGOUT_ALL, post(auth::logout_all_handler))
            .route(routes::GET_AUTH_ME, get(auth::me_handler))
            .route(
                routes::GET_AUTH_ME_PERMISSIONS,
                get(auth::my_permissions_handler),
            ),
        &state,
        GuardOptions::authenticated(),
    );

    let user_admin = guarded(
        Router::new().route(
            routes::GET_USER_PERMISSIONS,
            get(users::user_permissions_handler),
        ),
        &state,
        GuardOptions::permission(catalog::USER_VIEW),
    );

    let org_health = guarded(
        Router::new().route(routes::GET_ORG_HEALTH, get(org::health_handler)),
        &state,
        GuardOptions::permission(catalog::ORG_VIEW_HEALTH).require_entitlement(),
    );

    Router::new()
        .merge(public)
        .merge(authenticated)
        .merge(user_admin)
        .merge(org_health)
        .layer(cors)
        .with_state(state)
}
