//! Guard middleware: bearer extraction and `Guard::enforce` at the route
//! boundary.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use warden_core::auth::guard::{GuardOptions, extract_bearer};
use warden_core::models::auth::UserIdentity;

use crate::AppState;
use crate::error::AppError;

/// Identity of the caller, inserted into request extensions once the guard
/// allows the request.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub UserIdentity);

/// Middleware state: the app plus what this route group requires.
#[derive(Clone)]
pub struct GuardedState {
    pub app: AppState,
    pub options: Arc<GuardOptions>,
}

impl GuardedState {
    pub fn new(app: AppState, options: GuardOptions) -> Self {
        Self {
            app,
            options: Arc::new(options),
        }
    }
}

/// Axum middleware: runs the guard and injects [`AuthenticatedUser`].
pub async fn enforce(
    State(guarded): State<GuardedState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let token = extract_bearer(header);

    let identity = guarded
        .app
        .authority
        .guard()
        .enforce(token, &guarded.options)
        .await?;

    request.extensions_mut().insert(AuthenticatedUser(identity));
    Ok(next.run(request).await)
}
