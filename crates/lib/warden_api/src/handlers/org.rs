//! Organisation handlers.

use axum::Json;

use crate::models::{ApiResponse, HealthResponse};

/// `GET /v1/org/health`: liveness for entitled operators.
pub async fn health_handler() -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::ok(HealthResponse { status: "ok" }))
}
