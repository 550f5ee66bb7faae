//! Health check endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// Current status of the service
    pub status: String,
    /// Version of the service
    pub version: String,
}

impl HealthResponse {
    fn new(status: &str) -> Self {
        Self {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::new("healthy"))
}

/// Readiness check endpoint (waits for the first equipment snapshot)
#[utoipa::path(
    get,
    path = "/ready",
    tag = "health",
    responses(
        (status = 200, description = "Service is ready", body = HealthResponse),
        (status = 503, description = "Equipment not loaded yet", body = HealthResponse)
    )
)]
pub async fn readiness_check(
    State(state): State<crate::AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    if state.services.equipment.is_ready() {
        (StatusCode::OK, Json(HealthResponse::new("ready")))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(HealthResponse::new("loading")))
    }
}
