//! API handlers for the inventory REST endpoints

pub mod auth;
pub mod equipment;
pub mod health;
pub mod openapi;
pub mod references;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{error::AppError, services::auth::SessionClaims, AppState};

/// Extractor for an open session from the bearer token
pub struct AuthenticatedUser(pub SessionClaims);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Authentication("Invalid authorization header format".to_string()))?;

        let claims = state.services.auth.verify(token)?;
        Ok(AuthenticatedUser(claims))
    }
}

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Authentication
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/session", get(auth::session))
        // Equipment
        .route("/equipment", get(equipment::list_equipment).post(equipment::create_equipment))
        .route("/equipment/stream", get(equipment::stream_equipment))
        .route(
            "/equipment/:id",
            get(equipment::get_equipment)
                .put(equipment::update_equipment)
                .delete(equipment::delete_equipment),
        )
        // Reference data
        .route("/equipment-types", get(references::list_types))
        .route("/equipment-statuses", get(references::list_statuses))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
