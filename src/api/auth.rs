//! Authentication endpoints

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::error::{AppError, AppResult};

use super::AuthenticatedUser;

#[derive(Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    /// Shared access key
    #[validate(length(min = 1, message = "Access key is required"))]
    pub key: String,
}

#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
pub struct SessionInfo {
    pub session_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Open a session with the access key
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session opened", body = LoginResponse),
        (status = 401, description = "Wrong access key", body = crate::error::ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<crate::AppState>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let session = state.services.auth.login(&request.key)?;
    Ok(Json(LoginResponse {
        expires_at: session.claims.expires_at(),
        token: session.token,
        token_type: "Bearer".to_string(),
    }))
}

/// Close the current session
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 204, description = "Session closed"),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn logout(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> StatusCode {
    state.services.auth.logout(&claims);
    StatusCode::NO_CONTENT
}

/// Describe the current session
#[utoipa::path(
    get,
    path = "/auth/session",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Session details", body = SessionInfo),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn session(AuthenticatedUser(claims): AuthenticatedUser) -> Json<SessionInfo> {
    Json(SessionInfo {
        issued_at: DateTime::from_timestamp(claims.iat, 0).unwrap_or_default(),
        expires_at: claims.expires_at(),
        session_id: claims.jti,
    })
}
