//! Reference data endpoints (equipment types and statuses)

use axum::{extract::State, Json};

use crate::models::{ReferenceCollection, ReferenceItem};

use super::AuthenticatedUser;

/// List equipment types
#[utoipa::path(
    get,
    path = "/equipment-types",
    tag = "references",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Equipment types, empty until loaded", body = Vec<ReferenceItem>)
    )
)]
pub async fn list_types(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
) -> Json<Vec<ReferenceItem>> {
    Json(state.services.references.list(ReferenceCollection::Types).to_vec())
}

/// List equipment statuses
#[utoipa::path(
    get,
    path = "/equipment-statuses",
    tag = "references",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Equipment statuses, empty until loaded", body = Vec<ReferenceItem>)
    )
)]
pub async fn list_statuses(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
) -> Json<Vec<ReferenceItem>> {
    Json(state.services.references.list(ReferenceCollection::Statuses).to_vec())
}
