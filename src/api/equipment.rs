//! Equipment API endpoints

use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use serde::Serialize;
use tokio_stream::{wrappers::WatchStream, Stream, StreamExt};
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    filter::EquipmentFilter,
    models::{equipment::equipment_url, EquipmentDraft, EquipmentId, EquipmentRecord},
    services::equipment::EquipmentListing,
};

use super::AuthenticatedUser;

#[derive(Serialize, ToSchema)]
pub struct EquipmentListResponse {
    pub items: Vec<EquipmentRecord>,
    pub total: usize,
    /// Set when the live feed is failing and the list may be out of date
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale: Option<String>,
}

impl From<EquipmentListing> for EquipmentListResponse {
    fn from(listing: EquipmentListing) -> Self {
        Self {
            total: listing.items.len(),
            items: listing.items,
            stale: listing.stale,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct EquipmentDetails {
    #[serde(flatten)]
    pub record: EquipmentRecord,
    /// Link encoded in the printed QR label
    pub qr_url: String,
}

#[derive(Serialize, ToSchema)]
pub struct EquipmentIdResponse {
    pub id: EquipmentId,
}

/// List equipment with optional filters
#[utoipa::path(
    get,
    path = "/equipment",
    tag = "equipment",
    security(("bearer_auth" = [])),
    params(EquipmentFilter),
    responses(
        (status = 200, description = "Filtered equipment list", body = EquipmentListResponse)
    )
)]
pub async fn list_equipment(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Query(filter): Query<EquipmentFilter>,
) -> Json<EquipmentListResponse> {
    Json(state.services.equipment.list(&filter).into())
}

/// Stream the filtered list on every change
#[utoipa::path(
    get,
    path = "/equipment/stream",
    tag = "equipment",
    security(("bearer_auth" = [])),
    params(EquipmentFilter),
    responses(
        (status = 200, description = "Server-sent events, one `equipment` event per snapshot", content_type = "text/event-stream")
    )
)]
pub async fn stream_equipment(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Query(filter): Query<EquipmentFilter>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = WatchStream::new(state.services.equipment.subscribe())
        .filter(|view| view.loaded)
        .filter_map(move |view| {
            let response = EquipmentListResponse::from(EquipmentListing {
                items: filter.apply(&view.records),
                stale: view.error,
            });
            match Event::default().event("equipment").json_data(&response) {
                Ok(event) => Some(Ok(event)),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode equipment event");
                    None
                }
            }
        });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Get equipment by ID
#[utoipa::path(
    get,
    path = "/equipment/{id}",
    tag = "equipment",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Equipment ID")),
    responses(
        (status = 200, description = "Equipment details", body = EquipmentDetails),
        (status = 404, description = "Equipment not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_equipment(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<String>,
) -> AppResult<Json<EquipmentDetails>> {
    let id = EquipmentId::from(id);
    let record = state.services.equipment.get_by_id(&id).await?;
    Ok(Json(EquipmentDetails {
        qr_url: equipment_url(&state.config.identity.public_host, &id),
        record,
    }))
}

/// Create equipment
#[utoipa::path(
    post,
    path = "/equipment",
    tag = "equipment",
    security(("bearer_auth" = [])),
    request_body = EquipmentDraft,
    responses(
        (status = 201, description = "Equipment created", body = EquipmentIdResponse),
        (status = 400, description = "Invalid fields", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_equipment(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Json(draft): Json<EquipmentDraft>,
) -> AppResult<(StatusCode, Json<EquipmentIdResponse>)> {
    let id = state.services.equipment.create(&draft).await?;
    Ok((StatusCode::CREATED, Json(EquipmentIdResponse { id })))
}

/// Replace every field of an equipment record
#[utoipa::path(
    put,
    path = "/equipment/{id}",
    tag = "equipment",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Equipment ID")),
    request_body = EquipmentDraft,
    responses(
        (status = 200, description = "Equipment saved", body = EquipmentIdResponse),
        (status = 400, description = "Invalid fields", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_equipment(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<String>,
    Json(draft): Json<EquipmentDraft>,
) -> AppResult<Json<EquipmentIdResponse>> {
    let id = EquipmentId::from(id);
    state.services.equipment.update(&id, &draft).await?;
    Ok(Json(EquipmentIdResponse { id }))
}

/// Delete equipment
#[utoipa::path(
    delete,
    path = "/equipment/{id}",
    tag = "equipment",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Equipment ID")),
    responses(
        (status = 204, description = "Equipment deleted")
    )
)]
pub async fn delete_equipment(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state.services.equipment.delete(&EquipmentId::from(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
