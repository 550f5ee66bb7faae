//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, equipment, health, references};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Equipment Inventory API",
        version = "0.3.0",
        description = "Live equipment inventory backed by a realtime JSON store"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::login,
        auth::logout,
        auth::session,
        // Equipment
        equipment::list_equipment,
        equipment::stream_equipment,
        equipment::get_equipment,
        equipment::create_equipment,
        equipment::update_equipment,
        equipment::delete_equipment,
        // Reference data
        references::list_types,
        references::list_statuses,
    ),
    components(
        schemas(
            // Auth
            auth::LoginRequest,
            auth::LoginResponse,
            auth::SessionInfo,
            // Equipment
            crate::models::EquipmentId,
            crate::models::EquipmentRecord,
            crate::models::EquipmentDraft,
            crate::models::ReferenceRef,
            equipment::EquipmentListResponse,
            equipment::EquipmentDetails,
            equipment::EquipmentIdResponse,
            // Reference data
            crate::models::ReferenceItem,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Access-key sessions"),
        (name = "equipment", description = "Equipment records"),
        (name = "references", description = "Equipment types and statuses")
    )
)]
pub struct ApiDoc;

/// Registers the `bearer_auth` scheme referenced by secured paths
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
