//! REST API layer: route handlers, DTOs, router composition, and the
//! `OpenAPI` document.
//!
//! Administrative endpoints are mounted under `/api/v1/admin`; the health
//! check and the API documentation live at the root.

pub mod dto;
pub mod handlers;

use axum::Router;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::app_state::AppState;
use crate::auth::{USER_ID_HEADER, USER_ROLE_HEADER};

/// Path the generated `OpenAPI` document is served from.
pub const OPENAPI_PATH: &str = "/api-docs/openapi.json";

/// Registers the identity headers as security schemes.
#[derive(Debug)]
struct IdentityHeaders;

impl Modify for IdentityHeaders {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "userId",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(USER_ID_HEADER))),
            );
            components.add_security_scheme(
                "userRole",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(USER_ROLE_HEADER))),
            );
        }
    }
}

/// `OpenAPI` documentation for the gateway.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "relay-gateway",
        description = "WebSocket hub, signed webhook dispatcher, and rate-limited admin API"
    ),
    modifiers(&IdentityHeaders),
    security(("userId" = [], "userRole" = [])),
    paths(
        handlers::system::health_handler,
        handlers::webhooks::list_webhooks,
        handlers::webhooks::list_events,
        handlers::webhooks::create_webhook,
        handlers::webhooks::get_webhook,
        handlers::webhooks::update_webhook,
        handlers::webhooks::delete_webhook,
        handlers::webhooks::toggle_webhook,
        handlers::webhooks::test_webhook,
        handlers::webhooks::list_logs,
        handlers::webhooks::clear_logs,
        handlers::notifications::notify_user,
        handlers::notifications::announce,
        handlers::notifications::online_users,
    ),
    tags(
        (name = "System", description = "Service health"),
        (name = "Webhooks", description = "Webhook subscriptions and delivery logs"),
        (name = "Notifications", description = "Live pushes and presence"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
        .merge(docs_routes())
}

#[cfg(feature = "swagger-ui")]
fn docs_routes() -> Router<AppState> {
    use utoipa_swagger_ui::SwaggerUi;

    Router::new().merge(SwaggerUi::new("/swagger-ui").url(OPENAPI_PATH, ApiDoc::openapi()))
}

#[cfg(not(feature = "swagger-ui"))]
fn docs_routes() -> Router<AppState> {
    use axum::Json;
    use axum::routing::get;

    Router::new().route(OPENAPI_PATH, get(|| async { Json(ApiDoc::openapi()) }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_admin_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/v1/admin/webhooks"));
        assert!(doc.paths.paths.contains_key("/api/v1/admin/webhooks/{id}/logs"));
        assert!(doc.paths.paths.contains_key("/health"));
    }

    #[test]
    fn document_declares_identity_headers() {
        let doc = ApiDoc::openapi();
        let schemes = doc
            .components
            .map(|c| c.security_schemes)
            .unwrap_or_default();
        assert!(schemes.contains_key("userId"));
        assert!(schemes.contains_key("userRole"));
    }
}
