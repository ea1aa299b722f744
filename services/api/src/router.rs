//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST endpoints, WebSocket endpoint, and OpenAPI documentation.

use crate::{
    handlers,
    models::{
        ChatMessage, ErrorResponse, HealthResponse, MessageKind, MessageMetadata, ToolSummary,
    },
    state::AppState,
    ws::ws_handler,
};

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(handlers::health, handlers::list_tools),
    components(
        schemas(ChatMessage, MessageKind, MessageMetadata, ErrorResponse, HealthResponse, ToolSummary)
    ),
    tags(
        (name = "Deco Assistant API", description = "Voice and chat onboarding assistant for Deco routers")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/health", get(handlers::health))
        .route("/tools", get(handlers::list_tools))
        .route("/ws", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
        .layer(TraceLayer::new_for_http())
}
