//! Axum Handlers for the REST API
//!
//! Small read-only endpoints next to the WebSocket. They use `utoipa` doc
//! comments to generate OpenAPI documentation.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use deco_core::tools::CallbackService;
use rmcp::model::Tool;
use std::sync::Arc;
use tracing::error;

use crate::{
    models::{ErrorResponse, HealthResponse, ToolSummary},
    state::AppState,
};

pub enum ApiError {
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// Converts MCP tool listings into their JSON-schema summaries.
pub fn summarize_tools(tools: Vec<Tool>) -> anyhow::Result<Vec<ToolSummary>> {
    tools
        .into_iter()
        .map(|t| {
            Ok(ToolSummary {
                name: t.name.to_string(),
                description: t.description.map(|d| d.to_string()).unwrap_or_default(),
                parameters: serde_json::to_value(&*t.input_schema)?,
            })
        })
        .collect()
}

/// Liveness check.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        deployment: state.config.azure.deployment.clone(),
    })
}

/// List the tools registered with every realtime session.
#[utoipa::path(
    get,
    path = "/tools",
    responses(
        (status = 200, description = "Registered tools", body = [ToolSummary]),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn list_tools() -> Result<Json<Vec<ToolSummary>>, ApiError> {
    let summaries = summarize_tools(CallbackService::definitions())?;
    Ok(Json(summaries))
}
