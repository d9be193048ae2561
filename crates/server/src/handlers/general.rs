//! # General Route Handlers
//!
//! This module contains the Axum handlers for the `sqlask-server`: the root,
//! health check, and schema endpoints, and `/ask`, which answers a question.

use super::{AppError, AppState};
use crate::types::{AskRequest, HealthResponse, SchemaResponse};
use axum::{extract::State, Json};
use sqlask::ResolutionResult;
use tracing::info;

/// The handler for the root (`/`) endpoint.
pub async fn root() -> &'static str {
    "sqlask server is running."
}

/// The handler for the health check (`/health`) endpoint.
///
/// The model is served out of process and loaded before the server starts.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        model_loaded: true,
    })
}

/// Returns the schema the model is prompted with, as DDL.
pub async fn schema_handler(State(app_state): State<AppState>) -> Json<SchemaResponse> {
    Json(SchemaResponse {
        schema: app_state.resolver.schema().render_ddl(),
    })
}

/// The handler for the `/ask` endpoint.
pub async fn ask_handler(
    State(app_state): State<AppState>,
    Json(payload): Json<AskRequest>,
) -> Result<Json<ResolutionResult>, AppError> {
    info!(question = %payload.question, "Received question.");
    let result = app_state.resolver.resolve(&payload.question).await?;
    info!(
        method = %result.method,
        rows = result.results.len(),
        truncated = result.truncated,
        "Answered question."
    );
    Ok(Json(result))
}
