use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sqlask::{GenerationFailure, ResolveError};
use tracing::{error, warn};

/// A custom error type for the server application.
///
/// This enum encapsulates the errors a request can end with, so they can be
/// converted into appropriate HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Errors originating from resolving a question.
    Resolve(ResolveError),
    /// Generic internal server errors.
    Internal(anyhow::Error),
}

/// Conversion from `ResolveError` to `AppError`.
impl From<ResolveError> for AppError {
    fn from(err: ResolveError) -> Self {
        AppError::Resolve(err)
    }
}

/// Conversion from `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status_code, body) = match self {
            AppError::Resolve(err) => match err {
                ResolveError::NoInput => (
                    StatusCode::BAD_REQUEST,
                    json!({ "error": "The question must not be empty." }),
                ),
                ResolveError::Generation(failure) => {
                    error!("GenerationFailure: {:?}", failure);
                    let status = match failure {
                        GenerationFailure::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                        _ => StatusCode::BAD_GATEWAY,
                    };
                    (status, json!({ "error": format!("SQL generation failed: {failure}") }))
                }
                ResolveError::Validation {
                    reason,
                    detail,
                    rejected_sql,
                } => {
                    warn!(%reason, %detail, "Rejected generated SQL.");
                    (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        json!({
                            "error": "The generated SQL was rejected and not executed.",
                            "reason": reason,
                            "detail": detail,
                            "rejected_sql_unsafe": rejected_sql,
                        }),
                    )
                }
                ResolveError::Execution { message, sql } => {
                    error!(%sql, "Query execution failed: {message}");
                    (
                        StatusCode::BAD_REQUEST,
                        json!({ "error": format!("Query execution failed: {message}"), "sql": sql }),
                    )
                }
                ResolveError::Internal(msg) => {
                    error!("Internal resolver error: {msg}");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        json!({ "error": "An internal server error occurred." }),
                    )
                }
            },
            AppError::Internal(err) => {
                error!("Internal server error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "An internal server error occurred." }),
                )
            }
        };

        (status_code, Json(body)).into_response()
    }
}
