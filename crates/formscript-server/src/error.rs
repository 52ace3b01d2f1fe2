use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use formscript_sandbox::redact::user_facing_reason;
use formscript_sandbox::ExecutionError;
use serde_json::json;

use crate::repository::RepositoryError;

/// Application-level error type for HTTP handlers.
///
/// Implements [`IntoResponse`] to produce consistent JSON error bodies of the
/// form `{ "message": ... }`. Script failures additionally carry the
/// redacted reason and its classification.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The requested resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The form script failed.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// The form store failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "message": msg })),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "message": msg })),
            AppError::Execution(err) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "message": "Script execution failed",
                    "error": user_facing_reason(err),
                    "kind": err.kind(),
                }),
            ),
            AppError::Repository(err) => {
                tracing::error!(error = %err, "Repository error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "message": "An internal error occurred" }),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "message": "An internal error occurred" }),
                )
            }
        };

        (status, axum::Json(body)).into_response()
    }
}
