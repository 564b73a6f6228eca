//! Application error types and HTTP status mapping.
//!
//! Every handler and pipeline stage returns [`AppError`]; the
//! `IntoResponse` impl renders the flat `{"error": "<message>"}` body the
//! browser client expects.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Error model used throughout request parsing, the upload pipeline, and
/// external service calls.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Client input error (missing file, bad extension, malformed body).
    #[error("{0}")]
    InvalidRequest(String),
    /// Requested resource does not exist.
    #[error("{0}")]
    NotFound(String),
    /// External service failure (transcription, summarization, translation).
    /// The underlying message is surfaced verbatim.
    #[error("{0}")]
    Service(String),
    /// History store or asset store I/O failure.
    #[error("{0}")]
    Storage(String),
    /// Anything else that went wrong server-side.
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// Creates a `400 Bad Request` error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Creates a `404 Not Found` error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Creates a `500` error for an external service failure.
    pub fn service(message: impl Into<String>) -> Self {
        Self::Service(message.into())
    }

    /// Creates a `500` error for a storage failure.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Creates a generic internal server error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

#[derive(Debug, Serialize)]
struct ErrorPayload {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Service(_) | AppError::Storage(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let payload = ErrorPayload {
            error: self.to_string(),
        };

        (status, Json(payload)).into_response()
    }
}
