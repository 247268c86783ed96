//! Error types for cached fields
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cached Field Error Enum ==
/// Unified error type for the cached field machinery.
///
/// Losing a claim race and rejecting a stale job are not errors; they are
/// reported through `ClaimOutcome::RaceLost` and
/// `JobOutcome::StaleWriteRejected`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CachedFieldError {
    /// Invalid field setup, raised eagerly at registration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Object id or model could not be normalized
    #[error("Identity resolution failed: {0}")]
    IdentityResolution(String),

    /// No cached field registered under that name
    #[error("Unknown cached field: {0}")]
    UnknownField(String),

    /// Host object does not exist
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// Compute callback failed or produced a value of the wrong kind
    #[error("{method} failed for {object}: {message}")]
    Compute {
        object: String,
        method: String,
        message: String,
    },

    /// Auxiliary storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Job could not be handed to the transport
    #[error("Transport error: {0}")]
    Transport(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for CachedFieldError {
    fn into_response(self) -> Response {
        let status = match &self {
            CachedFieldError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CachedFieldError::IdentityResolution(_) => StatusCode::BAD_REQUEST,
            CachedFieldError::UnknownField(_) => StatusCode::NOT_FOUND,
            CachedFieldError::ObjectNotFound(_) => StatusCode::NOT_FOUND,
            CachedFieldError::Compute { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            CachedFieldError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            CachedFieldError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
            CachedFieldError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for cached field operations.
pub type Result<T> = std::result::Result<T, CachedFieldError>;
