//! Error types for the loader layer
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Loader Error Enum ==
/// Unified error type for the cache and load-coordination layer.
///
/// Cloneable so a single in-flight fetch result can be handed to every
/// caller that joined it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoaderError {
    /// Remote data service call failed
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// Entity not present in the current view
    #[error("Not found: {0}")]
    NotFound(String),

    /// Load attempt refused by the circuit breaker
    #[error("Too many load attempts for {0}")]
    CircuitOpen(String),

    /// Authoritative mutation was rejected
    #[error("Mutation failed: {0}")]
    Mutation(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl LoaderError {
    /// Wraps an opaque remote-service error as a fetch failure.
    pub fn fetch(err: anyhow::Error) -> Self {
        LoaderError::Fetch(format!("{:#}", err))
    }

    /// Wraps an opaque remote-service error as a mutation failure.
    pub fn mutation(err: anyhow::Error) -> Self {
        LoaderError::Mutation(format!("{:#}", err))
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for LoaderError {
    fn into_response(self) -> Response {
        let status = match &self {
            LoaderError::Fetch(_) => StatusCode::BAD_GATEWAY,
            LoaderError::NotFound(_) => StatusCode::NOT_FOUND,
            LoaderError::CircuitOpen(_) => StatusCode::TOO_MANY_REQUESTS,
            LoaderError::Mutation(_) => StatusCode::BAD_GATEWAY,
            LoaderError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the loader layer.
pub type Result<T> = std::result::Result<T, LoaderError>;
