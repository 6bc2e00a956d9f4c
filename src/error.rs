//! Error taxonomy shared by the core, the storage layer and the HTTP API.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Errors surfaced to callers.
///
/// Domain errors (`InvalidArgument`, `NotActive`, `TooFar`, `NotFound`,
/// `InvalidShareCode`) are permanent for the given input and are never
/// retried. Only [`Error::is_transient`] database failures are.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Incident {id} is not active")]
    NotActive { id: String },

    #[error("Too far from incident: {distance_meters:.0} m away, limit is {limit_meters:.0} m")]
    TooFar {
        distance_meters: f64,
        limit_meters: f64,
    },

    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid share code: {0}")]
    InvalidShareCode(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Whether retrying the same operation might succeed.
    ///
    /// Only connectivity-style database failures qualify.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Database(err) => matches!(
                err,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            _ => false,
        }
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Error::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT"),
            Error::InvalidShareCode(_) => (StatusCode::BAD_REQUEST, "INVALID_SHARE_CODE"),
            Error::NotActive { .. } => (StatusCode::CONFLICT, "NOT_ACTIVE"),
            Error::TooFar { .. } => (StatusCode::FORBIDDEN, "TOO_FAR"),
            Error::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Error::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Error::Database(err) => {
                tracing::error!(error = %err, "Database error");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, Json(body)).into_response()
    }
}
