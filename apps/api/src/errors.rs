use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::repository::StoreError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("missing required fields")]
    MissingRequiredFields,

    #[error("invalid status")]
    InvalidStatus,

    #[error("invalid type")]
    InvalidType,

    #[error("invalid source")]
    InvalidSource,

    /// A caller-supplied payload failed schema validation.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// A flag/subflag id that does not resolve for the user, or a subflag that
    /// belongs to a different flag.
    #[error("invalid context reference")]
    InvalidReference,

    #[error("invalid cursor")]
    InvalidCursor,

    #[error("not found")]
    NotFound,

    /// A collaborator the operation needs was not wired at startup.
    #[error("dependency missing: {0}")]
    DependencyMissing(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AppError::NotFound,
            StoreError::InvalidCursor => AppError::InvalidCursor,
            StoreError::Database(e) => AppError::Database(e),
            StoreError::Decode(msg) => AppError::Internal(anyhow::anyhow!(msg)),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::MissingRequiredFields => (
                StatusCode::BAD_REQUEST,
                "missing_required_fields",
                self.to_string(),
            ),
            AppError::InvalidStatus => (StatusCode::BAD_REQUEST, "invalid_status", self.to_string()),
            AppError::InvalidType => (StatusCode::BAD_REQUEST, "invalid_type", self.to_string()),
            AppError::InvalidSource => (StatusCode::BAD_REQUEST, "invalid_source", self.to_string()),
            AppError::InvalidPayload(reason) => {
                (StatusCode::BAD_REQUEST, "invalid_payload", reason.clone())
            }
            AppError::InvalidReference => (
                StatusCode::BAD_REQUEST,
                "invalid_reference",
                self.to_string(),
            ),
            AppError::InvalidCursor => (StatusCode::BAD_REQUEST, "invalid_cursor", self.to_string()),
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                "not_found",
                "resource not found".to_string(),
            ),
            AppError::DependencyMissing(what) => {
                tracing::error!("Dependency missing: {what}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "dependency_missing",
                    "A required service is not configured".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
