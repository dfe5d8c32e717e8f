//! Error types for edim-api

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use edim_common::api::ApiAuthError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Malformed request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Submitted values do not match the catalog (400); lists the offending keys
    #[error("Validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),

    /// Missing or unknown API key (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Key lacks a grant for the requested scope and action (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// edim-common error, mapped by kind
    #[error(transparent)]
    Common(#[from] edim_common::Error),
}

impl From<ApiAuthError> for ApiError {
    fn from(err: ApiAuthError) -> Self {
        match err {
            ApiAuthError::MissingKey | ApiAuthError::UnknownKey => ApiError::Unauthorized(err.to_string()),
            ApiAuthError::Forbidden { .. } => ApiError::Forbidden(err.to_string()),
            ApiAuthError::DatabaseError(msg) => ApiError::Internal(msg),
        }
    }
}

/// Bodies that are not JSON or do not fit the expected shape
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(vec![rejection.body_text()])
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, fields) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, Vec::new()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, Vec::new()),
            ApiError::Validation(fields) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                format!("Invalid values: {}", fields.join(", ")),
                fields,
            ),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg, Vec::new()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg, Vec::new()),
            ApiError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg, Vec::new())
            }
            ApiError::Common(err) => match err {
                edim_common::Error::UnresolvedSlugs(slugs) => {
                    let fields: Vec<String> = slugs.iter().map(ToString::to_string).collect();
                    (
                        StatusCode::BAD_REQUEST,
                        "VALIDATION_ERROR",
                        format!("Unknown dimension or value: {}", fields.join(", ")),
                        fields,
                    )
                }
                edim_common::Error::InvalidInput(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg, Vec::new())
                }
                edim_common::Error::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, Vec::new()),
                other => {
                    error!("Request failed: {}", other);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "COMMON_ERROR",
                        other.to_string(),
                        Vec::new(),
                    )
                }
            },
        };

        let mut body = json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        });
        if !fields.is_empty() {
            body["error"]["fields"] = json!(fields);
        }

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
