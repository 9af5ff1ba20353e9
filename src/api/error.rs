//! API error types and conversions
//!
//! The one place subsystem errors become status codes.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::alerts::AlertError;
use crate::ingest::PipelineError;
use crate::query::QueryError;
use crate::storage::StorageError;
use crate::tenant::AuthError;

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

/// API error types
#[derive(Debug)]
pub enum ApiError {
    /// Missing or unusable credential (401)
    Unauthorized(String),

    /// Valid credential of the wrong key type (403)
    Forbidden(String),

    /// Too many requests for this key (429)
    RateLimited,

    /// Storage operation failed
    StorageError(String),

    /// Invalid request parameters
    InvalidRequest(String),

    /// Resource not found
    NotFound(String),

    /// Internal server error
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::StorageError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match self {
            ApiError::RateLimited => "Rate limit exceeded".to_string(),
            ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::StorageError(msg)
            | ApiError::InvalidRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::Internal(msg) => msg,
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::StorageError(err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        if err.is_forbidden() {
            ApiError::Forbidden(err.to_string())
        } else if matches!(err, AuthError::InvalidExpiry) {
            ApiError::InvalidRequest(err.to_string())
        } else if err.is_unauthorized() {
            ApiError::Unauthorized(err.to_string())
        } else {
            ApiError::StorageError(err.to_string())
        }
    }
}

impl From<AlertError> for ApiError {
    fn from(err: AlertError) -> Self {
        match err {
            AlertError::NotFound(_) => ApiError::NotFound(err.to_string()),
            AlertError::Storage(e) => e.into(),
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::NotFound(_) => ApiError::NotFound(err.to_string()),
            QueryError::InvalidRange { .. } => ApiError::InvalidRequest(err.to_string()),
            QueryError::Storage(e) => e.into(),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Normalize(e) => ApiError::InvalidRequest(e.to_string()),
            PipelineError::Storage(e) => e.into(),
            PipelineError::Alert(e) => e.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}
