//! API error types and transport mappings.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::DependencyUnavailable(_) => "dependency_unavailable",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::DependencyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Map to a gRPC status. Response bodies never leak internal details.
    pub fn to_status(&self) -> tonic::Status {
        match self {
            Self::Validation(msg) => tonic::Status::invalid_argument(msg.clone()),
            Self::Unauthorized(msg) => tonic::Status::unauthenticated(msg.clone()),
            Self::Forbidden(msg) => tonic::Status::permission_denied(msg.clone()),
            Self::NotFound(msg) => tonic::Status::not_found(msg.clone()),
            Self::Conflict(msg) => tonic::Status::aborted(msg.clone()),
            Self::DependencyUnavailable(_) => {
                tonic::Status::unavailable("dependency unavailable")
            }
            Self::Internal(_) => tonic::Status::internal("internal error"),
        }
    }
}

impl From<depot_core::Error> for ApiError {
    fn from(err: depot_core::Error) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<depot_catalog::CatalogError> for ApiError {
    fn from(err: depot_catalog::CatalogError) -> Self {
        use depot_catalog::CatalogError;
        match err {
            CatalogError::NotFound(msg) => Self::NotFound(msg),
            CatalogError::Conflict(msg) => Self::Conflict(msg),
            CatalogError::Database(e) => Self::DependencyUnavailable(e.to_string()),
            CatalogError::Config(msg) | CatalogError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<depot_storage::StorageError> for ApiError {
    fn from(err: depot_storage::StorageError) -> Self {
        use depot_storage::StorageError;
        match err {
            StorageError::NotFound(msg) => Self::NotFound(msg),
            StorageError::InvalidKey(msg) | StorageError::InvalidPath(msg) => Self::Internal(msg),
            StorageError::Config(msg) => Self::Internal(msg),
            StorageError::Io(e) => Self::DependencyUnavailable(e.to_string()),
            StorageError::S3(e) => Self::DependencyUnavailable(e.to_string()),
        }
    }
}

impl From<ApiError> for tonic::Status {
    fn from(err: ApiError) -> Self {
        err.to_status()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: match &self {
                // Internal details stay in the logs.
                Self::Internal(_) => "internal error".to_string(),
                other => other.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::DependencyUnavailable("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::Conflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_grpc_mapping_hides_internal_detail() {
        let status = ApiError::Internal("secret path".into()).to_status();
        assert_eq!(status.code(), tonic::Code::Internal);
        assert!(!status.message().contains("secret"));
    }
}
