//! Centralized API error handling
//!
//! A single closed error taxonomy for the whole service. Domain code raises
//! typed errors which are converted into `ApiError` at the handler boundary;
//! `IntoResponse` maps each variant to a status code and the JSON body
//! `{"errors": [{"type", "message", "statusCode"}]}`. Internal error detail is
//! logged but never sent to the client.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// API error type with HTTP status code mapping
#[derive(Error, Debug)]
pub enum ApiError {
    /// 400 - missing or malformed input, with field-level messages
    #[error("{0}")]
    Validation(String),

    /// 400 - duplicate email on registration or user creation
    #[error("{0}")]
    Conflict(String),

    /// 401 - missing/invalid/expired/revoked token, or bad credentials
    #[error("{0}")]
    Authentication(String),

    /// 403 - authenticated but role not permitted
    #[error("{0}")]
    Authorization(String),

    /// 404 - tenant or user id absent
    #[error("{0}")]
    NotFound(String),

    /// 500 - key material unreadable, store unavailable, unexpected failure
    #[error("{0}")]
    Internal(String),
}

/// JSON error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub errors: Vec<ErrorDetails>,
}

/// One error entry in the response body
#[derive(Serialize)]
pub struct ErrorDetails {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(rename = "statusCode")]
    pub status_code: u16,
}

impl ApiError {
    /// Get the error type name used in the response body
    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "ValidationError",
            ApiError::Conflict(_) => "ConflictError",
            ApiError::Authentication(_) => "AuthenticationError",
            ApiError::Authorization(_) => "AuthorizationError",
            ApiError::NotFound(_) => "NotFoundError",
            ApiError::Internal(_) => "InternalServerError",
        }
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::BAD_REQUEST,
            ApiError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ApiError::Authorization(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message sent to the client. Internal detail stays in the logs.
    fn client_message(&self) -> String {
        match self {
            ApiError::Internal(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let kind = self.error_type();

        match &self {
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, kind = %kind, "Server error occurred");
            }
            _ => {
                tracing::debug!(error = %self, kind = %kind, "Client error occurred");
            }
        }

        let body = ErrorResponse {
            errors: vec![ErrorDetails {
                kind: kind.to_string(),
                message: self.client_message(),
                status_code: status.as_u16(),
            }],
        };

        (status, Json(body)).into_response()
    }
}

// Convenience conversions from common error types

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = err
            .field_errors()
            .into_iter()
            .map(|(field, errors)| {
                let detail = errors
                    .iter()
                    .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                    .collect::<Vec<_>>()
                    .join(", ");
                if detail.is_empty() {
                    format!("{} is invalid", field)
                } else {
                    format!("{}: {}", field, detail)
                }
            })
            .collect();
        messages.sort();
        ApiError::Validation(messages.join("; "))
    }
}

impl From<bcrypt::BcryptError> for ApiError {
    fn from(err: bcrypt::BcryptError) -> Self {
        ApiError::Internal(format!("Password hashing failed: {}", err))
    }
}

/// Result type alias using ApiError
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_types() {
        assert_eq!(
            ApiError::Validation("bad".to_string()).error_type(),
            "ValidationError"
        );
        assert_eq!(
            ApiError::Authentication("bad".to_string()).error_type(),
            "AuthenticationError"
        );
        assert_eq!(
            ApiError::Authorization("bad".to_string()).error_type(),
            "AuthorizationError"
        );
        assert_eq!(
            ApiError::NotFound("bad".to_string()).error_type(),
            "NotFoundError"
        );
        assert_eq!(
            ApiError::Conflict("bad".to_string()).error_type(),
            "ConflictError"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::Validation("x".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Conflict("x".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Authentication("x".to_string()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Authorization("x".to_string()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::NotFound("x".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Internal("x".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_detail_redacted() {
        let err = ApiError::Internal("connection refused at 10.0.0.3:5432".to_string());
        assert_eq!(err.client_message(), "Internal server error");

        let err = ApiError::NotFound("User not found".to_string());
        assert_eq!(err.client_message(), "User not found");
    }

    #[test]
    fn test_sqlx_row_not_found_maps_to_404() {
        let err: ApiError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
