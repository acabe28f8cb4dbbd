//! Error types and handling for the gateway.
//!
//! This module provides a unified error type [`AppError`] that wraps various error sources
//! and implements proper HTTP response conversion.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// A single field-level validation failure, reported back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Field path, e.g. `prompt` or `conversationHistory.3.role`
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Main error type for the application.
///
/// All errors in the application should be converted to this type for consistent handling.
#[derive(Error, Debug)]
pub enum AppError {
    /// Request failed schema validation
    #[error("Validation failed")]
    Validation(Vec<ValidationIssue>),

    /// Client provided invalid data outside the schema (e.g. malformed JSON)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Referenced entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Entity exists but is not usable (e.g. disabled deployment)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Rate limit exceeded; `reset_at_ms` is the window end in epoch millis
    #[error("Rate limit exceeded")]
    RateLimited { reset_at_ms: i64 },

    /// A required upstream credential or URL is absent
    #[error("{0} not configured")]
    NotConfigured(&'static str),

    /// Upstream AI gateway returned a failure; message passed through
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// HTTP request errors from the reqwest client
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Database errors from sqlx
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal server errors with custom message
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Validation(issues) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "Invalid request",
                    "issues": issues,
                }),
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
            AppError::RateLimited { reset_at_ms } => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({
                    "error": "Rate limit exceeded",
                    "resetAt": reset_at_ms,
                }),
            ),
            AppError::NotConfigured(what) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": format!("{} not configured", what) }),
            ),
            AppError::Upstream(msg) => (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg })),
            AppError::Request(e) => {
                tracing::error!(error = %e, "Upstream HTTP request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": e.to_string() }),
                )
            }
            AppError::Database(e) => {
                tracing::error!(error = %e, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                )
            }
            AppError::Serialization(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": e.to_string() }),
            ),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg })),
        };

        (status, Json(body)).into_response()
    }
}

/// Convenience type alias for Results using [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AppError::NotConfigured("GATEWAY_API_KEY");
        assert_eq!(err.to_string(), "GATEWAY_API_KEY not configured");

        let err = AppError::Internal("test error".to_string());
        assert_eq!(err.to_string(), "Internal server error: test error");
    }

    #[test]
    fn test_validation_error_response() {
        let err = AppError::Validation(vec![ValidationIssue::new(
            "prompt",
            "must be at most 10000 characters",
        )]);
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_rate_limited_response() {
        let err = AppError::RateLimited {
            reset_at_ms: 1_700_000_000_000,
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_not_found_response() {
        let err = AppError::NotFound("Deployment not found".to_string());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_forbidden_response() {
        let err = AppError::Forbidden("Deployment is disabled".to_string());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_upstream_error_response() {
        let err = AppError::Upstream("model overloaded".to_string());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let app_err: AppError = json_err.into();
        assert!(matches!(app_err, AppError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_result_type_alias() {
        fn returns_result() -> Result<String> {
            Ok("success".to_string())
        }

        assert_eq!(returns_result().unwrap(), "success");
    }
}
