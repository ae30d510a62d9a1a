//! Error handling for the Tollgate API
//!
//! A single thiserror enum covers the authentication taxonomy (not found,
//! bad credentials, rejected refresh tokens, forced re-login, missing or
//! insufficient authorization, rate limiting) plus the store and codec
//! faults underneath it. Axum's `IntoResponse` maps each variant to an HTTP
//! status and a stable machine-readable code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::models::rate_limit::RateLimitRejection;

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for client-side handling
    pub code: &'static str,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Main API error type
#[derive(Error, Debug)]
pub enum ApiError {
    // ========== Session Errors ==========
    /// No user matches the lookup
    #[error("{resource_type} not found: {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// Password comparison failed
    #[error("password incorrect")]
    InvalidCredentials,

    /// Refresh token is malformed, blacklisted, superseded or has no session
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Signature verification failed; the session has been cleared
    #[error("session key expired, please log in again")]
    ExpiredKey,

    // ========== Access Control ==========
    /// Missing or invalid bearer token
    #[error("authentication required")]
    Unauthorized,

    /// Caller's role is not allowed on the route
    #[error("insufficient permissions: {0}")]
    Forbidden(String),

    /// Caller exceeded the tier for its role on this endpoint
    #[error("rate limit exceeded for {} role on {}", .0.role, .0.endpoint)]
    RateLimited(Box<RateLimitRejection>),

    // ========== Validation ==========
    /// Resource already exists
    #[error("{resource_type} already exists: {id}")]
    Conflict {
        resource_type: &'static str,
        id: String,
    },

    /// Request validation failed
    #[error("validation error: {0}")]
    ValidationError(String),

    // ========== Store Faults ==========
    /// Session store query failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Counter store operation failed
    #[error("cache error: {0}")]
    Redis(#[from] redis::RedisError),

    // ========== Internal ==========
    /// JWT encoding failed
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// JSON serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal server error (catch-all for unexpected errors)
    #[error("internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,

            Self::InvalidCredentials
            | Self::InvalidRequest(_)
            | Self::ExpiredKey
            | Self::ValidationError(_) => StatusCode::BAD_REQUEST,

            Self::Unauthorized => StatusCode::UNAUTHORIZED,

            Self::Forbidden(_) => StatusCode::FORBIDDEN,

            Self::Conflict { .. } => StatusCode::CONFLICT,

            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,

            Self::Database(_)
            | Self::Redis(_)
            | Self::Jwt(_)
            | Self::Serialization(_)
            | Self::Configuration(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for client-side handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::ExpiredKey => "EXPIRED_KEY",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::RateLimited(_) => "RATE_LIMITED",
            Self::Conflict { .. } => "CONFLICT",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Redis(_) => "CACHE_ERROR",
            Self::Jwt(_) => "JWT_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn not_found(resource_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type,
            id: id.into(),
        }
    }

    pub fn conflict(resource_type: &'static str, id: impl Into<String>) -> Self {
        Self::Conflict {
            resource_type,
            id: id.into(),
        }
    }

    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest(reason.into())
    }

    /// Log the error with severity based on status code
    pub fn log(&self) {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(
                error = %self,
                code = self.error_code(),
                status = status.as_u16(),
                "Server error occurred"
            );
        } else if matches!(
            status,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS
        ) {
            tracing::warn!(
                error = %self,
                code = self.error_code(),
                status = status.as_u16(),
                "Request rejected"
            );
        } else {
            tracing::debug!(
                error = %self,
                code = self.error_code(),
                status = status.as_u16(),
                "Client error"
            );
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::RateLimited(rejection) => serde_json::to_value(rejection.as_ref()).ok(),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.status_code();
        let error_response = ErrorResponse {
            code: self.error_code(),
            message: self.to_string(),
            details: self.details(),
        };

        if let Self::RateLimited(rejection) = &self {
            return (
                status,
                [("Retry-After", rejection.retry_after_secs.to_string())],
                Json(error_response),
            )
                .into_response();
        }

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("blocking task failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::UserRole;
    use chrono::{TimeZone, Utc};

    fn rejection() -> RateLimitRejection {
        RateLimitRejection {
            role: UserRole::User,
            endpoint: "POST:/api/auth/login".to_string(),
            limit: 20,
            window_secs: 300,
            retry_after_secs: 42,
            reset_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 42).unwrap(),
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::not_found("user", "a@x.com").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::InvalidCredentials.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::ExpiredKey.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::Unauthorized.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Forbidden("admin".to_string()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::RateLimited(Box::new(rejection())).status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::Internal("boom".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ApiError::ExpiredKey.error_code(), "EXPIRED_KEY");
        assert_eq!(
            ApiError::invalid_request("blacklisted").error_code(),
            "INVALID_REQUEST"
        );
    }

    #[test]
    fn test_rate_limited_display() {
        let err = ApiError::RateLimited(Box::new(rejection()));
        assert_eq!(
            err.to_string(),
            "rate limit exceeded for user role on POST:/api/auth/login"
        );
    }

    #[test]
    fn test_rate_limited_response_sets_retry_after() {
        let response = ApiError::RateLimited(Box::new(rejection())).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get("Retry-After").unwrap(), "42");
    }

    #[test]
    fn test_rate_limited_details() {
        let details = ApiError::RateLimited(Box::new(rejection()))
            .details()
            .unwrap();
        assert_eq!(details["role"], "user");
        assert_eq!(details["windowSeconds"], 300);
        assert_eq!(details["retryAfter"], 42);
        assert_eq!(details["resetAt"], "2024-01-01T00:00:42.000Z");
    }
}
