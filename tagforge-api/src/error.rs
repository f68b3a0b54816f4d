//! Error Types for the TAGFORGE API
//!
//! This module defines error handling for the HTTP layer:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//! - Conversion from `ForgeError`
//!
//! All errors are serialized as JSON with appropriate HTTP status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tagforge_core::{ConfigError, ForgeError};

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each error code maps to a specific HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request contains invalid input data
    InvalidInput,

    /// Requested tag is not a known release
    InvalidTag,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// No downloadable artifact exists
    ArtifactNotFound,

    // ========================================================================
    // Conflict Errors (409)
    // ========================================================================
    /// A non-expired build already exists for the version
    AlreadyBuilt,

    // ========================================================================
    // Throttling (429)
    // ========================================================================
    /// Request rate limit exceeded
    TooManyRequests,

    // ========================================================================
    // Server Errors (500, 503)
    // ========================================================================
    /// Internal server error
    InternalError,

    /// Server is misconfigured
    ConfigurationError,

    /// The source-control API failed or timed out
    UpstreamUnavailable,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidInput | ErrorCode::InvalidTag => StatusCode::BAD_REQUEST,

            ErrorCode::ArtifactNotFound => StatusCode::NOT_FOUND,

            ErrorCode::AlreadyBuilt => StatusCode::CONFLICT,

            ErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,

            ErrorCode::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,

            ErrorCode::InternalError | ErrorCode::ConfigurationError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::InvalidTag => "invalid tag",
            ErrorCode::ArtifactNotFound => "No artifacts found",
            ErrorCode::AlreadyBuilt => "version already built",
            ErrorCode::TooManyRequests => "Rate limit exceeded",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::ConfigurationError => "Server configuration error",
            ErrorCode::UpstreamUnavailable => "Source-control API unavailable",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
            details: None,
        }
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn invalid_tag(tag: &str) -> Self {
        Self::from_code(ErrorCode::InvalidTag).with_details(serde_json::json!({ "tag": tag }))
    }

    pub fn artifact_not_found() -> Self {
        Self::from_code(ErrorCode::ArtifactNotFound)
    }

    pub fn already_built(tag: &str) -> Self {
        Self::from_code(ErrorCode::AlreadyBuilt).with_details(serde_json::json!({ "tag": tag }))
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn configuration_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigurationError, message)
    }

    pub fn upstream_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UpstreamUnavailable, message)
    }

    /// Create a TooManyRequests error.
    pub fn too_many_requests(retry_after_secs: Option<u64>) -> Self {
        let message = match retry_after_secs {
            Some(secs) => format!("Rate limit exceeded. Retry after {} seconds", secs),
            None => "Rate limit exceeded".to_string(),
        };
        Self::new(ErrorCode::TooManyRequests, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self);
        (status, body).into_response()
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<ForgeError> for ApiError {
    fn from(err: ForgeError) -> Self {
        match err {
            ForgeError::UpstreamUnavailable(upstream) => {
                tracing::warn!(
                    operation = upstream.operation(),
                    error = %upstream,
                    "Upstream call failed"
                );
                ApiError::upstream_unavailable(ErrorCode::UpstreamUnavailable.default_message())
                    .with_details(serde_json::json!({ "operation": upstream.operation() }))
            }
            ForgeError::InvalidTag { tag } => ApiError::invalid_tag(&tag),
            ForgeError::AlreadyBuilt { tag } => ApiError::already_built(&tag),
            ForgeError::RateLimited { retry_after_secs } => {
                ApiError::too_many_requests(Some(retry_after_secs))
            }
            ForgeError::NotFound { .. } => ApiError::artifact_not_found(),
            ForgeError::Config(config) => ApiError::from(config),
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        tracing::error!(error = %err, "Configuration error");
        ApiError::configuration_error(err.to_string())
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
