//! Error types for tagforge operations

use thiserror::Error;

/// Failures talking to the source-control API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("Request for {operation} failed: {reason}")]
    Transport { operation: String, reason: String },

    #[error("Request for {operation} timed out")]
    Timeout { operation: String },

    #[error("Request for {operation} returned status {status}: {message}")]
    Status {
        operation: String,
        status: u16,
        message: String,
    },

    #[error("Invalid response for {operation}: {reason}")]
    Decode { operation: String, reason: String },
}

impl UpstreamError {
    /// Name of the upstream operation that failed.
    pub fn operation(&self) -> &str {
        match self {
            UpstreamError::Transport { operation, .. }
            | UpstreamError::Timeout { operation }
            | UpstreamError::Status { operation, .. }
            | UpstreamError::Decode { operation, .. } => operation,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for tagforge operations.
///
/// `InvalidTag` and `AlreadyBuilt` are expected business outcomes of a build
/// request rather than faults; the HTTP layer renders them as structured
/// `{success: false, message}` payloads.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ForgeError {
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(#[from] UpstreamError),

    #[error("Invalid tag: {tag}")]
    InvalidTag { tag: String },

    #[error("Version already built: {tag}")]
    AlreadyBuilt { tag: String },

    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for tagforge operations.
pub type ForgeResult<T> = Result<T, ForgeError>;

/// Result type alias for raw upstream calls.
pub type UpstreamResult<T> = Result<T, UpstreamError>;

// =============================================================================
// TESTS
// =============================================================================
