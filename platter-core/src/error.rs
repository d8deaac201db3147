//! Error types for review engine operations

use std::time::Duration;
use thiserror::Error;

/// Local validation errors, raised before any network call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Rating must be between 1 and 5, got {value}")]
    RatingOutOfRange { value: u8 },

    #[error("Comment too short: {len} characters (minimum {min})")]
    CommentTooShort { len: usize, min: usize },

    #[error("Comment too long: {len} characters (maximum {max})")]
    CommentTooLong { len: usize, max: usize },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Rejected by server: {message}")]
    Rejected { message: String },
}

/// Local state and persistence errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage lock poisoned: {resource}")]
    LockPoisoned { resource: &'static str },

    #[error("Persistence failed for {what}: {reason}")]
    PersistenceFailed { what: String, reason: String },

    #[error("Persisted state for {what} is unreadable: {reason}")]
    Corrupt { what: String, reason: String },
}

impl StorageError {
    pub fn poisoned(resource: &'static str) -> Self {
        Self::LockPoisoned { resource }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or PLATTER_CONFIG)")]
    MissingConfigPath,

    #[error("Failed to read config file: {reason}")]
    Read { reason: String },

    #[error("Failed to parse config: {reason}")]
    Parse { reason: String },

    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Master error type returned by every engine operation.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Not authorized to {operation}")]
    Unauthorized { operation: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Rate limited{}", retry_hint(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Session expired")]
    SessionExpired,

    #[error("Operation in progress for {target}")]
    OperationInProgress { target: String },

    #[error("Result for {what} was superseded by an invalidation")]
    Superseded { what: String },

    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl EngineError {
    pub fn unauthorized(operation: impl Into<String>) -> Self {
        Self::Unauthorized {
            operation: operation.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn in_progress(target: impl Into<String>) -> Self {
        Self::OperationInProgress {
            target: target.into(),
        }
    }

    /// Whether a caller-side retry is sensible. The engine never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. }
                | Self::Timeout { .. }
                | Self::RateLimited { .. }
                | Self::Superseded { .. }
        )
    }

    /// Short human-readable description for display.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(ValidationError::RatingOutOfRange { .. }) => {
                "Please choose a rating between 1 and 5 stars.".to_string()
            }
            Self::Validation(ValidationError::CommentTooShort { min, .. }) => {
                format!("Your comment needs at least {} characters.", min)
            }
            Self::Validation(ValidationError::CommentTooLong { max, .. }) => {
                format!("Your comment can be at most {} characters.", max)
            }
            Self::Validation(other) => other.to_string(),
            Self::Unauthorized { .. } => "You need to sign in to do that.".to_string(),
            Self::Conflict { .. } => "You have already rated this.".to_string(),
            Self::RateLimited { .. } => {
                "Too many requests. Please wait a moment and try again.".to_string()
            }
            Self::Network { .. } | Self::Timeout { .. } => {
                "Could not reach the server. Check your connection and try again.".to_string()
            }
            Self::NotFound { .. } => "That item no longer exists.".to_string(),
            Self::SessionExpired => "Your session has expired. Please sign in again.".to_string(),
            Self::OperationInProgress { .. } => {
                "Please wait for the previous action to finish.".to_string()
            }
            Self::Superseded { .. } => "This view changed, please reload.".to_string(),
            Self::Server { message, .. } => message.clone(),
            Self::Storage(_) | Self::Config(_) => "Something went wrong.".to_string(),
        }
    }
}

fn retry_hint(retry_after_secs: &Option<u64>) -> String {
    retry_after_secs
        .map(|secs| format!(", retry after {}s", secs))
        .unwrap_or_default()
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
