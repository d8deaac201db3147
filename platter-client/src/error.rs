//! Transport errors and their translation into engine error kinds.

use platter_core::{EngineError, ValidationError};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ApiClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {status}: {message}")]
    Status {
        status: u16,
        message: String,
        retry_after_secs: Option<u64>,
    },
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
    #[error("Config error: {0}")]
    Config(String),
}

impl ApiClientError {
    /// Translate into the engine's error taxonomy.
    ///
    /// `authenticated` distinguishes an expired session (401 with a bearer
    /// token) from a plain authorization failure. `operation` and `timeout`
    /// describe the request for timeout reporting.
    pub fn into_engine(self, authenticated: bool, operation: &str, timeout: Duration) -> EngineError {
        match self {
            Self::Http(err) if err.is_timeout() => EngineError::Timeout {
                operation: operation.to_string(),
                after: timeout,
            },
            Self::Http(err) if err.is_decode() => EngineError::Server {
                status: 200,
                message: format!("undecodable response body: {}", err),
            },
            Self::Http(err) => EngineError::network(err.to_string()),
            Self::Status {
                status,
                message,
                retry_after_secs,
            } => status_to_engine_error(status, message, retry_after_secs, authenticated, operation),
            Self::Serde(err) => EngineError::Server {
                status: 200,
                message: format!("undecodable response body: {}", err),
            },
            Self::InvalidResponse(message) => EngineError::Server {
                status: 200,
                message,
            },
            Self::Config(reason) => EngineError::Config(platter_core::ConfigError::Parse { reason }),
        }
    }
}

/// Map a non-success HTTP status onto an engine error kind.
pub fn status_to_engine_error(
    status: u16,
    message: String,
    retry_after_secs: Option<u64>,
    authenticated: bool,
    operation: &str,
) -> EngineError {
    match status {
        400 | 422 => EngineError::Validation(ValidationError::Rejected { message }),
        401 if authenticated => EngineError::SessionExpired,
        401 | 403 => EngineError::unauthorized(operation),
        404 => EngineError::not_found(if message.is_empty() {
            operation.to_string()
        } else {
            message
        }),
        409 => EngineError::Conflict { message },
        429 => EngineError::RateLimited { retry_after_secs },
        _ => EngineError::Server { status, message },
    }
}

/// Parse a `Retry-After` header given in delta-seconds.
pub fn parse_retry_after(value: Option<&str>) -> Option<u64> {
    value.and_then(|v| v.trim().parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(status: u16, authenticated: bool) -> EngineError {
        status_to_engine_error(status, "boom".to_string(), None, authenticated, "create rating")
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            map(400, false),
            EngineError::Validation(ValidationError::Rejected { .. })
        ));
        assert!(matches!(map(401, true), EngineError::SessionExpired));
        assert!(matches!(map(401, false), EngineError::Unauthorized { .. }));
        assert!(matches!(map(403, true), EngineError::Unauthorized { .. }));
        assert!(matches!(map(404, false), EngineError::NotFound { .. }));
        assert!(matches!(map(409, false), EngineError::Conflict { .. }));
        assert!(matches!(map(503, false), EngineError::Server { status: 503, .. }));
    }

    #[test]
    fn test_rate_limit_carries_retry_after() {
        let err = status_to_engine_error(429, String::new(), Some(30), false, "toggle favorite");
        match err {
            EngineError::RateLimited { retry_after_secs } => assert_eq!(retry_after_secs, Some(30)),
            other => panic!("expected RateLimited, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after(Some(" 12 ")), Some(12));
        assert_eq!(parse_retry_after(Some("Wed, 21 Oct 2015 07:28:00 GMT")), None);
        assert_eq!(parse_retry_after(None), None);
    }

    #[test]
    fn test_status_error_translates() {
        let err = ApiClientError::Status {
            status: 401,
            message: "token expired".to_string(),
            retry_after_secs: None,
        };
        assert!(matches!(
            err.into_engine(true, "list ratings", Duration::from_secs(8)),
            EngineError::SessionExpired
        ));
    }

    #[test]
    fn test_invalid_response_is_server_error() {
        let err = ApiClientError::InvalidResponse("missing pagination".to_string());
        assert!(matches!(
            err.into_engine(false, "list ratings", Duration::from_secs(8)),
            EngineError::Server { .. }
        ));
    }
}
