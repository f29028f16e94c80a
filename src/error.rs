//! Error types for Murmur
//!
//! This module defines the error types used throughout the engine. Uses
//! `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.

use std::fmt;
use thiserror::Error;

// ============================================================================
// Provider Error Classification
// ============================================================================

/// Structured completion-provider error classification.
///
/// The completion loop picks its recovery strategy from this classification:
/// rate limits shorten history, oversized requests drop media and shorten,
/// everything else retryable backs off.
#[derive(Debug)]
pub enum ProviderError {
    /// 401: invalid API key or authentication failure
    Auth(String),
    /// 429: rate limit or quota exceeded
    RateLimit(String),
    /// 402: payment required or billing issue
    Billing(String),
    /// 500/502/503/504: server-side errors
    ServerError(String),
    /// 400: bad request, invalid JSON, malformed parameters
    InvalidRequest(String),
    /// Request exceeds the model context window or carries unsupported content
    ContextTooLarge(String),
    /// 404: model not found or endpoint not available
    ModelNotFound(String),
    /// Connection or read timeout
    Timeout(String),
    /// Provider is overloaded; retry with backoff
    Overloaded(String),
    /// Catch-all for unrecognized errors
    Unknown(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            ProviderError::RateLimit(msg) => write!(f, "Rate limit error: {}", msg),
            ProviderError::Billing(msg) => write!(f, "Billing error: {}", msg),
            ProviderError::ServerError(msg) => write!(f, "Server error: {}", msg),
            ProviderError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ProviderError::ContextTooLarge(msg) => write!(f, "Context too large: {}", msg),
            ProviderError::ModelNotFound(msg) => write!(f, "Model not found: {}", msg),
            ProviderError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            ProviderError::Overloaded(msg) => write!(f, "Overloaded error: {}", msg),
            ProviderError::Unknown(msg) => write!(f, "Unknown provider error: {}", msg),
        }
    }
}

impl ProviderError {
    /// Returns `true` if this error is transient and the request should be retried
    /// after a plain backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimit(_)
                | ProviderError::ServerError(_)
                | ProviderError::Timeout(_)
                | ProviderError::Overloaded(_)
                | ProviderError::Unknown(_)
        )
    }

    /// Returns `true` if the request itself is too big or carries content the
    /// model rejects. Recovered by dropping media and collapsing history.
    pub fn is_oversized_request(&self) -> bool {
        matches!(
            self,
            ProviderError::ContextTooLarge(_) | ProviderError::InvalidRequest(_)
        )
    }

    /// Returns the HTTP status code associated with this error, if applicable.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::Auth(_) => Some(401),
            ProviderError::RateLimit(_) => Some(429),
            ProviderError::Billing(_) => Some(402),
            ProviderError::ServerError(_) => Some(500),
            ProviderError::InvalidRequest(_) => Some(400),
            ProviderError::ContextTooLarge(_) => Some(400),
            ProviderError::ModelNotFound(_) => Some(404),
            ProviderError::Overloaded(_) => Some(503),
            ProviderError::Timeout(_) | ProviderError::Unknown(_) => None,
        }
    }
}

impl From<ProviderError> for MurmurError {
    fn from(err: ProviderError) -> Self {
        MurmurError::ProviderTyped(err)
    }
}

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for Murmur operations.
#[derive(Error, Debug)]
pub enum MurmurError {
    /// Configuration-related errors (invalid values, unreadable file, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unclassified provider errors (transport failures, undecodable bodies)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Structured provider error with classification for recovery decisions.
    #[error("Provider error: {0}")]
    ProviderTyped(ProviderError),

    /// Tool errors (unknown tool, invalid arguments, execution failures)
    #[error("Tool error: {0}")]
    Tool(String),

    /// Storage collaborator errors (history, state, limits)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Outbound side-effect failures
    #[error("Outbound error: {0}")]
    Outbound(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Message bus channel closed unexpectedly
    #[error("Bus error: channel closed")]
    BusClosed,

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),
}

impl MurmurError {
    /// Borrow the typed provider error, if this is one.
    pub fn as_provider(&self) -> Option<&ProviderError> {
        match self {
            MurmurError::ProviderTyped(e) => Some(e),
            _ => None,
        }
    }
}

/// A specialized `Result` type for Murmur operations.
pub type Result<T> = std::result::Result<T, MurmurError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MurmurError::Config("cooldown must be positive".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: cooldown must be positive"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: MurmurError = io_err.into();
        assert!(matches!(err, MurmurError::Io(_)));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: MurmurError = json_err.into();
        assert!(matches!(err, MurmurError::Json(_)));
    }

    // ====================================================================
    // ProviderError tests
    // ====================================================================

    #[test]
    fn test_provider_error_display() {
        assert!(ProviderError::RateLimit("quota".into())
            .to_string()
            .contains("Rate limit error"));
        assert!(ProviderError::ContextTooLarge("128k".into())
            .to_string()
            .contains("Context too large"));
        assert!(ProviderError::Unknown("???".into())
            .to_string()
            .contains("Unknown provider error"));
    }

    #[test]
    fn test_provider_error_is_retryable() {
        assert!(ProviderError::RateLimit("429".into()).is_retryable());
        assert!(ProviderError::ServerError("500".into()).is_retryable());
        assert!(ProviderError::Timeout("timeout".into()).is_retryable());
        assert!(ProviderError::Overloaded("busy".into()).is_retryable());

        assert!(!ProviderError::Auth("401".into()).is_retryable());
        assert!(!ProviderError::Billing("402".into()).is_retryable());
        assert!(!ProviderError::ModelNotFound("404".into()).is_retryable());
    }

    #[test]
    fn test_provider_error_oversized() {
        assert!(ProviderError::ContextTooLarge("x".into()).is_oversized_request());
        assert!(ProviderError::InvalidRequest("x".into()).is_oversized_request());
        assert!(!ProviderError::RateLimit("x".into()).is_oversized_request());
    }

    #[test]
    fn test_provider_error_status_code() {
        assert_eq!(
            ProviderError::RateLimit("x".into()).status_code(),
            Some(429)
        );
        assert_eq!(
            ProviderError::ContextTooLarge("x".into()).status_code(),
            Some(400)
        );
        assert_eq!(ProviderError::Timeout("x".into()).status_code(), None);
    }

    #[test]
    fn test_provider_error_into_murmur_error() {
        let err: MurmurError = ProviderError::RateLimit("too fast".into()).into();
        assert!(matches!(err, MurmurError::ProviderTyped(_)));
        assert!(err.as_provider().is_some());
        assert_eq!(
            err.to_string(),
            "Provider error: Rate limit error: too fast"
        );
    }
}
