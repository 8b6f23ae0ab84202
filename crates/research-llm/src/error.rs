//! Error types for provider calls

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type for provider calls
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Errors a provider call can fail with
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Network blip or server-side failure worth retrying
    #[error("Transient failure: {0}")]
    Transient(String),

    /// The call did not finish within its timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The provider is throttling us
    #[error("Rate limit exceeded: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Invalid API key or authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The provider answered but the content failed shape validation
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The client could not be constructed
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Classification of a [`ProviderError`] used for retry and fallback decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transient,
    RateLimit,
    Auth,
    InvalidResponse,
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transient(_) | Self::Timeout(_) => ErrorKind::Transient,
            Self::RateLimited { .. } => ErrorKind::RateLimit,
            // A misconfigured client is as unusable as one with a bad key
            Self::Auth(_) | Self::Configuration(_) => ErrorKind::Auth,
            Self::InvalidResponse(_) => ErrorKind::InvalidResponse,
        }
    }

    /// Only transient failures are retried against the same provider
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Transient => "transient",
            Self::RateLimit => "rate_limit",
            Self::Auth => "auth",
            Self::InvalidResponse => "invalid_response",
        };
        f.write_str(name)
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

#[cfg(feature = "reqwest")]
impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else if err.is_builder() {
            Self::Configuration(err.to_string())
        } else {
            Self::Transient(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ProviderError::Transient("reset".into()).kind(),
            ErrorKind::Transient
        );
        assert_eq!(
            ProviderError::Timeout(Duration::from_secs(1)).kind(),
            ErrorKind::Transient
        );
        assert_eq!(
            ProviderError::RateLimited {
                message: "slow down".into(),
                retry_after: None
            }
            .kind(),
            ErrorKind::RateLimit
        );
        assert_eq!(ProviderError::Auth("bad key".into()).kind(), ErrorKind::Auth);
        assert_eq!(
            ProviderError::InvalidResponse("empty".into()).kind(),
            ErrorKind::InvalidResponse
        );
    }

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(ProviderError::Timeout(Duration::from_millis(10)).is_retryable());
        assert!(!ProviderError::Auth("nope".into()).is_retryable());
        assert!(!ProviderError::InvalidResponse("{}".into()).is_retryable());
    }

    #[test]
    fn test_json_error_is_invalid_response() {
        let err: ProviderError = serde_json::from_str::<serde_json::Value>("{oops")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::InvalidResponse);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ErrorKind::RateLimit.to_string(), "rate_limit");
    }
}
