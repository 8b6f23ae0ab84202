//! Error types for fetch jobs

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Why a single fetch job produced no payload
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The job ran past its own timeout
    #[error("job timed out after {0:?}")]
    Timeout(Duration),

    /// The batch deadline elapsed before the job finished
    #[error("batch deadline exceeded")]
    BatchDeadlineExceeded,

    /// The target could not be turned into a request
    #[error("invalid target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    /// The runner reported a failure
    #[error("fetch failed: {0}")]
    Failed(String),
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::Timeout(_) => FetchErrorKind::Timeout,
            Self::BatchDeadlineExceeded => FetchErrorKind::BatchDeadlineExceeded,
            Self::InvalidTarget { .. } | Self::Failed(_) => FetchErrorKind::Failed,
        }
    }
}

/// Coarse classification recorded in a [`FetchOutcome`](crate::FetchOutcome)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    Timeout,
    BatchDeadlineExceeded,
    Failed,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Timeout => "timeout",
            Self::BatchDeadlineExceeded => "batch_deadline_exceeded",
            Self::Failed => "failed",
        })
    }
}

/// Result type alias for fetch jobs
pub type Result<T> = std::result::Result<T, FetchError>;
