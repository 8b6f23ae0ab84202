//! Error types for research-core

use thiserror::Error;

/// Result type alias for research-core
pub type Result<T> = std::result::Result<T, Error>;

/// Validation errors for core data types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A provider description failed validation
    #[error("Invalid provider '{id}': {reason}")]
    InvalidProvider { id: String, reason: String },

    /// A task type name did not match any known task type
    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),
}
