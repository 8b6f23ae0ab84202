//! Error types for the fallback router

use research_core::{ProviderId, TaskType};
use research_llm::ProviderError;
use std::fmt;
use thiserror::Error;

use crate::CircuitState;

/// Result type alias for router operations
pub type Result<T> = std::result::Result<T, RouterError>;

/// Errors surfaced by the registry, the policy, and [`crate::FallbackRouter::execute`]
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Provider '{0}' is already registered")]
    DuplicateProvider(ProviderId),

    #[error("Unknown provider: {0}")]
    UnknownProvider(ProviderId),

    #[error("No fallback chain configured for {0} tasks")]
    NoRoute(TaskType),

    /// The task deadline passed before a provider answered
    #[error("Deadline exceeded for {task_type} task after trying: {}", FailureList(.failures))]
    DeadlineExceeded {
        task_type: TaskType,
        failures: Vec<ProviderFailure>,
    },

    /// Every provider in the chain failed or was unavailable
    #[error("All providers exhausted for {task_type} task: {}", FailureList(.failures))]
    AllProvidersExhausted {
        task_type: TaskType,
        failures: Vec<ProviderFailure>,
    },

    #[error(transparent)]
    InvalidProvider(#[from] research_core::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    ConfigFile(#[from] research_utils::ConfigError),
}

impl RouterError {
    /// Per-provider reasons carried by deadline and exhaustion errors
    pub fn failures(&self) -> &[ProviderFailure] {
        match self {
            Self::DeadlineExceeded { failures, .. } | Self::AllProvidersExhausted { failures, .. } => {
                failures
            }
            _ => &[],
        }
    }
}

/// Why one provider in the chain did not produce the result
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FailureReason {
    /// Skipped without contacting the provider
    #[error("circuit {0}")]
    CircuitOpen(CircuitState),

    /// Skipped because the provider costs more than the task allows
    #[error("cost {cost} exceeds budget ceiling {ceiling}")]
    OverBudget { cost: f64, ceiling: f64 },

    /// Rejected by the local rate limiter before any network call
    #[error("throttled by local rate limit")]
    Throttled,

    #[error("not registered")]
    UnknownProvider,

    /// The provider was invoked and failed
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl FailureReason {
    /// Whether the provider was actually contacted
    pub fn was_invoked(&self) -> bool {
        matches!(self, Self::Provider(_))
    }
}

/// A provider paired with the reason it was passed over
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFailure {
    pub provider: ProviderId,
    pub reason: FailureReason,
}

impl ProviderFailure {
    pub fn new(provider: ProviderId, reason: FailureReason) -> Self {
        Self { provider, reason }
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.provider, self.reason)
    }
}

struct FailureList<'a>(&'a [ProviderFailure]);

impl fmt::Display for FailureList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("none");
        }
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_message_lists_reasons() {
        let err = RouterError::AllProvidersExhausted {
            task_type: TaskType::Research,
            failures: vec![
                ProviderFailure::new("groq".into(), FailureReason::CircuitOpen(CircuitState::Open)),
                ProviderFailure::new(
                    "gemini".into(),
                    ProviderError::Auth("bad key".into()).into(),
                ),
            ],
        };

        assert_eq!(
            err.to_string(),
            "All providers exhausted for research task: groq (circuit open), \
             gemini (Authentication failed: bad key)"
        );
        assert_eq!(err.failures().len(), 2);
        assert!(!err.failures()[0].reason.was_invoked());
        assert!(err.failures()[1].reason.was_invoked());
    }

    #[test]
    fn test_deadline_message_without_failures() {
        let err = RouterError::DeadlineExceeded {
            task_type: TaskType::Thesis,
            failures: Vec::new(),
        };
        assert_eq!(
            err.to_string(),
            "Deadline exceeded for thesis task after trying: none"
        );
    }
}
