//! Fetch jobs, their outcomes, and the runner capability

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::{FetchError, FetchErrorKind, Result};

/// Per-job timeout used by [`FetchJob::new`]
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(30);

/// One independent retrieval
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchJob {
    /// Opaque descriptor handed to the runner, usually a URL
    pub target: String,
    pub per_job_timeout: Duration,
}

impl FetchJob {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            per_job_timeout: DEFAULT_JOB_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.per_job_timeout = timeout;
        self
    }
}

/// Executes a single fetch job
///
/// Runners may honour `timeout` themselves; the coordinator enforces it
/// regardless.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, target: &str, timeout: Duration) -> Result<String>;
}

/// What happened to one job of a batch
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    pub job: FetchJob,
    pub result: Result<String>,
    /// Time spent running, excluding the wait for a concurrency slot
    pub latency: Duration,
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn payload(&self) -> Option<&str> {
        self.result.as_deref().ok()
    }

    pub fn error(&self) -> Option<&FetchError> {
        self.result.as_ref().err()
    }

    pub fn error_kind(&self) -> Option<FetchErrorKind> {
        self.error().map(FetchError::kind)
    }
}

/// Outcome counts for one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub cancelled: usize,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[FetchOutcome]) -> Self {
        let mut summary = Self {
            total: outcomes.len(),
            ..Self::default()
        };
        for outcome in outcomes {
            match outcome.error_kind() {
                None => summary.succeeded += 1,
                Some(FetchErrorKind::Failed) => summary.failed += 1,
                Some(FetchErrorKind::Timeout) => summary.timed_out += 1,
                Some(FetchErrorKind::BatchDeadlineExceeded) => summary.cancelled += 1,
            }
        }
        summary
    }

    pub fn all_failed(&self) -> bool {
        self.total > 0 && self.succeeded == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(target: &str, result: Result<String>) -> FetchOutcome {
        FetchOutcome {
            job: FetchJob::new(target),
            result,
            latency: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_job_defaults() {
        let job = FetchJob::new("https://example.com");
        assert_eq!(job.per_job_timeout, DEFAULT_JOB_TIMEOUT);
        assert_eq!(
            job.with_timeout(Duration::from_secs(2)).per_job_timeout,
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_outcome_accessors() {
        let ok = outcome("a", Ok("<html>".into()));
        assert!(ok.is_success());
        assert_eq!(ok.payload(), Some("<html>"));
        assert_eq!(ok.error_kind(), None);

        let timed_out = outcome("b", Err(FetchError::Timeout(Duration::from_secs(1))));
        assert_eq!(timed_out.payload(), None);
        assert_eq!(timed_out.error_kind(), Some(FetchErrorKind::Timeout));
    }

    #[test]
    fn test_summary_counts() {
        let outcomes = vec![
            outcome("a", Ok(String::new())),
            outcome("b", Err(FetchError::Failed("503".into()))),
            outcome("c", Err(FetchError::Timeout(Duration::from_secs(1)))),
            outcome("d", Err(FetchError::BatchDeadlineExceeded)),
            outcome("e", Ok(String::new())),
        ];

        let summary = BatchSummary::from_outcomes(&outcomes);
        assert_eq!(
            summary,
            BatchSummary {
                total: 5,
                succeeded: 2,
                failed: 1,
                timed_out: 1,
                cancelled: 1,
            }
        );
        assert!(!summary.all_failed());
        assert!(!BatchSummary::from_outcomes(&[]).all_failed());
        assert!(BatchSummary::from_outcomes(&outcomes[1..4]).all_failed());
    }
}
