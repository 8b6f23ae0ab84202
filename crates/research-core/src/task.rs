//! Tasks routed through the provider fallback chain

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;

use crate::Error;

/// Deadline applied when a task is built without an explicit one
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(120);

/// Kind of analysis a task performs
///
/// The task type selects the fallback chain and is matched against
/// provider capability tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Research,
    Sentiment,
    Valuation,
    Thesis,
    Critique,
    Revision,
    General,
}

impl TaskType {
    /// Every task type, in declaration order
    pub const ALL: [TaskType; 7] = [
        Self::Research,
        Self::Sentiment,
        Self::Valuation,
        Self::Thesis,
        Self::Critique,
        Self::Revision,
        Self::General,
    ];

    /// Lowercase name used in configuration files and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Sentiment => "sentiment",
            Self::Valuation => "valuation",
            Self::Thesis => "thesis",
            Self::Critique => "critique",
            Self::Revision => "revision",
            Self::General => "general",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|task_type| task_type.as_str() == normalized)
            .ok_or_else(|| Error::UnknownTaskType(s.to_string()))
    }
}

/// Request content handed to provider clients
///
/// The router never inspects the payload; only provider adapters do.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// User prompt
    pub prompt: String,

    /// Optional system prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl Payload {
    /// Create a payload from a prompt
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    /// Set the system prompt
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set the maximum number of generated tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Whitespace-separated words across prompt and system prompt
    pub fn word_count(&self) -> usize {
        let system = self.system.as_deref().unwrap_or_default();
        self.prompt.split_whitespace().count() + system.split_whitespace().count()
    }
}

/// A unit of work executed against the fallback chain of its task type
#[derive(Debug, Clone)]
pub struct Task {
    /// Selects the fallback chain
    pub task_type: TaskType,

    /// Forwarded to the provider client
    pub payload: Payload,

    /// Maximum number of providers actually invoked (skipped providers do not count)
    pub max_attempts: Option<usize>,

    /// Providers whose cost weight exceeds this ceiling are skipped
    pub budget_ceiling: Option<f64>,

    /// Instant after which the task is abandoned
    pub deadline: Instant,
}

/// `now + timeout`, saturating at roughly thirty years out
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

impl Task {
    /// Create a task with the default deadline
    pub fn new(task_type: TaskType, payload: Payload) -> Self {
        Self {
            task_type,
            payload,
            max_attempts: None,
            budget_ceiling: None,
            deadline: deadline_after(DEFAULT_TASK_TIMEOUT),
        }
    }

    /// Set the deadline relative to now
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = deadline_after(timeout);
        self
    }

    /// Set an absolute deadline
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = deadline;
        self
    }

    /// Cap the number of providers invoked
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Skip providers costing more than `ceiling`
    pub fn with_budget_ceiling(mut self, ceiling: f64) -> Self {
        self.budget_ceiling = Some(ceiling);
        self
    }

    /// Time left before the deadline (zero once expired)
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Whether the deadline has passed
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_type_round_trip_names() {
        for task_type in TaskType::ALL {
            assert_eq!(task_type.as_str().parse::<TaskType>().unwrap(), task_type);
        }
        assert_eq!(" Thesis ".parse::<TaskType>().unwrap(), TaskType::Thesis);
    }

    #[test]
    fn test_unknown_task_type() {
        let err = "forecast".parse::<TaskType>().unwrap_err();
        assert_eq!(err, Error::UnknownTaskType("forecast".to_string()));
    }

    #[test]
    fn test_task_type_serde_lowercase() {
        let json = serde_json::to_string(&TaskType::Valuation).unwrap();
        assert_eq!(json, "\"valuation\"");
    }

    #[test]
    fn test_payload_word_count() {
        let payload = Payload::new("Research Apple Inc. briefly").with_system("You are an analyst");
        assert_eq!(payload.word_count(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_deadline() {
        let task = Task::new(TaskType::Research, Payload::new("hi"))
            .with_timeout(Duration::from_secs(5))
            .with_max_attempts(2)
            .with_budget_ceiling(0.001);

        assert!(!task.is_expired());
        assert_eq!(task.remaining(), Duration::from_secs(5));
        assert_eq!(task.max_attempts, Some(2));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(task.is_expired());
        assert_eq!(task.remaining(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_huge_timeout_does_not_overflow() {
        let task = Task::new(TaskType::Research, Payload::new("hi"))
            .with_timeout(Duration::from_secs(u64::MAX));

        assert!(!task.is_expired());
        assert!(task.remaining() > Duration::from_secs(86400 * 365));
    }
}
