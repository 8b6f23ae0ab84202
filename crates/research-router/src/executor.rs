//! Single-provider attempt execution
//!
//! One attempt covers the provider call plus its local retries. Only
//! transient failures are retried, never past the task deadline, never
//! without a fresh rate-limit token, and never for a half-open probe. An
//! attempt that reached the provider is reported once to the health monitor,
//! including one cut short by the task deadline.

use research_core::{ProviderId, Task};
use research_llm::{Completion, ErrorKind, ProviderError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, sleep, timeout, timeout_at};
use tracing::{debug, instrument, warn};

use crate::{
    CircuitState, HealthMonitor, MetricsCollector, Outcome, RegisteredProvider, RetryPolicy,
    Throttled,
};

/// Default per-call timeout
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// One provider attempt, folded into metrics then discarded
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub provider: ProviderId,
    pub started_at: Instant,
    pub finished_at: Instant,
    pub outcome: Result<(), ErrorKind>,
    /// Local retries spent inside this attempt
    pub retries: u32,
}

impl Attempt {
    pub fn latency(&self) -> Duration {
        self.finished_at.saturating_duration_since(self.started_at)
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Why an attempt produced no completion
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AttemptError {
    /// The breaker rejected the attempt; the provider was not contacted
    #[error("circuit {0}")]
    Unavailable(CircuitState),

    #[error(transparent)]
    Throttled(#[from] Throttled),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The task deadline cancelled the attempt
    #[error("task deadline exceeded")]
    DeadlineExceeded,
}

/// Executes attempts against one provider at a time
#[derive(Debug)]
pub struct RequestExecutor {
    retry: RetryPolicy,
    attempt_timeout: Duration,
    health: Arc<HealthMonitor>,
    metrics: Arc<MetricsCollector>,
}

struct CallOutcome {
    result: Result<Completion, ProviderError>,
    retries: u32,
}

impl RequestExecutor {
    pub fn new(
        retry: RetryPolicy,
        attempt_timeout: Duration,
        health: Arc<HealthMonitor>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            retry,
            attempt_timeout,
            health,
            metrics,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Run one attempt of `task` against `entry`
    ///
    /// The breaker is consulted first; a rejected or throttled attempt
    /// never reaches the provider. The task deadline cancels the call.
    #[instrument(skip(self, entry, task), fields(provider = %entry.provider.id, task_type = %task.task_type))]
    pub async fn execute(
        &self,
        entry: &RegisteredProvider,
        task: &Task,
    ) -> Result<Completion, AttemptError> {
        let id = &entry.provider.id;

        let admission = match self.health.try_admit(id) {
            Ok(Ok(admission)) => admission,
            Ok(Err(state)) => {
                debug!("Skipping provider, circuit {}", state);
                self.metrics.record_skipped(id);
                return Err(AttemptError::Unavailable(state));
            }
            // The router only hands us registered providers
            Err(_) => return Err(AttemptError::Unavailable(CircuitState::Open)),
        };
        let probe = admission.is_probe();

        // Waiting for a slot is not an attempt; the provider was never called
        let _permit = match timeout_at(task.deadline, entry.limits.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(throttled)) => return Err(self.throttled(id, throttled)),
            Err(_) => {
                debug!("Task deadline reached while waiting for a concurrency slot");
                self.metrics.record_cancelled(id);
                return Err(AttemptError::DeadlineExceeded);
            }
        };
        if let Err(throttled) = entry.limits.take_token() {
            return Err(self.throttled(id, throttled));
        }

        let started_at = Instant::now();
        let call = match timeout_at(task.deadline, self.call(entry, task, probe)).await {
            Ok(call) => call,
            Err(_) => {
                warn!(elapsed = ?started_at.elapsed(), "Task deadline reached during provider call");
                admission.record(Outcome::Failure);
                self.metrics.record_cancelled(id);
                return Err(AttemptError::DeadlineExceeded);
            }
        };

        let attempt = Attempt {
            provider: id.clone(),
            started_at,
            finished_at: Instant::now(),
            outcome: call.result.as_ref().map(|_| ()).map_err(ProviderError::kind),
            retries: call.retries,
        };

        match &call.result {
            Ok(_) => admission.record(Outcome::Success),
            Err(err) => admission.record(Outcome::from_error(err)),
        }
        self.metrics.record_attempt(&attempt);

        match call.result {
            Ok(completion) => {
                debug!(latency = ?attempt.latency(), retries = attempt.retries, "Provider answered");
                Ok(completion)
            }
            Err(err) => {
                warn!(retries = attempt.retries, "Provider attempt failed: {}", err);
                Err(err.into())
            }
        }
    }

    fn throttled(&self, id: &ProviderId, throttled: Throttled) -> AttemptError {
        debug!("Provider throttled locally");
        self.metrics.record_throttled(id);
        throttled.into()
    }

    /// Call the provider, retrying transient failures
    ///
    /// The first call's rate-limit token is already taken. Every retry takes
    /// its own; without one the last error is returned.
    async fn call(&self, entry: &RegisteredProvider, task: &Task, probe: bool) -> CallOutcome {
        let max_retries = if probe { 0 } else { self.retry.max_retries };
        let mut retries = 0;

        loop {
            let result = match timeout(
                self.attempt_timeout,
                entry.client.invoke(&task.payload, self.attempt_timeout),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(self.attempt_timeout)),
            }
            .and_then(|completion| {
                if completion.is_empty() {
                    Err(ProviderError::InvalidResponse("empty content".to_string()))
                } else {
                    Ok(completion)
                }
            });

            let err = match result {
                Ok(completion) => {
                    return CallOutcome {
                        result: Ok(completion),
                        retries,
                    };
                }
                Err(err) => err,
            };

            if !err.is_retryable() || retries >= max_retries {
                return CallOutcome {
                    result: Err(err),
                    retries,
                };
            }

            let delay = self.retry.backoff.delay(retries);
            if Instant::now() + delay >= task.deadline {
                debug!("No time left to retry before the deadline");
                return CallOutcome {
                    result: Err(err),
                    retries,
                };
            }

            warn!(
                "Transient failure (retry {}/{}): {}. Retrying in {:?}",
                retries + 1,
                max_retries,
                err,
                delay
            );
            sleep(delay).await;

            if entry.limits.take_token().is_err() {
                debug!("Rate limit reached, giving up on local retries");
                return CallOutcome {
                    result: Err(err),
                    retries,
                };
            }
            retries += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Backoff, BreakerConfig, ProviderRegistry};
    use async_trait::async_trait;
    use research_core::{Payload, Provider, TaskType};
    use research_llm::ProviderClient;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays scripted results, optionally sleeping before each
    struct ScriptedClient {
        script: Mutex<VecDeque<Result<Completion, ProviderError>>>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ScriptedClient {
        fn new(script: Vec<Result<Completion, ProviderError>>) -> Arc<Self> {
            Self::slow(script, Duration::ZERO)
        }

        fn slow(script: Vec<Result<Completion, ProviderError>>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                delay,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ProviderClient for ScriptedClient {
        async fn invoke(
            &self,
            _payload: &Payload,
            _timeout: Duration,
        ) -> research_llm::Result<Completion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Completion::new("default")))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct Harness {
        registry: ProviderRegistry,
        health: Arc<HealthMonitor>,
        metrics: Arc<MetricsCollector>,
        executor: RequestExecutor,
        id: ProviderId,
    }

    fn harness(client: Arc<ScriptedClient>, provider: Provider) -> Harness {
        let id = provider.id.clone();
        let mut registry = ProviderRegistry::new();
        registry.register(provider, client).unwrap();

        let health = Arc::new(HealthMonitor::new([(
            id.clone(),
            BreakerConfig {
                failure_threshold: 3,
                window: Duration::from_secs(60),
                cooldown: Backoff::exponential(Duration::from_secs(10), 2.0, Duration::from_secs(60)),
            },
        )]));
        let metrics = Arc::new(MetricsCollector::new([id.clone()], Arc::clone(&health)));
        let retry = RetryPolicy::new(
            2,
            Backoff::exponential(Duration::from_millis(100), 2.0, Duration::from_secs(1)),
        );
        let executor = RequestExecutor::new(
            retry,
            Duration::from_secs(5),
            Arc::clone(&health),
            Arc::clone(&metrics),
        );

        Harness {
            registry,
            health,
            metrics,
            executor,
            id,
        }
    }

    fn provider() -> Provider {
        Provider::builder("groq")
            .capability(TaskType::Research)
            .build()
            .unwrap()
    }

    fn task() -> Task {
        Task::new(TaskType::Research, Payload::new("Summarize TSLA deliveries"))
            .with_timeout(Duration::from_secs(60))
    }

    fn transient() -> Result<Completion, ProviderError> {
        Err(ProviderError::Transient("connection reset".into()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let client = ScriptedClient::new(vec![transient(), transient(), Ok(Completion::new("done"))]);
        let h = harness(Arc::clone(&client), provider());

        let entry = h.registry.get(&h.id).unwrap();
        let completion = h.executor.execute(entry, &task()).await.unwrap();

        assert_eq!(completion.content, "done");
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);

        let snapshot = h.metrics.snapshot();
        assert_eq!(snapshot.total_attempts, 1);
        assert_eq!(snapshot.total_retries, 2);
        assert_eq!(snapshot.providers[&h.id].successes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_reports_one_failure() {
        let client = ScriptedClient::new(vec![transient(), transient(), transient(), transient()]);
        let h = harness(Arc::clone(&client), provider());

        let entry = h.registry.get(&h.id).unwrap();
        let err = h.executor.execute(entry, &task()).await.unwrap_err();

        assert!(matches!(err, AttemptError::Provider(ProviderError::Transient(_))));
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
        assert_eq!(h.health.snapshot(&h.id).unwrap().consecutive_failures, 1);
        assert_eq!(h.metrics.snapshot().providers[&h.id].failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_and_auth_are_not_retried() {
        let client = ScriptedClient::new(vec![Err(ProviderError::RateLimited {
            message: "429".into(),
            retry_after: None,
        })]);
        let h = harness(Arc::clone(&client), provider());
        let entry = h.registry.get(&h.id).unwrap();
        let err = h.executor.execute(entry, &task()).await.unwrap_err();
        assert!(matches!(err, AttemptError::Provider(ProviderError::RateLimited { .. })));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.health.current_state(&h.id).unwrap(), CircuitState::Closed);

        let client = ScriptedClient::new(vec![Err(ProviderError::Auth("revoked".into()))]);
        let h = harness(Arc::clone(&client), provider());
        let entry = h.registry.get(&h.id).unwrap();
        h.executor.execute(entry, &task()).await.unwrap_err();
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.health.current_state(&h.id).unwrap(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_content_is_invalid_response() {
        let client = ScriptedClient::new(vec![Ok(Completion::new("   "))]);
        let h = harness(Arc::clone(&client), provider());

        let entry = h.registry.get(&h.id).unwrap();
        let err = h.executor.execute(entry, &task()).await.unwrap_err();
        assert!(matches!(err, AttemptError::Provider(ProviderError::InvalidResponse(_))));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_times_out_as_transient() {
        let client = ScriptedClient::slow(vec![], Duration::from_secs(10));
        let h = harness(Arc::clone(&client), provider());

        let entry = h.registry.get(&h.id).unwrap();
        let err = h.executor.execute(entry, &task()).await.unwrap_err();

        assert_eq!(err, AttemptError::Provider(ProviderError::Timeout(Duration::from_secs(5))));
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_during_call_counts_as_failure() {
        let client = ScriptedClient::slow(vec![], Duration::from_secs(4));
        let h = harness(Arc::clone(&client), provider());

        let entry = h.registry.get(&h.id).unwrap();
        let task = task().with_timeout(Duration::from_secs(2));
        let started = Instant::now();
        let err = h.executor.execute(entry, &task).await.unwrap_err();

        assert_eq!(err, AttemptError::DeadlineExceeded);
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(h.health.snapshot(&h.id).unwrap().consecutive_failures, 1);

        let snapshot = h.metrics.snapshot();
        assert_eq!(snapshot.total_attempts, 0);
        assert_eq!(snapshot.providers[&h.id].cancelled, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_provider_eventually_opens_breaker() {
        let client = ScriptedClient::slow(vec![], Duration::from_secs(3600));
        let h = harness(Arc::clone(&client), provider());
        let entry = h.registry.get(&h.id).unwrap();

        for _ in 0..3 {
            let task = task().with_timeout(Duration::from_secs(2));
            let err = h.executor.execute(entry, &task).await.unwrap_err();
            assert_eq!(err, AttemptError::DeadlineExceeded);
        }
        assert_eq!(h.health.current_state(&h.id).unwrap(), CircuitState::Open);

        let task = task().with_timeout(Duration::from_secs(2));
        let err = h.executor.execute(entry, &task).await.unwrap_err();
        assert_eq!(err, AttemptError::Unavailable(CircuitState::Open));
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_while_waiting_for_slot_is_not_reported() {
        let client = ScriptedClient::new(vec![]);
        let single = Provider::builder("groq")
            .capability(TaskType::Research)
            .max_concurrent(1)
            .build()
            .unwrap();
        let h = harness(Arc::clone(&client), single);
        let entry = h.registry.get(&h.id).unwrap();

        let _held = entry.limits.acquire().await.unwrap();
        let task = task().with_timeout(Duration::from_secs(2));
        let err = h.executor.execute(entry, &task).await.unwrap_err();

        assert_eq!(err, AttemptError::DeadlineExceeded);
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.health.snapshot(&h.id).unwrap().consecutive_failures, 0);
        assert_eq!(h.metrics.snapshot().providers[&h.id].cancelled, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_retry_past_deadline() {
        let client = ScriptedClient::new(vec![transient(), Ok(Completion::new("late"))]);
        let h = harness(Arc::clone(&client), provider());

        let entry = h.registry.get(&h.id).unwrap();
        let task = task().with_timeout(Duration::from_millis(50));
        let err = h.executor.execute(entry, &task).await.unwrap_err();

        assert!(matches!(err, AttemptError::Provider(ProviderError::Transient(_))));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_is_not_retried() {
        let client = ScriptedClient::new(vec![transient(), Ok(Completion::new("recovered"))]);
        let h = harness(Arc::clone(&client), provider());
        h.health.record_outcome(&h.id, Outcome::HardFailure).unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;

        let entry = h.registry.get(&h.id).unwrap();
        h.executor.execute(entry, &task()).await.unwrap_err();

        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.health.current_state(&h.id).unwrap(), CircuitState::Open);
        assert_eq!(h.health.cooldown(&h.id).unwrap(), Some(Duration::from_secs(20)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_skips_without_call() {
        let client = ScriptedClient::new(vec![]);
        let h = harness(Arc::clone(&client), provider());
        h.health.record_outcome(&h.id, Outcome::HardFailure).unwrap();

        let entry = h.registry.get(&h.id).unwrap();
        let err = h.executor.execute(entry, &task()).await.unwrap_err();

        assert_eq!(err, AttemptError::Unavailable(CircuitState::Open));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.metrics.snapshot().providers[&h.id].skipped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_throttle_is_not_an_attempt() {
        let client = ScriptedClient::new(vec![]);
        let limited = Provider::builder("groq")
            .capability(TaskType::Research)
            .rate_limit_per_minute(1)
            .build()
            .unwrap();
        let h = harness(Arc::clone(&client), limited);
        let entry = h.registry.get(&h.id).unwrap();

        h.executor.execute(entry, &task()).await.unwrap();
        let err = h.executor.execute(entry, &task()).await.unwrap_err();

        assert_eq!(err, AttemptError::Throttled(Throttled));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        let snapshot = h.metrics.snapshot();
        assert_eq!(snapshot.total_attempts, 1);
        assert_eq!(snapshot.providers[&h.id].throttled, 1);
        assert_eq!(h.health.snapshot(&h.id).unwrap().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_retry_takes_a_rate_limit_token() {
        let client = ScriptedClient::new(vec![transient(), transient(), Ok(Completion::new("done"))]);
        let limited = Provider::builder("groq")
            .capability(TaskType::Research)
            .rate_limit_per_minute(1)
            .build()
            .unwrap();
        let h = harness(Arc::clone(&client), limited);
        let entry = h.registry.get(&h.id).unwrap();

        let err = h.executor.execute(entry, &task()).await.unwrap_err();

        assert!(matches!(err, AttemptError::Provider(ProviderError::Transient(_))));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.health.snapshot(&h.id).unwrap().consecutive_failures, 1);
        let snapshot = h.metrics.snapshot();
        assert_eq!(snapshot.total_attempts, 1);
        assert_eq!(snapshot.total_retries, 0);
    }
}
