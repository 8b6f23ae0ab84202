//! Fallback router
//!
//! Walks the chain configured for a task type, one provider at a time,
//! until a provider answers, the chain runs out, or the task deadline passes.

use research_core::{Provider, ProviderId, Task, TaskType};
use research_llm::{ProviderClient, TokenUsage};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::executor::DEFAULT_ATTEMPT_TIMEOUT;
use crate::{
    AttemptError, BreakerConfig, FailureReason, HealthMonitor, MetricsCollector, ProviderFailure,
    ProviderRegistry, RequestExecutor, Result, RetryPolicy, RouterError, RoutingPolicy,
};

/// Successful routing outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteResult {
    pub content: String,
    pub provider_used: ProviderId,
    /// Providers skipped or failed before `provider_used`
    pub fallback_count: usize,
    /// Heuristic in 0-1 from provider quality, latency, reliability, and fallbacks
    pub confidence_score: f64,
    pub total_latency: Duration,
    /// Estimated spend in provider cost units
    pub cost_estimate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(skip)]
    pub failures: Vec<ProviderFailure>,
}

/// Executes tasks against their fallback chains
#[derive(Debug)]
pub struct FallbackRouter {
    registry: Arc<ProviderRegistry>,
    policy: RoutingPolicy,
    health: Arc<HealthMonitor>,
    metrics: Arc<MetricsCollector>,
    executor: RequestExecutor,
}

impl FallbackRouter {
    pub fn builder() -> FallbackRouterBuilder {
        FallbackRouterBuilder::new()
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &RoutingPolicy {
        &self.policy
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Execute `task` against its fallback chain
    ///
    /// Providers are tried strictly one after another in chain order.
    /// Providers whose breaker is not closed, or whose cost exceeds the
    /// task's budget ceiling, are skipped without being contacted.
    #[instrument(skip(self, task), fields(task_type = %task.task_type))]
    pub async fn execute(&self, task: &Task) -> Result<RouteResult> {
        let started = Instant::now();
        let chain = self
            .policy
            .chain_for(task.task_type)
            .ok_or(RouterError::NoRoute(task.task_type))?;

        let mut failures = Vec::new();
        let mut invoked = 0;

        for id in chain {
            if task.is_expired() {
                return Err(self.deadline_exceeded(task.task_type, failures));
            }
            if task.max_attempts.is_some_and(|max| invoked >= max) {
                debug!(invoked, "Attempt budget spent");
                break;
            }

            let entry = match self.registry.get(id) {
                Ok(entry) => entry,
                Err(_) => {
                    failures.push(ProviderFailure::new(id.clone(), FailureReason::UnknownProvider));
                    continue;
                }
            };

            if let Some(ceiling) = task.budget_ceiling {
                let cost = entry.provider.cost_weight;
                if cost > ceiling {
                    debug!(provider = %id, cost, ceiling, "Skipping provider over budget");
                    failures.push(ProviderFailure::new(
                        id.clone(),
                        FailureReason::OverBudget { cost, ceiling },
                    ));
                    continue;
                }
            }

            let attempt_started = Instant::now();
            match self.executor.execute(entry, task).await {
                Ok(completion) => {
                    let fallback_count = failures.len();
                    let attempt_latency = attempt_started.elapsed();
                    self.metrics.record_routed(fallback_count);
                    info!(
                        provider = %id,
                        fallback_count,
                        latency = ?attempt_latency,
                        "Task routed"
                    );

                    return Ok(RouteResult {
                        confidence_score: confidence_score(
                            &entry.provider,
                            attempt_latency,
                            fallback_count,
                        ),
                        cost_estimate: cost_estimate(
                            &entry.provider,
                            completion.usage,
                            task.payload.word_count(),
                            &completion.content,
                        ),
                        usage: completion.usage,
                        content: completion.content,
                        provider_used: id.clone(),
                        fallback_count,
                        total_latency: started.elapsed(),
                        failures,
                    });
                }
                Err(AttemptError::DeadlineExceeded) => {
                    return Err(self.deadline_exceeded(task.task_type, failures));
                }
                Err(AttemptError::Unavailable(state)) => {
                    failures.push(ProviderFailure::new(id.clone(), FailureReason::CircuitOpen(state)));
                }
                Err(AttemptError::Throttled(_)) => {
                    failures.push(ProviderFailure::new(id.clone(), FailureReason::Throttled));
                }
                Err(AttemptError::Provider(err)) => {
                    invoked += 1;
                    failures.push(ProviderFailure::new(id.clone(), FailureReason::Provider(err)));
                }
            }
        }

        if task.is_expired() {
            return Err(self.deadline_exceeded(task.task_type, failures));
        }

        warn!(tried = failures.len(), "All providers exhausted");
        self.metrics.record_exhausted();
        Err(RouterError::AllProvidersExhausted {
            task_type: task.task_type,
            failures,
        })
    }

    fn deadline_exceeded(&self, task_type: TaskType, failures: Vec<ProviderFailure>) -> RouterError {
        warn!(tried = failures.len(), "Task deadline exceeded");
        self.metrics.record_deadline_exceeded();
        RouterError::DeadlineExceeded {
            task_type,
            failures,
        }
    }
}

/// Confidence heuristic for a routed answer
///
/// Quality contributes 40%, a latency factor 20% (full marks at zero,
/// 0.8 at five seconds or slower), and reliability 30%. Each fallback
/// costs 0.1. Clamped to 0-1.
fn confidence_score(provider: &Provider, latency: Duration, fallback_count: usize) -> f64 {
    let base = provider.quality_rating / 10.0;
    let time_factor = (latency.as_secs_f64() / 5.0).min(1.0);
    let time_confidence = 1.0 - time_factor * 0.2;
    let penalty = fallback_count as f64 * 0.1;

    (base * 0.4 + time_confidence * 0.2 + provider.reliability * 0.3 - penalty).clamp(0.0, 1.0)
}

/// Spend estimate; falls back to a word count when the backend reports no usage
fn cost_estimate(
    provider: &Provider,
    usage: Option<TokenUsage>,
    prompt_words: usize,
    content: &str,
) -> f64 {
    let tokens = usage.map_or_else(
        || prompt_words + content.split_whitespace().count(),
        |usage| usage.total(),
    );
    tokens as f64 / 1000.0 * provider.cost_weight
}

/// Builder for [`FallbackRouter`]
///
/// Without explicit routes, chains are derived from provider capabilities.
pub struct FallbackRouterBuilder {
    providers: Vec<(Provider, Arc<dyn ProviderClient>)>,
    policy: RoutingPolicy,
    breaker: BreakerConfig,
    breaker_overrides: HashMap<ProviderId, BreakerConfig>,
    retry: RetryPolicy,
    attempt_timeout: Duration,
}

impl FallbackRouterBuilder {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            policy: RoutingPolicy::new(),
            breaker: BreakerConfig::default(),
            breaker_overrides: HashMap::new(),
            retry: RetryPolicy::default(),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    /// Register a provider and its client
    pub fn provider(mut self, provider: Provider, client: Arc<dyn ProviderClient>) -> Self {
        self.providers.push((provider, client));
        self
    }

    /// Set the fallback chain for a task type
    pub fn route<I, P>(mut self, task_type: TaskType, providers: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ProviderId>,
    {
        self.policy.set_chain(task_type, providers);
        self
    }

    /// Replace the whole routing policy
    pub fn routing_policy(mut self, policy: RoutingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Breaker settings for providers without an override
    pub fn breaker_config(mut self, config: BreakerConfig) -> Self {
        self.breaker = config;
        self
    }

    pub fn breaker_override(mut self, provider: impl Into<ProviderId>, config: BreakerConfig) -> Self {
        self.breaker_overrides.insert(provider.into(), config);
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Build the router
    ///
    /// # Errors
    ///
    /// Fails on duplicate provider ids, on chains naming unknown providers,
    /// and on breaker overrides for unknown providers.
    pub fn build(self) -> Result<FallbackRouter> {
        let mut registry = ProviderRegistry::new();
        for (provider, client) in self.providers {
            registry.register(provider, client)?;
        }

        if let Some(id) = self.breaker_overrides.keys().find(|id| !registry.contains(id)) {
            return Err(RouterError::UnknownProvider(id.clone()));
        }

        let policy = if self.policy.is_empty() {
            debug!("No routes configured, deriving chains from capabilities");
            RoutingPolicy::from_capabilities(&registry)
        } else {
            self.policy
        };
        policy.validate(&registry)?;

        let health = Arc::new(HealthMonitor::new(registry.providers().map(|p| {
            let config = self
                .breaker_overrides
                .get(&p.id)
                .copied()
                .unwrap_or(self.breaker);
            (p.id.clone(), config)
        })));
        let metrics = Arc::new(MetricsCollector::new(
            registry.providers().map(|p| p.id.clone()),
            Arc::clone(&health),
        ));
        let executor = RequestExecutor::new(
            self.retry,
            self.attempt_timeout,
            Arc::clone(&health),
            Arc::clone(&metrics),
        );

        info!(
            providers = registry.len(),
            chains = policy.iter().count(),
            "Fallback router ready"
        );

        Ok(FallbackRouter {
            registry: Arc::new(registry),
            policy,
            health,
            metrics,
            executor,
        })
    }
}

impl Default for FallbackRouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
