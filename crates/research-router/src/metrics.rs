//! Attempt and routing counters
//!
//! Counters are plain atomics in a map fixed at construction, so writers
//! never contend on a lock.

use research_core::ProviderId;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::{Attempt, HealthMonitor, HealthSnapshot};

#[derive(Debug, Default)]
struct ProviderCounters {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    skipped: AtomicU64,
    throttled: AtomicU64,
    cancelled: AtomicU64,
    latency_micros: AtomicU64,
}

/// Aggregates attempt outcomes for observability
#[derive(Debug)]
pub struct MetricsCollector {
    providers: HashMap<ProviderId, ProviderCounters>,
    health: Arc<HealthMonitor>,
    total_attempts: AtomicU64,
    total_retries: AtomicU64,
    routed: AtomicU64,
    fallbacks: AtomicU64,
    exhaustions: AtomicU64,
    deadlines_exceeded: AtomicU64,
}

/// Per-provider view in a [`MetricsSnapshot`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderMetrics {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    /// Skipped because the breaker was not closed
    pub skipped: u64,
    pub throttled: u64,
    /// Cancelled by the task deadline
    pub cancelled: u64,
    pub avg_latency_ms: f64,
    pub breaker: Option<HealthSnapshot>,
}

/// Consistent copy of all counters
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub total_attempts: u64,
    pub total_retries: u64,
    /// Tasks that returned a result
    pub routed: u64,
    /// Providers skipped or failed before the one that answered, summed over tasks
    pub fallbacks: u64,
    pub exhaustions: u64,
    pub deadlines_exceeded: u64,
    pub providers: BTreeMap<ProviderId, ProviderMetrics>,
}

impl MetricsCollector {
    pub fn new(providers: impl IntoIterator<Item = ProviderId>, health: Arc<HealthMonitor>) -> Self {
        Self {
            providers: providers
                .into_iter()
                .map(|id| (id, ProviderCounters::default()))
                .collect(),
            health,
            total_attempts: AtomicU64::new(0),
            total_retries: AtomicU64::new(0),
            routed: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
            exhaustions: AtomicU64::new(0),
            deadlines_exceeded: AtomicU64::new(0),
        }
    }

    fn counters(&self, provider: &ProviderId) -> Option<&ProviderCounters> {
        let counters = self.providers.get(provider);
        if counters.is_none() {
            debug!(provider = %provider, "Metrics for unregistered provider dropped");
        }
        counters
    }

    /// Fold one finished provider attempt
    pub fn record_attempt(&self, attempt: &Attempt) {
        self.total_attempts.fetch_add(1, Ordering::Relaxed);
        self.total_retries
            .fetch_add(u64::from(attempt.retries), Ordering::Relaxed);

        if let Some(counters) = self.counters(&attempt.provider) {
            counters.attempts.fetch_add(1, Ordering::Relaxed);
            if attempt.is_success() {
                counters.successes.fetch_add(1, Ordering::Relaxed);
            } else {
                counters.failures.fetch_add(1, Ordering::Relaxed);
            }
            let micros = u64::try_from(attempt.latency().as_micros()).unwrap_or(u64::MAX);
            counters.latency_micros.fetch_add(micros, Ordering::Relaxed);
        }
    }

    pub fn record_skipped(&self, provider: &ProviderId) {
        if let Some(counters) = self.counters(provider) {
            counters.skipped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_throttled(&self, provider: &ProviderId) {
        if let Some(counters) = self.counters(provider) {
            counters.throttled.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_cancelled(&self, provider: &ProviderId) {
        if let Some(counters) = self.counters(provider) {
            counters.cancelled.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_routed(&self, fallback_count: usize) {
        self.routed.fetch_add(1, Ordering::Relaxed);
        self.fallbacks
            .fetch_add(fallback_count as u64, Ordering::Relaxed);
    }

    pub fn record_exhausted(&self) {
        self.exhaustions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deadline_exceeded(&self) {
        self.deadlines_exceeded.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy every counter and breaker state
    pub fn snapshot(&self) -> MetricsSnapshot {
        let providers = self
            .providers
            .iter()
            .map(|(id, counters)| {
                let attempts = counters.attempts.load(Ordering::Relaxed);
                let latency_micros = counters.latency_micros.load(Ordering::Relaxed);
                let avg_latency_ms = if attempts == 0 {
                    0.0
                } else {
                    latency_micros as f64 / attempts as f64 / 1000.0
                };

                let metrics = ProviderMetrics {
                    attempts,
                    successes: counters.successes.load(Ordering::Relaxed),
                    failures: counters.failures.load(Ordering::Relaxed),
                    skipped: counters.skipped.load(Ordering::Relaxed),
                    throttled: counters.throttled.load(Ordering::Relaxed),
                    cancelled: counters.cancelled.load(Ordering::Relaxed),
                    avg_latency_ms,
                    breaker: self.health.snapshot(id).ok(),
                };
                (id.clone(), metrics)
            })
            .collect();

        MetricsSnapshot {
            total_attempts: self.total_attempts.load(Ordering::Relaxed),
            total_retries: self.total_retries.load(Ordering::Relaxed),
            routed: self.routed.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            exhaustions: self.exhaustions.load(Ordering::Relaxed),
            deadlines_exceeded: self.deadlines_exceeded.load(Ordering::Relaxed),
            providers,
        }
    }
}
