//! Per-provider circuit breakers
//!
//! Each provider owns an independent breaker behind its own mutex. The set
//! of providers is fixed when the monitor is built, so lookups need no
//! global lock.

use chrono::{DateTime, Utc};
use research_core::ProviderId;
use research_llm::{ErrorKind, ProviderError};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{Backoff, Result, RouterError};

/// Breaker state of one provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        })
    }
}

/// Breaker thresholds and timers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakerConfig {
    /// Failures within `window` that open the breaker
    pub failure_threshold: u32,
    /// Sliding window over which failures are counted
    pub window: Duration,
    /// Cooldown indexed by how many times the breaker opened this cycle
    pub cooldown: Backoff,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            window: Duration::from_secs(60),
            cooldown: Backoff::cooldown(),
        }
    }
}

impl BreakerConfig {
    fn cooldown_for(&self, open_count: u32) -> Duration {
        self.cooldown.delay(open_count.saturating_sub(1))
    }
}

/// Outcome of one provider attempt as seen by the breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    /// Rate limited; counts like an ordinary failure
    SoftFailure,
    /// Authentication failure; opens the breaker at once
    HardFailure,
}

impl Outcome {
    pub fn from_error(error: &ProviderError) -> Self {
        match error.kind() {
            ErrorKind::RateLimit => Self::SoftFailure,
            ErrorKind::Auth => Self::HardFailure,
            ErrorKind::Transient | ErrorKind::InvalidResponse => Self::Failure,
        }
    }
}

/// Point-in-time view of one breaker
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub open_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    cooldown: Duration,
    open_count: u32,
    last_success_at: Option<DateTime<Utc>>,
    probe_in_flight: bool,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: VecDeque::new(),
            opened_at: None,
            cooldown: Duration::ZERO,
            open_count: 0,
            last_success_at: None,
            probe_in_flight: false,
        }
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        self.opened_at
            .is_some_and(|opened_at| now >= opened_at + self.cooldown)
    }

    /// State after applying an elapsed cooldown, without mutating
    fn effective_state(&self, now: Instant) -> CircuitState {
        if self.state == CircuitState::Open && self.cooldown_elapsed(now) {
            CircuitState::HalfOpen
        } else {
            self.state
        }
    }
}

#[derive(Debug)]
struct Breaker {
    provider: ProviderId,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl Breaker {
    fn new(provider: ProviderId, config: BreakerConfig) -> Self {
        Self {
            provider,
            config,
            inner: Mutex::new(BreakerInner::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn refresh(&self, inner: &mut BreakerInner, now: Instant) {
        if inner.state == CircuitState::Open && inner.cooldown_elapsed(now) {
            inner.state = CircuitState::HalfOpen;
            inner.probe_in_flight = false;
            info!(provider = %self.provider, "Circuit half-open, admitting one probe");
        }
    }

    fn is_available(&self, now: Instant) -> bool {
        let mut inner = self.lock();
        self.refresh(&mut inner, now);
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => !inner.probe_in_flight,
            CircuitState::Open => false,
        }
    }

    fn try_admit(&self, now: Instant) -> std::result::Result<bool, CircuitState> {
        let mut inner = self.lock();
        self.refresh(&mut inner, now);
        match inner.state {
            CircuitState::Closed => Ok(false),
            CircuitState::HalfOpen if !inner.probe_in_flight => {
                inner.probe_in_flight = true;
                Ok(true)
            }
            state => Err(state),
        }
    }

    fn release_probe(&self) {
        let mut inner = self.lock();
        if inner.probe_in_flight {
            inner.probe_in_flight = false;
            debug!(provider = %self.provider, "Probe released without an outcome");
        }
    }

    fn trip(&self, inner: &mut BreakerInner, now: Instant) {
        inner.open_count = inner.open_count.saturating_add(1);
        inner.cooldown = self.config.cooldown_for(inner.open_count);
        inner.state = CircuitState::Open;
        inner.opened_at = Some(now);
        inner.failures.clear();
        inner.probe_in_flight = false;
        warn!(
            provider = %self.provider,
            open_count = inner.open_count,
            cooldown = ?inner.cooldown,
            "Circuit opened"
        );
    }

    fn record(&self, outcome: Outcome, probe: bool, now: Instant) {
        let mut inner = self.lock();
        self.refresh(&mut inner, now);

        // Only the probe decides how a half-open breaker leaves that state
        if inner.state == CircuitState::HalfOpen && !probe {
            debug!(provider = %self.provider, ?outcome, "Ignoring non-probe outcome while half-open");
            return;
        }

        match outcome {
            Outcome::Success => {
                inner.last_success_at = Some(Utc::now());
                match inner.state {
                    CircuitState::Closed => inner.failures.clear(),
                    CircuitState::HalfOpen => {
                        info!(provider = %self.provider, "Probe succeeded, circuit closed");
                        inner.state = CircuitState::Closed;
                        inner.failures.clear();
                        inner.opened_at = None;
                        inner.open_count = 0;
                        inner.probe_in_flight = false;
                    }
                    // Straggler from before the breaker opened
                    CircuitState::Open => {}
                }
            }
            Outcome::HardFailure => {
                if inner.state != CircuitState::Open {
                    self.trip(&mut inner, now);
                }
            }
            Outcome::Failure | Outcome::SoftFailure => match inner.state {
                CircuitState::Closed => {
                    let window = self.config.window;
                    while inner
                        .failures
                        .front()
                        .is_some_and(|&at| now.duration_since(at) > window)
                    {
                        inner.failures.pop_front();
                    }
                    inner.failures.push_back(now);

                    let failures = inner.failures.len();
                    debug!(provider = %self.provider, failures, "Failure recorded");
                    if failures >= self.config.failure_threshold as usize {
                        self.trip(&mut inner, now);
                    }
                }
                CircuitState::HalfOpen => self.trip(&mut inner, now),
                CircuitState::Open => {}
            },
        }
    }

    fn snapshot(&self, now: Instant) -> HealthSnapshot {
        let inner = self.lock();
        HealthSnapshot {
            state: inner.effective_state(now),
            consecutive_failures: inner.failures.len() as u32,
            open_count: inner.open_count,
            last_success_at: inner.last_success_at,
        }
    }

    fn cooldown(&self) -> Option<Duration> {
        let inner = self.lock();
        (inner.state == CircuitState::Open).then_some(inner.cooldown)
    }
}

/// Circuit breakers for a fixed set of providers
#[derive(Debug)]
pub struct HealthMonitor {
    breakers: HashMap<ProviderId, Breaker>,
}

impl HealthMonitor {
    /// Build a monitor for the given providers and their breaker settings
    pub fn new(providers: impl IntoIterator<Item = (ProviderId, BreakerConfig)>) -> Self {
        let breakers = providers
            .into_iter()
            .map(|(id, config)| (id.clone(), Breaker::new(id, config)))
            .collect();
        Self { breakers }
    }

    fn breaker(&self, provider: &ProviderId) -> Result<&Breaker> {
        self.breakers
            .get(provider)
            .ok_or_else(|| RouterError::UnknownProvider(provider.clone()))
    }

    /// Fold one attempt outcome into the provider's breaker
    ///
    /// The outcome is treated as coming from an ordinary attempt, so it is
    /// ignored while the breaker is half-open.
    pub fn record_outcome(&self, provider: &ProviderId, outcome: Outcome) -> Result<()> {
        self.breaker(provider)?.record(outcome, false, Instant::now());
        Ok(())
    }

    /// Whether an attempt against `provider` would be admitted right now
    ///
    /// Moves an open breaker whose cooldown has elapsed to half-open.
    /// Unknown providers are never available.
    pub fn is_available(&self, provider: &ProviderId) -> bool {
        self.breaker(provider)
            .is_ok_and(|breaker| breaker.is_available(Instant::now()))
    }

    /// Current state, reporting an open breaker past its cooldown as half-open
    pub fn current_state(&self, provider: &ProviderId) -> Result<CircuitState> {
        Ok(self.breaker(provider)?.snapshot(Instant::now()).state)
    }

    /// Cooldown of an open breaker
    pub fn cooldown(&self, provider: &ProviderId) -> Result<Option<Duration>> {
        Ok(self.breaker(provider)?.cooldown())
    }

    pub fn snapshot(&self, provider: &ProviderId) -> Result<HealthSnapshot> {
        Ok(self.breaker(provider)?.snapshot(Instant::now()))
    }

    /// Atomically check availability and, in half-open, claim the single probe
    ///
    /// Returns the blocking state when the provider is not admitted.
    pub fn try_admit(
        &self,
        provider: &ProviderId,
    ) -> Result<std::result::Result<Admission<'_>, CircuitState>> {
        let breaker = self.breaker(provider)?;
        Ok(breaker.try_admit(Instant::now()).map(|probe| Admission {
            breaker,
            probe,
            resolved: false,
        }))
    }
}

/// Permission to contact a provider, obtained from [`HealthMonitor::try_admit`]
///
/// Report the attempt with [`Admission::record`]. A half-open probe dropped
/// without an outcome frees the probe slot and leaves the state unchanged.
#[derive(Debug)]
pub struct Admission<'a> {
    breaker: &'a Breaker,
    probe: bool,
    resolved: bool,
}

impl Admission<'_> {
    /// Whether this admission is the half-open probe
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn record(mut self, outcome: Outcome) {
        self.resolved = true;
        self.breaker.record(outcome, self.probe, Instant::now());
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if self.probe && !self.resolved {
            self.breaker.release_probe();
        }
    }
}
