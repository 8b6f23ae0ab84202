//! Backoff policy shared by local retries and breaker cooldowns

use std::time::Duration;

/// Exponential backoff with an optional jitter and a cap
///
/// The delay for attempt `n` (0-based) is `base * multiplier^n`, capped at
/// `max`. With jitter enabled the delay is spread over +/- 50% and then
/// capped again.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub base: Duration,
    pub multiplier: f64,
    pub max: Duration,
    pub jitter: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(200),
            multiplier: 2.0,
            max: Duration::from_secs(5),
            jitter: true,
        }
    }
}

impl Backoff {
    /// Deterministic exponential backoff
    pub fn exponential(base: Duration, multiplier: f64, max: Duration) -> Self {
        Self {
            base,
            multiplier,
            max,
            jitter: false,
        }
    }

    /// Breaker cooldown: 30s doubling per reopen, capped at 10 minutes
    pub fn cooldown() -> Self {
        Self::exponential(Duration::from_secs(30), 2.0, Duration::from_secs(600))
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let seconds = self.base.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = Duration::try_from_secs_f64(seconds.min(self.max.as_secs_f64()))
            .unwrap_or(self.max);

        if !self.jitter {
            return capped;
        }

        let spread_ms = (capped.as_millis() as f64 * 0.5) as u64;
        let offset = fastrand::u64(0..=spread_ms * 2);
        let total_ms = (capped.as_millis() as u64 + offset).saturating_sub(spread_ms);
        Duration::from_millis(total_ms).min(self.max)
    }
}

/// Local retry budget for transient failures against one provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first call; total calls = `max_retries + 1`
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Backoff) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Policy with no retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}
