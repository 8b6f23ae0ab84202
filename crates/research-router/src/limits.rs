//! Local concurrency and rate limits for one provider

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use research_core::Provider;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// The local rate limiter rejected the call before it reached the provider
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("local rate limit reached")]
pub struct Throttled;

/// Concurrency cap and token bucket derived from a [`Provider`]
pub struct ProviderLimits {
    semaphore: Arc<Semaphore>,
    limiter: Option<DefaultDirectRateLimiter>,
}

impl ProviderLimits {
    pub fn new(provider: &Provider) -> Self {
        let permits = provider.max_concurrent.clamp(1, Semaphore::MAX_PERMITS);
        let limiter = NonZeroU32::new(provider.rate_limit_per_minute)
            .map(|per_minute| RateLimiter::direct(Quota::per_minute(per_minute)));

        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
            limiter,
        }
    }

    /// Wait for a concurrency slot
    ///
    /// The slot is held until the returned permit is dropped.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, Throttled> {
        // The semaphore is never closed
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| Throttled)
    }

    /// Take one rate-limit token for a single provider call
    ///
    /// Does not wait for the bucket to refill.
    pub fn take_token(&self) -> Result<(), Throttled> {
        match &self.limiter {
            Some(limiter) => limiter.check().map_err(|_| Throttled),
            None => Ok(()),
        }
    }

    /// Free concurrency slots
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl fmt::Debug for ProviderLimits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderLimits")
            .field("available_permits", &self.available_permits())
            .field("rate_limited", &self.limiter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use research_core::TaskType;

    fn provider(max_concurrent: usize, per_minute: u32) -> Provider {
        Provider::builder("groq")
            .capability(TaskType::Research)
            .max_concurrent(max_concurrent)
            .rate_limit_per_minute(per_minute)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_permits_are_released_on_drop() {
        let limits = ProviderLimits::new(&provider(2, 0));

        let first = limits.acquire().await.unwrap();
        let _second = limits.acquire().await.unwrap();
        assert_eq!(limits.available_permits(), 0);

        drop(first);
        assert_eq!(limits.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_without_waiting() {
        let limits = ProviderLimits::new(&provider(4, 1));

        let permit = limits.acquire().await.unwrap();
        assert!(limits.take_token().is_ok());
        assert_eq!(limits.take_token().unwrap_err(), Throttled);
        drop(permit);

        assert_eq!(limits.available_permits(), 4);
    }

    #[tokio::test]
    async fn test_zero_means_unlimited() {
        let limits = ProviderLimits::new(&provider(1, 0));
        for _ in 0..100 {
            let _permit = limits.acquire().await.unwrap();
            limits.take_token().unwrap();
        }
    }
}
