//! TTL cache in front of a job runner
//!
//! Repeated targets within one report (the same filing page fetched by two
//! stages, for example) are served from memory. Only successful payloads are
//! cached.

use async_trait::async_trait;
use cached::{Cached, TimedCache};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{JobRunner, Result};

/// Wraps any [`JobRunner`] with a time-bounded cache keyed by target
pub struct CachedRunner<R> {
    inner: R,
    cache: Arc<RwLock<TimedCache<String, String>>>,
}

impl<R: JobRunner> CachedRunner<R> {
    pub fn new(inner: R, ttl: Duration) -> Self {
        Self {
            inner,
            cache: Arc::new(RwLock::new(TimedCache::with_lifespan(ttl))),
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub async fn invalidate(&self, target: &str) {
        let mut cache = self.cache.write().await;
        let _ = cache.cache_remove(target);
    }

    pub async fn clear(&self) {
        self.cache.write().await.cache_clear();
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.cache_size()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<R> std::fmt::Debug for CachedRunner<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedRunner").finish_non_exhaustive()
    }
}

#[async_trait]
impl<R: JobRunner> JobRunner for CachedRunner<R> {
    async fn run(&self, target: &str, timeout: Duration) -> Result<String> {
        // cache_get refreshes hit statistics, hence the write lock
        if let Some(payload) = self.cache.write().await.cache_get(target).cloned() {
            debug!(job = target, "Cache hit");
            return Ok(payload);
        }

        debug!(job = target, "Cache miss");
        let payload = self.inner.run(target, timeout).await?;
        let _ = self
            .cache
            .write()
            .await
            .cache_set(target.to_string(), payload.clone());
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FetchError;
    use mockall::mock;
    use mockall::predicate::{always, eq};

    mock! {
        pub Runner {}

        #[async_trait]
        impl JobRunner for Runner {
            async fn run(&self, target: &str, timeout: Duration) -> Result<String>;
        }
    }

    #[tokio::test]
    async fn test_hit_skips_inner_runner() {
        let mut inner = MockRunner::new();
        inner
            .expect_run()
            .with(eq("https://example.com/a"), always())
            .times(1)
            .returning(|target, _| Ok(format!("body of {target}")));
        let runner = CachedRunner::new(inner, Duration::from_secs(300));

        for _ in 0..3 {
            let payload = runner
                .run("https://example.com/a", Duration::from_secs(1))
                .await
                .unwrap();
            assert_eq!(payload, "body of https://example.com/a");
        }
        assert_eq!(runner.len().await, 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let mut inner = MockRunner::new();
        inner
            .expect_run()
            .times(2)
            .returning(|_, _| Err(FetchError::Failed("HTTP 503".into())));
        let runner = CachedRunner::new(inner, Duration::from_secs(300));

        assert!(runner.run("https://example.com/b", Duration::from_secs(1)).await.is_err());
        assert!(runner.run("https://example.com/b", Duration::from_secs(1)).await.is_err());
        assert!(runner.is_empty().await);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let mut inner = MockRunner::new();
        inner
            .expect_run()
            .times(2)
            .returning(|_, _| Ok("fresh".to_string()));
        let runner = CachedRunner::new(inner, Duration::from_secs(300));

        runner.run("t", Duration::from_secs(1)).await.unwrap();
        runner.invalidate("t").await;
        runner.run("t", Duration::from_secs(1)).await.unwrap();

        runner.clear().await;
        assert!(runner.is_empty().await);
    }
}
