//! Bounded-concurrency fetch coordinator for research-rs
//!
//! Research stages gather their raw material (quote pages, filings, news
//! articles) as batches of independent [`FetchJob`]s. The
//! [`FetchCoordinator`] runs a batch with a fixed concurrency limit, a
//! timeout per job and a deadline for the whole batch, and always answers
//! with one [`FetchOutcome`] per job.
//!
//! # Example
//!
//! ```no_run
//! use research_fetch::{CachedRunner, FetchCoordinator, FetchJob, HttpRunner};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let runner = CachedRunner::new(HttpRunner::new(), Duration::from_secs(300));
//! let coordinator = FetchCoordinator::new(Arc::new(runner));
//!
//! let jobs = vec![
//!     FetchJob::new("https://example.com/a").with_timeout(Duration::from_secs(10)),
//!     FetchJob::new("https://example.com/b").with_timeout(Duration::from_secs(10)),
//! ];
//! let outcomes = coordinator
//!     .run_batch_within(jobs, 4, Duration::from_secs(30))
//!     .await;
//! assert_eq!(outcomes.len(), 2);
//! # }
//! ```

pub mod cache;
pub mod coordinator;
pub mod error;
pub mod job;
pub mod runners;

pub use cache::CachedRunner;
pub use coordinator::FetchCoordinator;
pub use error::{FetchError, FetchErrorKind, Result};
pub use job::{BatchSummary, DEFAULT_JOB_TIMEOUT, FetchJob, FetchOutcome, JobRunner};
pub use runners::HttpRunner;
