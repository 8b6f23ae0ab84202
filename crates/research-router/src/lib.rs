//! Provider fallback router for research-rs
//!
//! The router executes a [`research_core::Task`] against an ordered chain of
//! interchangeable model backends:
//!
//! - [`ProviderRegistry`]: providers and their clients, fixed at startup
//! - [`RoutingPolicy`]: task type to ordered fallback chain
//! - [`HealthMonitor`]: one circuit breaker per provider
//! - [`RequestExecutor`]: one provider attempt with timeout, local retries, and limits
//! - [`FallbackRouter`]: walks the chain until a provider answers
//! - [`MetricsCollector`]: lock-free counters with a comparable snapshot
//!
//! # Example
//!
//! ```no_run
//! use research_core::{Payload, Provider, Task, TaskType};
//! use research_router::FallbackRouter;
//! # use std::sync::Arc;
//! # async fn demo(groq: Arc<dyn research_llm::ProviderClient>, gemini: Arc<dyn research_llm::ProviderClient>) -> Result<(), Box<dyn std::error::Error>> {
//!
//! let router = FallbackRouter::builder()
//!     .provider(Provider::builder("groq").capability(TaskType::Research).build()?, groq)
//!     .provider(Provider::builder("gemini").capability(TaskType::Research).build()?, gemini)
//!     .route(TaskType::Research, ["groq", "gemini"])
//!     .build()?;
//!
//! let result = router
//!     .execute(&Task::new(TaskType::Research, Payload::new("Summarize AAPL's 10-K")))
//!     .await?;
//! println!("{} answered after {} fallbacks", result.provider_used, result.fallback_count);
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod config;
pub mod error;
pub mod executor;
pub mod health;
pub mod limits;
pub mod metrics;
pub mod policy;
pub mod registry;
pub mod router;

pub use backoff::{Backoff, RetryPolicy};
pub use config::{BreakerSettings, OrchestratorConfig, ProviderEntry, ProviderKind, RetrySettings};
pub use error::{FailureReason, ProviderFailure, Result, RouterError};
pub use executor::{Attempt, AttemptError, RequestExecutor};
pub use health::{Admission, BreakerConfig, CircuitState, HealthMonitor, HealthSnapshot, Outcome};
pub use limits::{ProviderLimits, Throttled};
pub use metrics::{MetricsCollector, MetricsSnapshot, ProviderMetrics};
pub use policy::RoutingPolicy;
pub use registry::{ProviderRegistry, RegisteredProvider};
pub use router::{FallbackRouter, FallbackRouterBuilder, RouteResult};
