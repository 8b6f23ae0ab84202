//! Core data model for research-rs
//!
//! This crate defines the types shared by the orchestration crates:
//!
//! - [`TaskType`] and [`Task`]: a unit of analysis work routed to a model backend
//! - [`Payload`]: the request content forwarded verbatim to provider clients
//! - [`Provider`] and [`ProviderId`]: the static description of a model backend

pub mod error;
pub mod provider;
pub mod task;

pub use error::{Error, Result};
pub use provider::{Provider, ProviderBuilder, ProviderId};
pub use task::{DEFAULT_TASK_TIMEOUT, Payload, Task, TaskType};
