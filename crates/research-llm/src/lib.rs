//! Provider client abstraction layer for research-rs
//!
//! This crate defines the single capability the router depends on:
//!
//! - [`ProviderClient`]: invoke a payload against one model backend
//! - [`Completion`] and [`TokenUsage`]: what a successful call returns
//! - [`ProviderError`] and [`ErrorKind`]: the failure taxonomy used for fallback
//! - Concrete adapters for OpenAI-compatible APIs and Gemini (behind feature flags)

pub mod client;
pub mod completion;
pub mod error;

// Re-export main types
pub use client::ProviderClient;
pub use completion::{Completion, TokenUsage};
pub use error::{ErrorKind, ProviderError, Result};

// Provider implementations (feature-gated)
#[cfg(any(feature = "openai", feature = "gemini"))]
pub mod providers;
