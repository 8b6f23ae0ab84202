//! Shared utilities for research-rs
//!
//! This crate provides common functionality used across the research-rs workspace:
//! tracing subscriber setup and JSON configuration file loading.

pub mod config;
pub mod logging;

pub use config::{ConfigError, read_json_file, read_json_str};
pub use logging::{LogFormat, init_tracing, init_tracing_with};
