//! Concrete [`JobRunner`](crate::JobRunner) implementations

pub mod http;

pub use http::HttpRunner;
