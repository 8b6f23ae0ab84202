//! Startup configuration
//!
//! The orchestrator reads one JSON document describing providers, routing,
//! breaker and retry tunables:
//!
//! ```json
//! {
//!   "providers": [
//!     {
//!       "id": "groq-llama-70b",
//!       "kind": "groq",
//!       "model": "llama-3.3-70b-versatile",
//!       "apiKeyEnv": "GROQ_API_KEY",
//!       "capabilities": ["research", "sentiment"],
//!       "costWeight": 0.0007,
//!       "rateLimitPerMinute": 30,
//!       "qualityRating": 8.5,
//!       "speedRating": 9.2,
//!       "reliability": 0.95,
//!       "breaker": { "failureThreshold": 2 }
//!     }
//!   ],
//!   "routing": { "research": ["groq-llama-70b"] },
//!   "breaker": { "failureThreshold": 3, "cooldownBaseMs": 30000 },
//!   "retry": { "maxRetries": 2 },
//!   "attemptTimeoutMs": 30000
//! }
//! ```

use research_core::{Provider, TaskType};
use research_llm::{ProviderClient, ProviderError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    Backoff, BreakerConfig, FallbackRouterBuilder, Result, RetryPolicy, RouterError, RoutingPolicy,
};

/// Backend family of a configured provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAI,
    Groq,
    Gemini,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Groq => "groq",
            Self::Gemini => "gemini",
        }
    }

    /// Environment variable holding the API key when none is configured
    pub fn default_api_key_env(self) -> &'static str {
        match self {
            Self::OpenAI => "OPENAI_API_KEY",
            Self::Groq => "GROQ_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
        }
    }
}

/// Partial breaker settings; unset fields inherit
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSettings {
    pub failure_threshold: Option<u32>,
    pub window_ms: Option<u64>,
    pub cooldown_base_ms: Option<u64>,
    pub cooldown_multiplier: Option<f64>,
    pub cooldown_max_ms: Option<u64>,
}

impl BreakerSettings {
    /// Apply these settings over `base`
    pub fn resolve(&self, base: &BreakerConfig) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold.unwrap_or(base.failure_threshold),
            window: self.window_ms.map_or(base.window, Duration::from_millis),
            cooldown: Backoff {
                base: self
                    .cooldown_base_ms
                    .map_or(base.cooldown.base, Duration::from_millis),
                multiplier: self.cooldown_multiplier.unwrap_or(base.cooldown.multiplier),
                max: self
                    .cooldown_max_ms
                    .map_or(base.cooldown.max, Duration::from_millis),
                jitter: false,
            },
        }
    }
}

/// Local retry settings; unset fields use the defaults
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrySettings {
    pub max_retries: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub multiplier: Option<f64>,
    pub max_delay_ms: Option<u64>,
    pub jitter: Option<bool>,
}

impl RetrySettings {
    pub fn resolve(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            backoff: Backoff {
                base: self
                    .base_delay_ms
                    .map_or(defaults.backoff.base, Duration::from_millis),
                multiplier: self.multiplier.unwrap_or(defaults.backoff.multiplier),
                max: self
                    .max_delay_ms
                    .map_or(defaults.backoff.max, Duration::from_millis),
                jitter: self.jitter.unwrap_or(defaults.backoff.jitter),
            },
        }
    }
}

fn default_max_concurrent() -> usize {
    4
}

fn default_quality_rating() -> f64 {
    5.0
}

fn default_speed_rating() -> f64 {
    5.0
}

fn default_reliability() -> f64 {
    0.9
}

/// One provider entry of the configuration document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderEntry {
    pub id: String,
    pub kind: ProviderKind,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// Environment variable holding the API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub capabilities: BTreeSet<TaskType>,
    #[serde(default)]
    pub cost_weight: f64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// 0 means unlimited
    #[serde(default)]
    pub rate_limit_per_minute: u32,
    #[serde(default = "default_quality_rating")]
    pub quality_rating: f64,
    #[serde(default = "default_speed_rating")]
    pub speed_rating: f64,
    #[serde(default = "default_reliability")]
    pub reliability: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breaker: Option<BreakerSettings>,
}

impl ProviderEntry {
    pub fn api_key_env(&self) -> &str {
        self.api_key_env
            .as_deref()
            .unwrap_or_else(|| self.kind.default_api_key_env())
    }

    /// Read the API key from the environment
    pub fn api_key(&self) -> std::result::Result<String, ProviderError> {
        let var = self.api_key_env();
        std::env::var(var).map_err(|_| {
            ProviderError::Configuration(format!(
                "{var} environment variable not set for provider '{}'",
                self.id
            ))
        })
    }

    pub fn to_provider(&self) -> Result<Provider> {
        let mut builder = Provider::builder(self.id.as_str())
            .capabilities(self.capabilities.iter().copied())
            .cost_weight(self.cost_weight)
            .max_concurrent(self.max_concurrent)
            .rate_limit_per_minute(self.rate_limit_per_minute)
            .quality_rating(self.quality_rating)
            .speed_rating(self.speed_rating)
            .reliability(self.reliability);
        if let Some(name) = &self.display_name {
            builder = builder.display_name(name.clone());
        }
        Ok(builder.build()?)
    }
}

/// Full orchestrator configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorConfig {
    pub providers: Vec<ProviderEntry>,
    /// Empty means chains are derived from capabilities
    #[serde(default)]
    pub routing: RoutingPolicy,
    #[serde(default)]
    pub breaker: BreakerSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt_timeout_ms: Option<u64>,
}

impl OrchestratorConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = research_utils::read_json_file(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self = research_utils::read_json_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the document for mistakes that would only surface at call time
    pub fn validate(&self) -> Result<()> {
        if self.providers.is_empty() {
            return Err(RouterError::Config("at least one provider is required".into()));
        }
        if self.attempt_timeout_ms == Some(0) {
            return Err(RouterError::Config("attemptTimeoutMs must be greater than 0".into()));
        }
        let global = self.breaker_config();
        check_breaker(&global).map_err(RouterError::Config)?;
        for entry in &self.providers {
            entry.to_provider()?;
            if entry.model.trim().is_empty() {
                return Err(RouterError::Config(format!(
                    "provider '{}' has no model",
                    entry.id
                )));
            }
            if let Some(overrides) = &entry.breaker {
                check_breaker(&overrides.resolve(&global)).map_err(|e| {
                    RouterError::Config(format!("provider '{}' {e}", entry.id))
                })?;
            }
        }
        Ok(())
    }

    pub fn breaker_config(&self) -> BreakerConfig {
        self.breaker.resolve(&BreakerConfig::default())
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout_ms.map(Duration::from_millis)
    }

    /// Build a router builder, asking `factory` for each provider's client
    ///
    /// Duplicate ids and unknown chain members are reported by
    /// [`FallbackRouterBuilder::build`].
    pub fn into_builder<F>(self, mut factory: F) -> Result<FallbackRouterBuilder>
    where
        F: FnMut(&ProviderEntry) -> std::result::Result<Arc<dyn ProviderClient>, ProviderError>,
    {
        let global = self.breaker_config();
        let mut builder = FallbackRouterBuilder::new()
            .routing_policy(self.routing.clone())
            .breaker_config(global)
            .retry_policy(self.retry.resolve());
        if let Some(timeout) = self.attempt_timeout() {
            builder = builder.attempt_timeout(timeout);
        }

        for entry in &self.providers {
            let client = factory(entry).map_err(|e| {
                RouterError::Config(format!("provider '{}': {e}", entry.id))
            })?;
            if let Some(overrides) = &entry.breaker {
                builder = builder.breaker_override(entry.id.as_str(), overrides.resolve(&global));
            }
            builder = builder.provider(entry.to_provider()?, client);
        }
        Ok(builder)
    }
}

/// A reopened breaker must wait strictly longer, up to the cap
fn check_breaker(config: &BreakerConfig) -> std::result::Result<(), String> {
    if config.failure_threshold == 0 {
        return Err("failureThreshold must be greater than 0".into());
    }
    if config.cooldown.base.is_zero() {
        return Err("cooldownBaseMs must be greater than 0".into());
    }
    if config.cooldown.multiplier.is_nan() || config.cooldown.multiplier <= 1.0 {
        return Err("cooldownMultiplier must be greater than 1".into());
    }
    if config.cooldown.max < config.cooldown.base {
        return Err("cooldownMaxMs must not be below cooldownBaseMs".into());
    }
    Ok(())
}
