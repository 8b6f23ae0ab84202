//! Static description of model backends

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt;

use crate::{Error, Result, TaskType};

/// Unique identifier of a provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ProviderId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for ProviderId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A model backend and its static properties
///
/// Immutable once built. `rate_limit_per_minute == 0` means unlimited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    pub id: ProviderId,
    pub display_name: String,
    pub capabilities: BTreeSet<TaskType>,
    /// Cost per 1k tokens
    pub cost_weight: f64,
    pub max_concurrent: usize,
    pub rate_limit_per_minute: u32,
    /// Output quality on a 0-10 scale
    pub quality_rating: f64,
    /// Response speed on a 0-10 scale
    pub speed_rating: f64,
    /// Observed reliability in 0-1
    pub reliability: f64,
}

impl Provider {
    /// Start building a provider with the given id
    pub fn builder(id: impl Into<ProviderId>) -> ProviderBuilder {
        ProviderBuilder::new(id)
    }

    /// Whether the provider carries the capability tag for `task_type`
    pub fn supports(&self, task_type: TaskType) -> bool {
        self.capabilities.contains(&task_type)
    }

    /// Sort key used when chains are derived from capabilities
    ///
    /// Weighs speed 30%, quality 40% and reliability (scaled to 0-10) 30%.
    pub fn ranking_score(&self) -> f64 {
        self.speed_rating * 0.3 + self.quality_rating * 0.4 + self.reliability * 10.0 * 0.3
    }
}

/// Builder for [`Provider`]
#[derive(Debug, Clone)]
pub struct ProviderBuilder {
    id: ProviderId,
    display_name: Option<String>,
    capabilities: BTreeSet<TaskType>,
    cost_weight: f64,
    max_concurrent: usize,
    rate_limit_per_minute: u32,
    quality_rating: f64,
    speed_rating: f64,
    reliability: f64,
}

impl ProviderBuilder {
    pub fn new(id: impl Into<ProviderId>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            capabilities: BTreeSet::new(),
            cost_weight: 0.0,
            max_concurrent: 4,
            rate_limit_per_minute: 0,
            quality_rating: 5.0,
            speed_rating: 5.0,
            reliability: 0.9,
        }
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn capability(mut self, task_type: TaskType) -> Self {
        self.capabilities.insert(task_type);
        self
    }

    pub fn capabilities(mut self, task_types: impl IntoIterator<Item = TaskType>) -> Self {
        self.capabilities.extend(task_types);
        self
    }

    pub fn cost_weight(mut self, cost_weight: f64) -> Self {
        self.cost_weight = cost_weight;
        self
    }

    pub fn max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn rate_limit_per_minute(mut self, limit: u32) -> Self {
        self.rate_limit_per_minute = limit;
        self
    }

    pub fn quality_rating(mut self, rating: f64) -> Self {
        self.quality_rating = rating;
        self
    }

    pub fn speed_rating(mut self, rating: f64) -> Self {
        self.speed_rating = rating;
        self
    }

    pub fn reliability(mut self, reliability: f64) -> Self {
        self.reliability = reliability;
        self
    }

    /// Validate and build the provider
    pub fn build(self) -> Result<Provider> {
        let invalid = |reason: &str| Error::InvalidProvider {
            id: self.id.to_string(),
            reason: reason.to_string(),
        };

        if self.id.as_str().trim().is_empty() {
            return Err(invalid("id cannot be empty"));
        }
        if !self.cost_weight.is_finite() || self.cost_weight < 0.0 {
            return Err(invalid("cost weight must be a non-negative number"));
        }
        if self.max_concurrent == 0 {
            return Err(invalid("max concurrent must be greater than 0"));
        }
        if !(0.0..=10.0).contains(&self.quality_rating) {
            return Err(invalid("quality rating must be within 0-10"));
        }
        if !(0.0..=10.0).contains(&self.speed_rating) {
            return Err(invalid("speed rating must be within 0-10"));
        }
        if !(0.0..=1.0).contains(&self.reliability) {
            return Err(invalid("reliability must be within 0-1"));
        }

        Ok(Provider {
            display_name: self.display_name.unwrap_or_else(|| self.id.to_string()),
            id: self.id,
            capabilities: self.capabilities,
            cost_weight: self.cost_weight,
            max_concurrent: self.max_concurrent,
            rate_limit_per_minute: self.rate_limit_per_minute,
            quality_rating: self.quality_rating,
            speed_rating: self.speed_rating,
            reliability: self.reliability,
        })
    }
}
