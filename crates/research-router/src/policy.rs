//! Fallback chains per task type

use research_core::{ProviderId, TaskType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::{ProviderRegistry, Result, RouterError};

/// Ordered, de-duplicated provider chain for each task type
///
/// Chain order is the only priority signal used at call time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "ChainTable", into = "ChainTable")]
pub struct RoutingPolicy {
    chains: ChainTable,
}

type ChainTable = BTreeMap<TaskType, Vec<ProviderId>>;

impl From<ChainTable> for RoutingPolicy {
    fn from(table: ChainTable) -> Self {
        let mut policy = Self::new();
        for (task_type, chain) in table {
            policy.set_chain(task_type, chain);
        }
        policy
    }
}

impl From<RoutingPolicy> for ChainTable {
    fn from(policy: RoutingPolicy) -> Self {
        policy.chains
    }
}

impl RoutingPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the chain for `task_type`; repeated ids keep their first position
    pub fn with_chain<I, P>(mut self, task_type: TaskType, providers: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ProviderId>,
    {
        self.set_chain(task_type, providers);
        self
    }

    pub fn set_chain<I, P>(&mut self, task_type: TaskType, providers: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<ProviderId>,
    {
        let mut seen = HashSet::new();
        let chain = providers
            .into_iter()
            .map(Into::into)
            .filter(|id: &ProviderId| seen.insert(id.clone()))
            .collect();
        self.chains.insert(task_type, chain);
    }

    pub fn chain_for(&self, task_type: TaskType) -> Option<&[ProviderId]> {
        self.chains.get(&task_type).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TaskType, &[ProviderId])> {
        self.chains
            .iter()
            .map(|(task_type, chain)| (*task_type, chain.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Check that every chained provider is registered
    pub fn validate(&self, registry: &ProviderRegistry) -> Result<()> {
        for id in self.chains.values().flatten() {
            if !registry.contains(id) {
                return Err(RouterError::UnknownProvider(id.clone()));
            }
        }
        Ok(())
    }

    /// Derive chains from capability tags, highest [`research_core::Provider::ranking_score`] first
    ///
    /// Ties keep registration order. Task types no provider supports get no chain.
    pub fn from_capabilities(registry: &ProviderRegistry) -> Self {
        let mut policy = Self::new();
        for task_type in TaskType::ALL {
            let mut providers = registry.list_by_capability(task_type);
            if providers.is_empty() {
                continue;
            }
            providers.sort_by(|a, b| b.ranking_score().total_cmp(&a.ranking_score()));
            policy.set_chain(task_type, providers.into_iter().map(|p| p.id.clone()));
        }
        policy
    }
}
