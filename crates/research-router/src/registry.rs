//! Provider registry

use research_core::{Provider, ProviderId, TaskType};
use research_llm::ProviderClient;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::{ProviderLimits, Result, RouterError};

/// A provider with its client and local limits
pub struct RegisteredProvider {
    pub provider: Provider,
    pub client: Arc<dyn ProviderClient>,
    pub limits: ProviderLimits,
}

impl fmt::Debug for RegisteredProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredProvider")
            .field("provider", &self.provider)
            .field("client", &self.client.name())
            .field("limits", &self.limits)
            .finish()
    }
}

/// Catalogue of providers, in registration order
///
/// Populated at startup and only read afterwards.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    entries: Vec<RegisteredProvider>,
    index: HashMap<ProviderId, usize>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Provider, client: Arc<dyn ProviderClient>) -> Result<()> {
        if self.index.contains_key(&provider.id) {
            return Err(RouterError::DuplicateProvider(provider.id));
        }
        debug!(provider = %provider.id, client = client.name(), "Registered provider");

        self.index.insert(provider.id.clone(), self.entries.len());
        self.entries.push(RegisteredProvider {
            limits: ProviderLimits::new(&provider),
            provider,
            client,
        });
        Ok(())
    }

    pub fn get(&self, id: &ProviderId) -> Result<&RegisteredProvider> {
        self.index
            .get(id)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| RouterError::UnknownProvider(id.clone()))
    }

    pub fn contains(&self, id: &ProviderId) -> bool {
        self.index.contains_key(id)
    }

    /// Providers carrying `task_type`, in registration order (possibly empty)
    pub fn list_by_capability(&self, task_type: TaskType) -> Vec<&Provider> {
        self.providers().filter(|p| p.supports(task_type)).collect()
    }

    pub fn providers(&self) -> impl Iterator<Item = &Provider> {
        self.entries.iter().map(|entry| &entry.provider)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use research_core::Payload;
    use research_llm::Completion;
    use std::time::Duration;

    pub(crate) struct StaticClient;

    #[async_trait]
    impl ProviderClient for StaticClient {
        async fn invoke(
            &self,
            _payload: &Payload,
            _timeout: Duration,
        ) -> research_llm::Result<Completion> {
            Ok(Completion::new("ok"))
        }

        fn name(&self) -> &str {
            "static"
        }
    }

    fn provider(id: &str, capabilities: &[TaskType]) -> Provider {
        Provider::builder(id)
            .capabilities(capabilities.iter().copied())
            .build()
            .unwrap()
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = ProviderRegistry::new();
        registry
            .register(provider("groq", &[TaskType::Research]), Arc::new(StaticClient))
            .unwrap();

        let entry = registry.get(&"groq".into()).unwrap();
        assert_eq!(entry.provider.id.as_str(), "groq");
        assert_eq!(entry.client.name(), "static");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_provider() {
        let mut registry = ProviderRegistry::new();
        registry
            .register(provider("groq", &[]), Arc::new(StaticClient))
            .unwrap();

        let err = registry
            .register(provider("groq", &[TaskType::Thesis]), Arc::new(StaticClient))
            .unwrap_err();
        assert!(matches!(err, RouterError::DuplicateProvider(id) if id.as_str() == "groq"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_provider() {
        let registry = ProviderRegistry::new();
        assert!(matches!(
            registry.get(&"ghost".into()),
            Err(RouterError::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_list_by_capability_keeps_registration_order() {
        let mut registry = ProviderRegistry::new();
        for (id, caps) in [
            ("gemini", vec![TaskType::Research, TaskType::Thesis]),
            ("groq-8b", vec![TaskType::Sentiment]),
            ("groq-70b", vec![TaskType::Research]),
        ] {
            registry
                .register(provider(id, &caps), Arc::new(StaticClient))
                .unwrap();
        }

        let ids: Vec<_> = registry
            .list_by_capability(TaskType::Research)
            .into_iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(ids, ["gemini", "groq-70b"]);
        assert!(registry.list_by_capability(TaskType::Revision).is_empty());
    }
}
