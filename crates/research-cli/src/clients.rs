//! Provider client construction from config entries

use research_llm::ProviderError;
use research_llm::ProviderClient;
use research_llm::providers::{GeminiClient, GeminiConfig, OpenAIClient, OpenAIConfig};
use research_router::{ProviderEntry, ProviderKind};
use std::sync::Arc;

/// Build the client for `entry` with an explicit API key
pub fn build(entry: &ProviderEntry, api_key: String) -> Result<Arc<dyn ProviderClient>, ProviderError> {
    match entry.kind {
        ProviderKind::OpenAI | ProviderKind::Groq => {
            let mut config = if entry.kind == ProviderKind::Groq {
                OpenAIConfig::groq(api_key, &entry.model)
            } else {
                OpenAIConfig::new(api_key, &entry.model)
            }
            .with_name(entry.id.clone());
            if let Some(api_base) = &entry.api_base {
                config = config.with_api_base(api_base.clone());
            }
            Ok(Arc::new(OpenAIClient::with_config(config)?))
        }
        ProviderKind::Gemini => {
            let mut config = GeminiConfig::new(api_key).with_model(entry.model.clone());
            if let Some(api_base) = &entry.api_base {
                config = config.with_api_base(api_base.clone());
            }
            Ok(Arc::new(GeminiClient::with_config(config)?))
        }
    }
}

/// Build the client for `entry`, reading its key from the environment
pub fn from_env(entry: &ProviderEntry) -> Result<Arc<dyn ProviderClient>, ProviderError> {
    build(entry, entry.api_key()?)
}

/// Build the client without requiring a key; used for offline inspection
pub fn offline(entry: &ProviderEntry) -> Result<Arc<dyn ProviderClient>, ProviderError> {
    build(entry, entry.api_key().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use research_router::OrchestratorConfig;

    fn entries() -> Vec<ProviderEntry> {
        OrchestratorConfig::from_json(
            r#"{"providers": [
                {"id": "groq-70b", "kind": "groq", "model": "llama-3.3-70b-versatile"},
                {"id": "local", "kind": "openai", "model": "qwen", "apiBase": "http://localhost:1234/v1/"},
                {"id": "flash", "kind": "gemini", "model": "gemini-2.0-flash"}
            ]}"#,
        )
        .unwrap()
        .providers
    }

    #[test]
    fn test_build_each_kind() {
        let entries = entries();
        let names: Vec<String> = entries
            .iter()
            .map(|entry| build(entry, "test-key".into()).unwrap().name().to_string())
            .collect();

        assert_eq!(names, ["groq-70b", "local", "gemini"]);
    }

    #[test]
    fn test_offline_never_fails_on_missing_key() {
        let mut entry = entries().remove(0);
        entry.api_key_env = Some("RESEARCH_CLI_TEST_UNSET_KEY".into());

        assert!(offline(&entry).is_ok());
        assert!(matches!(from_env(&entry), Err(ProviderError::Configuration(_))));
    }
}
