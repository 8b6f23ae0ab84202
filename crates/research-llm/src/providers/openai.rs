//! OpenAI-compatible chat completions client
//!
//! Works with any endpoint that speaks the `/chat/completions` protocol,
//! including OpenAI itself and Groq's hosted models.
//! See: https://platform.openai.com/docs/api-reference/chat
//!
//! # Examples
//!
//! ```no_run
//! use research_core::Payload;
//! use research_llm::ProviderClient;
//! use research_llm::providers::OpenAIClient;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads GROQ_API_KEY
//!     let client = OpenAIClient::groq_from_env("llama-3.3-70b-versatile")?;
//!
//!     let payload = Payload::new("Summarize NVDA's latest quarter").with_max_tokens(300);
//!     let completion = client.invoke(&payload, Duration::from_secs(30)).await?;
//!     println!("{}", completion.content);
//!
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use reqwest::Client;
use research_core::Payload;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

use super::{check_status, send_error};
use crate::{Completion, ProviderClient, ProviderError, Result, TokenUsage};

const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Configuration for an OpenAI-compatible client
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// API key for authentication
    pub api_key: String,

    /// Base URL of the API (default: "https://api.openai.com/v1")
    pub api_base: String,

    /// Model identifier sent with every request
    pub model: String,

    /// Name reported by [`ProviderClient::name`]
    pub name: String,
}

impl OpenAIConfig {
    /// Config for api.openai.com
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: DEFAULT_OPENAI_API_BASE.to_string(),
            model: model.into(),
            name: "openai".to_string(),
        }
    }

    /// Config for Groq's OpenAI-compatible endpoint
    pub fn groq(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(api_key, model)
            .with_api_base(GROQ_API_BASE)
            .with_name("groq")
    }

    /// Read the API key from the named environment variable
    pub fn from_env(var: &str, model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var(var).map_err(|_| {
            ProviderError::Configuration(format!("{var} environment variable not set"))
        })?;
        Ok(Self::new(api_key, model))
    }

    /// Set custom API base URL
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the name reported in logs and metrics
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Client for OpenAI-compatible chat completion APIs
pub struct OpenAIClient {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIClient {
    pub fn with_config(config: OpenAIConfig) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self { client, config })
    }

    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Self::with_config(OpenAIConfig::new(api_key, model))
    }

    /// OpenAI client reading `OPENAI_API_KEY`
    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        Self::with_config(OpenAIConfig::from_env("OPENAI_API_KEY", model)?)
    }

    /// Groq client reading `GROQ_API_KEY`
    pub fn groq_from_env(model: impl Into<String>) -> Result<Self> {
        let config = OpenAIConfig::from_env("GROQ_API_KEY", model)?
            .with_api_base(GROQ_API_BASE)
            .with_name("groq");
        Self::with_config(config)
    }

    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    fn build_request(&self, payload: &Payload) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &payload.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: payload.prompt.clone(),
        });

        ChatRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: payload.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: payload.temperature,
        }
    }
}

#[async_trait]
impl ProviderClient for OpenAIClient {
    #[instrument(skip(self, payload), fields(provider = %self.config.name, model = %self.config.model))]
    async fn invoke(&self, payload: &Payload, timeout: Duration) -> Result<Completion> {
        debug!("Sending request to {}", self.config.api_base);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.api_base))
            .bearer_auth(&self.config.api_key)
            .timeout(timeout)
            .json(&self.build_request(payload))
            .send()
            .await
            .map_err(|e| send_error(e, timeout))?;

        let response = check_status(response).await?;
        let body = response.text().await.map_err(|e| send_error(e, timeout))?;
        parse_response(&body)
    }

    fn name(&self) -> &str {
        &self.config.name
    }
}

fn parse_response(body: &str) -> Result<Completion> {
    let response: ChatResponse = serde_json::from_str(body)?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".to_string()))?;

    let mut completion = Completion::new(choice.message.content.unwrap_or_default());
    if let Some(usage) = response.usage {
        debug!(
            "Received response - tokens: {}/{}",
            usage.prompt_tokens, usage.completion_tokens
        );
        completion = completion.with_usage(TokenUsage::new(
            usage.prompt_tokens,
            usage.completion_tokens,
        ));
    }
    Ok(completion)
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_client_creation() {
        let client = OpenAIClient::new("test-key", "gpt-4o-mini").unwrap();
        assert_eq!(client.name(), "openai");
        assert_eq!(client.config().api_base, "https://api.openai.com/v1");
        assert_eq!(client.config().model, "gpt-4o-mini");
    }

    #[test]
    fn test_groq_config() {
        let config = OpenAIConfig::groq("gsk-test", "llama-3.3-70b-versatile");
        assert_eq!(config.api_base, "https://api.groq.com/openai/v1");
        assert_eq!(config.name, "groq");
    }

    #[test]
    fn test_api_base_trailing_slash() {
        let config = OpenAIConfig::new("k", "m").with_api_base("http://localhost:8000/v1/");
        assert_eq!(config.api_base, "http://localhost:8000/v1");
    }

    #[test]
    fn test_missing_env_var() {
        let err = OpenAIConfig::from_env("RESEARCH_RS_TEST_UNSET_KEY", "m").unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[test]
    fn test_request_format() {
        let client = OpenAIClient::new("k", "gpt-4o").unwrap();
        let payload = Payload::new("Value MSFT")
            .with_system("You are a sell-side analyst")
            .with_temperature(0.2);

        let request = serde_json::to_value(client.build_request(&payload)).unwrap();
        assert_eq!(
            request,
            json!({
                "model": "gpt-4o",
                "messages": [
                    {"role": "system", "content": "You are a sell-side analyst"},
                    {"role": "user", "content": "Value MSFT"}
                ],
                "max_tokens": 1024,
                "temperature": 0.2f32
            })
        );
    }

    #[test]
    fn test_parse_response() {
        let body = json!({
            "choices": [{"message": {"role": "assistant", "content": "Buy"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 20, "completion_tokens": 1, "total_tokens": 21}
        })
        .to_string();

        let completion = parse_response(&body).unwrap();
        assert_eq!(completion.content, "Buy");
        assert_eq!(completion.usage, Some(TokenUsage::new(20, 1)));
    }

    #[test]
    fn test_parse_response_without_choices() {
        let err = parse_response(r#"{"choices": []}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidResponse);
    }

    #[test]
    fn test_parse_null_content() {
        let completion =
            parse_response(r#"{"choices": [{"message": {"content": null}}]}"#).unwrap();
        assert!(completion.is_empty());
    }
}
