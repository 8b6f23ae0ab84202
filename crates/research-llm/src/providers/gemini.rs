//! Google Gemini `generateContent` client
//!
//! See: https://ai.google.dev/api/generate-content

use async_trait::async_trait;
use reqwest::Client;
use research_core::Payload;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

use super::{check_status, send_error};
use crate::{Completion, ProviderClient, ProviderError, Result, TokenUsage};

const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
        }
    }

    /// Read the API key from `GEMINI_API_KEY`
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY").map_err(|_| {
            ProviderError::Configuration("GEMINI_API_KEY environment variable not set".to_string())
        })?;
        Ok(Self::new(api_key))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }
}

/// Gemini client
pub struct GeminiClient {
    client: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn with_config(config: GeminiConfig) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::with_config(GeminiConfig::from_env()?)
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.api_base, self.config.model
        )
    }
}

fn build_request(payload: &Payload) -> GenerateRequest {
    GenerateRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![Part {
                text: payload.prompt.clone(),
            }],
        }],
        system_instruction: payload.system.as_ref().map(|system| Content {
            role: None,
            parts: vec![Part {
                text: system.clone(),
            }],
        }),
        generation_config: GenerationConfig {
            max_output_tokens: payload.max_tokens,
            temperature: payload.temperature,
        },
    }
}

#[async_trait]
impl ProviderClient for GeminiClient {
    #[instrument(skip(self, payload), fields(provider = "gemini", model = %self.config.model))]
    async fn invoke(&self, payload: &Payload, timeout: Duration) -> Result<Completion> {
        debug!("Sending request to {}", self.endpoint());

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .timeout(timeout)
            .json(&build_request(payload))
            .send()
            .await
            .map_err(|e| send_error(e, timeout))?;

        let response = check_status(response).await?;
        let body = response.text().await.map_err(|e| send_error(e, timeout))?;
        parse_response(&body)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

fn parse_response(body: &str) -> Result<Completion> {
    let response: GenerateResponse = serde_json::from_str(body)?;

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::InvalidResponse("No candidates in response".to_string()))?;

    let text = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default();

    let mut completion = Completion::new(text);
    if let Some(usage) = response.usage_metadata {
        completion = completion.with_usage(TokenUsage::new(
            usage.prompt_token_count,
            usage.candidates_token_count,
        ));
    }
    Ok(completion)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: usize,
    #[serde(default)]
    candidates_token_count: usize,
}
