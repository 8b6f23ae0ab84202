//! Plain HTTP GET runner

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, USER_AGENT};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::{FetchError, JobRunner, Result};

/// Desktop browser user agent; several news and filing sites reject library defaults
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Fetches a URL target and returns the response body as text
#[derive(Debug, Clone)]
pub struct HttpRunner {
    client: Client,
    user_agent: String,
}

impl HttpRunner {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            user_agent: BROWSER_USER_AGENT.to_string(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Accept only absolute http(s) URLs
    pub fn parse_target(target: &str) -> Result<Url> {
        let url = Url::parse(target.trim()).map_err(|e| FetchError::InvalidTarget {
            target: target.to_string(),
            reason: e.to_string(),
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(FetchError::InvalidTarget {
                target: target.to_string(),
                reason: format!("unsupported scheme '{scheme}'"),
            }),
        }
    }
}

impl Default for HttpRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobRunner for HttpRunner {
    async fn run(&self, target: &str, timeout: Duration) -> Result<String> {
        let url = Self::parse_target(target)?;
        debug!(url = %url, ?timeout, "Fetching");

        let response = self
            .client
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "text/html,application/json;q=0.9,*/*;q=0.8")
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout(timeout)
                } else {
                    FetchError::Failed(format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Failed(format!("HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::Failed(format!("failed to read body: {e}")))
    }
}
