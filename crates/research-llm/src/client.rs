//! Provider client trait definition

use async_trait::async_trait;
use research_core::Payload;
use std::time::Duration;

use crate::{Completion, Result};

/// Uniform call into one model backend
///
/// Implementations format the payload for their backend, enforce `timeout`
/// on the network call, and classify failures into [`crate::ProviderError`].
/// The router depends only on this trait.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Send the payload and wait at most `timeout` for the answer
    async fn invoke(&self, payload: &Payload, timeout: Duration) -> Result<Completion>;

    /// Backend name (e.g., "openai", "groq", "gemini")
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProviderError;
    use std::sync::Arc;

    struct EchoClient;

    #[async_trait]
    impl ProviderClient for EchoClient {
        async fn invoke(&self, payload: &Payload, timeout: Duration) -> Result<Completion> {
            if timeout.is_zero() {
                return Err(ProviderError::Timeout(timeout));
            }
            Ok(Completion::new(payload.prompt.to_uppercase()))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    #[test]
    fn test_trait_object_invoke() {
        let client: Arc<dyn ProviderClient> = Arc::new(EchoClient);
        let payload = Payload::new("summarize q3");

        let completion =
            tokio_test::block_on(client.invoke(&payload, Duration::from_secs(1))).unwrap();
        assert_eq!(completion.content, "SUMMARIZE Q3");
        assert_eq!(client.name(), "echo");

        let err = tokio_test::block_on(client.invoke(&payload, Duration::ZERO)).unwrap_err();
        assert!(err.is_retryable());
    }
}
