//! Concrete provider client implementations
//!
//! Each adapter turns a [`research_core::Payload`] into its backend's wire
//! format and maps HTTP failures onto [`crate::ProviderError`].

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Response, StatusCode};
use std::time::Duration;

use crate::ProviderError;

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "gemini")]
pub mod gemini;

#[cfg(feature = "openai")]
pub use openai::{OpenAIClient, OpenAIConfig};

#[cfg(feature = "gemini")]
pub use gemini::{GeminiClient, GeminiConfig};

/// Map a non-success HTTP status onto the provider error taxonomy
pub(crate) fn classify_status(status: StatusCode, headers: &HeaderMap, body: String) -> ProviderError {
    match status.as_u16() {
        401 | 403 => ProviderError::Auth(format!("HTTP {status}: {body}")),
        429 => ProviderError::RateLimited {
            message: body,
            retry_after: parse_retry_after(headers),
        },
        408 | 500..=599 => ProviderError::Transient(format!("HTTP {status}: {body}")),
        _ => ProviderError::InvalidResponse(format!("HTTP {status}: {body}")),
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Map a failed send into the taxonomy, keeping the timeout we applied
pub(crate) fn send_error(err: reqwest::Error, timeout: Duration) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(timeout)
    } else {
        err.into()
    }
}

/// Return the response if successful, otherwise a classified error
pub(crate) async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let headers = response.headers().clone();
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, &headers, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_classify_status() {
        let headers = HeaderMap::new();
        let kind = |code: u16| {
            classify_status(StatusCode::from_u16(code).unwrap(), &headers, String::new()).kind()
        };

        assert_eq!(kind(401), ErrorKind::Auth);
        assert_eq!(kind(403), ErrorKind::Auth);
        assert_eq!(kind(429), ErrorKind::RateLimit);
        assert_eq!(kind(408), ErrorKind::Transient);
        assert_eq!(kind(502), ErrorKind::Transient);
        assert_eq!(kind(503), ErrorKind::Transient);
        assert_eq!(kind(400), ErrorKind::InvalidResponse);
        assert_eq!(kind(404), ErrorKind::InvalidResponse);
    }

    #[test]
    fn test_retry_after_header() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));

        let err = classify_status(StatusCode::TOO_MANY_REQUESTS, &headers, "busy".into());
        assert_eq!(
            err,
            ProviderError::RateLimited {
                message: "busy".to_string(),
                retry_after: Some(Duration::from_secs(12)),
            }
        );
    }

    #[test]
    fn test_retry_after_http_date_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }
}
