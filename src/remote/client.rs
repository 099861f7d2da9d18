//! HTTP client for the remote correction model.
//!
//! One JSON-over-HTTPS endpoint, wrapped with typed errors so the retry
//! loop can tell a rate limit (wait and retry) from a terminal failure
//! (give up and degrade).

use std::{future::Future, time::Duration};

use log::{debug, warn};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;

use crate::config::RemoteConfig;

/// Errors from a single invocation of the remote model.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The service asked us to slow down. Retryable.
    #[error("remote service rate limited the request")]
    RateLimited {
        /// Server-suggested delay before the next attempt, if it sent one.
        retry_after: Option<Duration>,
    },
    /// Connection, DNS, or timeout failure. Not retried past the loop.
    #[error("could not reach remote service: {0}")]
    Network(#[from] reqwest::Error),
    /// The service answered with a non-success status.
    #[error("remote service returned status {status}")]
    Status {
        /// The HTTP status code.
        status: StatusCode,
    },
    /// The response body did not have the expected shape.
    #[error("could not parse remote response: {0}")]
    Malformed(String),
}

/// Retry parameters for rate-limited calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the given zero-based failed attempt.
    ///
    /// A server-suggested delay wins; otherwise exponential backoff from the
    /// initial delay. Either way the result is capped at `max_delay`.
    pub fn backoff_delay(&self, attempt: u32, server_suggested: Option<Duration>) -> Duration {
        let delay = server_suggested.unwrap_or_else(|| {
            let factor = 2u32.saturating_pow(attempt);
            self.initial_delay.saturating_mul(factor)
        });
        delay.min(self.max_delay)
    }
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
    #[serde(rename = "safetySettings")]
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

/// Thin client over the generation endpoint.
pub struct RemoteClient {
    http: reqwest::Client,
    config: RemoteConfig,
    retry: RetryPolicy,
}

impl RemoteClient {
    /// Build a client with mandatory connect and read timeouts.
    pub fn new(config: RemoteConfig, retry: RetryPolicy) -> crate::Result<RemoteClient> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;
        Ok(RemoteClient {
            http,
            config,
            retry,
        })
    }

    fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
        response
            .headers()
            .get(reqwest::header::RETRY_AFTER)?
            .to_str()
            .ok()?
            .parse::<u64>()
            .ok()
            .map(Duration::from_secs)
    }

    /// One POST to the generation endpoint, returning the model's text.
    async fn invoke_once(&self, prompt: &str) -> Result<String, RemoteError> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.1,
                max_output_tokens: 2048,
            },
            safety_settings: vec![SafetySetting {
                category: "HARM_CATEGORY_DANGEROUS_CONTENT",
                threshold: "BLOCK_ONLY_HIGH",
            }],
        };
        let url = format!("{}?key={}", self.config.endpoint, self.config.api_key);
        let response = self.http.post(&url).json(&request).send().await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = Self::parse_retry_after(&response);
            return Err(RemoteError::RateLimited { retry_after });
        }
        if !status.is_success() {
            return Err(RemoteError::Status { status });
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Malformed(e.to_string()))?;
        let text = body
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .ok_or_else(|| RemoteError::Malformed("no candidates in response".to_owned()))?;
        if text.trim().is_empty() {
            return Err(RemoteError::Malformed("empty candidate text".to_owned()));
        }
        Ok(text)
    }

    /// Invoke the model, retrying rate limits with backoff. Other errors are
    /// returned to the caller immediately, which degrades to the uncorrected
    /// text.
    pub async fn invoke_with_retry(&self, prompt: &str) -> Result<String, RemoteError> {
        retry_rate_limits(&self.retry, || self.invoke_once(prompt)).await
    }
}

/// Run `f`, retrying rate limits with backoff up to the policy's attempt
/// cap. Any other error is returned immediately.
async fn retry_rate_limits<F, Fut>(retry: &RetryPolicy, mut f: F) -> Result<String, RemoteError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String, RemoteError>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(text) => return Ok(text),
            Err(RemoteError::RateLimited { retry_after })
                if attempt + 1 < retry.max_attempts =>
            {
                let delay = retry.backoff_delay(attempt, retry_after);
                warn!(
                    "remote model rate limited, retrying in {:?} (attempt {}/{})",
                    delay,
                    attempt + 1,
                    retry.max_attempts
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                debug!("remote invocation failed: {}", e);
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn persistent_rate_limiting_stops_at_the_attempt_cap() {
        let calls = Cell::new(0u32);
        let result = retry_rate_limits(&fast_policy(), || {
            calls.set(calls.get() + 1);
            async { Err::<String, _>(RemoteError::RateLimited { retry_after: None }) }
        })
        .await;
        assert_eq!(calls.get(), 3);
        assert!(matches!(result, Err(RemoteError::RateLimited { .. })));
    }

    #[tokio::test]
    async fn a_rate_limit_followed_by_success_recovers() {
        let calls = Cell::new(0u32);
        let result = retry_rate_limits(&fast_policy(), || {
            let n = calls.get() + 1;
            calls.set(n);
            async move {
                if n < 2 {
                    Err(RemoteError::RateLimited { retry_after: None })
                } else {
                    Ok("corrected".to_owned())
                }
            }
        })
        .await;
        assert_eq!(calls.get(), 2);
        assert_eq!(result.unwrap(), "corrected");
    }

    #[tokio::test]
    async fn terminal_errors_are_not_retried() {
        let calls = Cell::new(0u32);
        let result = retry_rate_limits(&fast_policy(), || {
            calls.set(calls.get() + 1);
            async { Err::<String, _>(RemoteError::Malformed("bad body".to_owned())) }
        })
        .await;
        assert_eq!(calls.get(), 1);
        assert!(matches!(result, Err(RemoteError::Malformed(_))));
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(0, None), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(1, None), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(2, None), Duration::from_secs(4));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(10, None), Duration::from_secs(60));
    }

    #[test]
    fn server_suggested_delay_wins() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.backoff_delay(0, Some(Duration::from_secs(5))),
            Duration::from_secs(5)
        );
        // Even a server suggestion stays within the cap.
        assert_eq!(
            policy.backoff_delay(0, Some(Duration::from_secs(600))),
            Duration::from_secs(60)
        );
    }
}
