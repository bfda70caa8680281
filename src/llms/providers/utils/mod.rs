//! Helpers shared by the provider clients.
//!
//! Every provider posts a JSON body and reads a JSON answer, retrying rate
//! limits and server errors with exponential backoff.

use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode};
use serde_json::Value;

use crate::llms::base_llm::LlmError;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Non-standard status Anthropic uses for "overloaded".
const STATUS_OVERLOADED: u16 = 529;

/// How a response status is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAction {
    Accept,
    Retry,
    Fail,
}

/// Decide what to do with a response status.
pub fn classify_status(status: StatusCode) -> StatusAction {
    if status.is_success() {
        StatusAction::Accept
    } else if status == StatusCode::TOO_MANY_REQUESTS
        || status.as_u16() == STATUS_OVERLOADED
        || status.is_server_error()
    {
        StatusAction::Retry
    } else {
        StatusAction::Fail
    }
}

/// Retry schedule for provider calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.initial_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Build an HTTP client with the given timeout.
pub fn http_client(provider: &str, timeout: Duration) -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|source| LlmError::Http {
            provider: provider.to_string(),
            source,
        })
}

/// Send a JSON request, retrying transport errors, 429, 529 and 5xx.
///
/// `build` is called once per attempt because a `RequestBuilder` is consumed
/// by `send`. A `Retry-After` header in seconds overrides the next delay.
pub async fn send_json_with_retry<F>(
    provider: &str,
    policy: RetryPolicy,
    build: F,
) -> Result<Value, LlmError>
where
    F: Fn() -> RequestBuilder,
{
    let mut last_error = String::from("no attempt made");
    let mut retry_after: Option<Duration> = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let delay = retry_after.take().unwrap_or_else(|| policy.delay_for(attempt));
            log::warn!(
                "{} API retry attempt {} after {:?}: {}",
                provider,
                attempt,
                delay,
                last_error
            );
            tokio::time::sleep(delay).await;
        }

        let response = match build().send().await {
            Ok(resp) => resp,
            Err(e) => {
                last_error = e.to_string();
                continue;
            }
        };

        let status = response.status();
        match classify_status(status) {
            StatusAction::Retry => {
                retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);
                last_error = format!("status {}", status);
                continue;
            }
            StatusAction::Fail => {
                let body = response.text().await.unwrap_or_default();
                return Err(LlmError::Api {
                    provider: provider.to_string(),
                    status: status.as_u16(),
                    body: truncate(&body, 500),
                });
            }
            StatusAction::Accept => {}
        }

        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                last_error = e.to_string();
                continue;
            }
        };
        return serde_json::from_str(&text).map_err(|e| {
            LlmError::decode(provider, format!("{} - Body: {}", e, truncate(&text, 500)))
        });
    }

    Err(LlmError::RetriesExhausted {
        provider: provider.to_string(),
        attempts: policy.max_retries + 1,
        last_error,
    })
}

/// Cut a string to at most `max` bytes on a char boundary.
pub fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

/// Credential from an explicit value or an environment variable.
pub fn resolve_api_key(explicit: Option<String>, env_var: &str) -> Option<String> {
    explicit
        .filter(|k| !k.trim().is_empty())
        .or_else(|| std::env::var(env_var).ok())
        .filter(|k| !k.trim().is_empty())
}
