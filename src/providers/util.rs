use anyhow::{Error, anyhow};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// How many times a request is attempted and how long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles after each further failure
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay to wait after the zero-based attempt `attempt` has failed.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(600),
        }
    }
}

/// Retries an async operation with exponential backoff
///
/// # Parameters
/// - `operation`: Closure returning a future
/// - `policy`: Attempt count and base delay
///
/// # Returns
/// Either the successful result or the error of the last attempt
pub async fn with_backoff<F, Fut, T>(mut operation: F, policy: &RetryPolicy) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(err) => {
                if attempt + 1 >= attempts {
                    return Err(err);
                }
                let delay = policy.delay_after(attempt);
                debug!(
                    "Attempt {}/{} failed: {}. Retrying in {:?}...",
                    attempt + 1,
                    attempts,
                    err,
                    delay
                );
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// GETs `url` with query `params` and decodes the body as JSON, retrying on transport errors,
/// non-success status codes and undecodable bodies.
pub async fn fetch_json(
    client: &reqwest::Client,
    url: &str,
    params: &[(&str, String)],
    policy: &RetryPolicy,
) -> Result<Value, Error> {
    with_backoff(
        || async move {
            debug!("Requesting {}", url);
            let response = client
                .get(url)
                .query(params)
                .send()
                .await
                .map_err(|e| anyhow!("Request error: {} URL: {}", e, url))?;

            let status = response.status();
            if !status.is_success() {
                return Err(anyhow!("HTTP error: {} URL: {}", status, url));
            }

            response
                .json::<Value>()
                .await
                .map_err(|e| anyhow!("Failed to parse JSON response from {}: {}", url, e))
        },
        policy,
    )
    .await
}

/// Reads a JSON number, also accepting numbers encoded as strings.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Builds the shared HTTP client with a per-request timeout.
pub fn http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!("topalloc/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()?)
}
