use std::future::Future;
use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::errors::CoreError;

/// Build the HTTP client shared by every outbound adapter.
/// Every request through it is bounded by `timeout`.
pub fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("portfolio-sync-core/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Map a non-success HTTP status to the error taxonomy.
///
/// 401/403 mean the upstream rejected our credentials; everything else is an
/// upstream API failure (transient from the caller's point of view).
pub async fn check_status(provider: &str, resp: Response) -> Result<Response, CoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let message = upstream_message(&body).unwrap_or_else(|| format!("HTTP {status}"));

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(CoreError::Auth {
            provider: provider.to_string(),
            message,
        });
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(CoreError::Api {
            provider: provider.to_string(),
            message: format!("rate limit exceeded: {message}"),
        });
    }
    Err(CoreError::Api {
        provider: provider.to_string(),
        message: format!("HTTP {status}: {message}"),
    })
}

/// Pull a human-readable message out of an upstream error body
/// (`{"msg": ..}` on exchanges, `{"error": ..}` elsewhere).
fn upstream_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["msg", "message", "error"]
        .iter()
        .find_map(|k| value.get(*k))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
}

// ── JSON-RPC ────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Issue one JSON-RPC 2.0 call and decode its `result`.
pub async fn json_rpc<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    provider: &str,
    method: &str,
    params: Value,
) -> Result<T, CoreError> {
    let body = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    });

    let resp = client.post(url).json(&body).send().await?;
    let resp = check_status(provider, resp).await?;
    let parsed: RpcResponse<T> = resp.json().await.map_err(|e| CoreError::Api {
        provider: provider.to_string(),
        message: format!("Failed to parse {method} response: {e}"),
    })?;

    if let Some(err) = parsed.error {
        return Err(CoreError::Api {
            provider: provider.to_string(),
            message: format!("{method} failed ({}): {}", err.code, err.message),
        });
    }
    parsed.result.ok_or_else(|| CoreError::Api {
        provider: provider.to_string(),
        message: format!("{method} returned no result"),
    })
}

// ── Retry ───────────────────────────────────────────────────────────

/// Exponential backoff for rate-limited or flaky upstreams.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Delay before retry number `retry` (1-based): base × 2^(retry-1), capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

pub fn is_rate_limit_error(error: &CoreError) -> bool {
    let msg = error.to_string().to_lowercase();
    msg.contains("rate limit") || msg.contains("too many requests") || msg.contains("429")
}

/// Run `op` until it succeeds, fails permanently, or the policy is exhausted.
/// Only transient errors are retried.
pub async fn with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, CoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation, attempts = attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt < policy.attempts && (e.is_transient() || is_rate_limit_error(&e)) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Upstream call failed, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Parse a decimal string the way exchanges and explorers send amounts.
/// Unparseable input counts as zero.
pub fn parse_amount(raw: &str) -> f64 {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0)
}
