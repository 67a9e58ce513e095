//! UpstreamClient (§4.9): forwards the governed call to the workspace's MCP
//! server. Retries are driven by hand rather than `reqwest-middleware`,
//! because idempotent and non-idempotent methods need different retry
//! eligibility (an MCP `tools/call` is not safe to replay after the bytes
//! left the process; a `tools/list` is).

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use tokio::sync::Semaphore;

use crate::config::Config;
use crate::errors::GatewayError;

const RETRIABLE_STATUS: &[StatusCode] = &[
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

/// How long a call blocks waiting for a free slot in the connection pool's
/// hard cap before it gives up, per §5's "blocks briefly then times out".
const POOL_ACQUIRE_TIMEOUT: Duration = Duration::from_millis(500);

pub struct UpstreamClient {
    client: reqwest::Client,
    max_retries: u32,
    blocked_headers: Vec<String>,
    forward_authorization: bool,
    /// Hard cap on concurrent in-flight upstream calls, separate from
    /// `pool_max_idle_per_host` (which only bounds idle keep-alive
    /// connections, not concurrency). Acquired once per `forward` call.
    connection_limit: Arc<Semaphore>,
}

impl UpstreamClient {
    pub fn new(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .pool_max_idle_per_host(config.upstream_max_keepalive_connections)
            .timeout(Duration::from_secs(config.upstream_timeout_seconds))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("failed to build upstream HTTP client");

        Self {
            client,
            max_retries: config.upstream_max_retries,
            blocked_headers: config.proxy_blocked_headers.clone(),
            forward_authorization: config.proxy_forward_authorization,
            connection_limit: Arc::new(Semaphore::new(config.upstream_max_connections.max(1))),
        }
    }

    /// Build the header set sent upstream: the inbound headers minus the
    /// operator blocklist, plus the governance identity headers, with the
    /// caller's `Authorization` forwarded only if the workspace opts in.
    pub fn build_headers(
        &self,
        inbound: &HeaderMap,
        request_id: uuid::Uuid,
        tenant_id: uuid::Uuid,
        workspace_id: uuid::Uuid,
        agent_id: uuid::Uuid,
    ) -> HeaderMap {
        let mut out = HeaderMap::new();
        for (name, value) in inbound.iter() {
            let lower = name.as_str().to_ascii_lowercase();
            if self.blocked_headers.iter().any(|b| b == &lower) {
                continue;
            }
            if lower == "authorization" && !self.forward_authorization {
                continue;
            }
            if lower == "host" || lower == "content-length" {
                continue;
            }
            out.insert(name.clone(), value.clone());
        }

        insert_str(&mut out, "x-gateway-request-id", &request_id.to_string());
        insert_str(&mut out, "x-tenant-id", &tenant_id.to_string());
        insert_str(&mut out, "x-workspace-id", &workspace_id.to_string());
        insert_str(&mut out, "x-agent-id", &agent_id.to_string());
        out
    }

    /// Forward the governed body to `url`. `idempotent` gates whether a
    /// connection-level failure (never reached the server) is retried;
    /// a non-idempotent call is retried only when the response itself says
    /// to retry (429/502/503/504), never on a send error, since we cannot
    /// know whether the upstream already executed it.
    pub async fn forward(
        &self,
        url: &str,
        headers: HeaderMap,
        body: bytes::Bytes,
        idempotent: bool,
    ) -> Result<reqwest::Response, GatewayError> {
        let _permit = tokio::time::timeout(POOL_ACQUIRE_TIMEOUT, self.connection_limit.acquire())
            .await
            .map_err(|_| GatewayError::UpstreamTimeout)?
            .expect("connection_limit semaphore is never closed");

        let mut attempt = 0u32;
        loop {
            let result = self
                .client
                .request(Method::POST, url)
                .headers(headers.clone())
                .body(body.clone())
                .send()
                .await;

            match result {
                Ok(resp) if RETRIABLE_STATUS.contains(&resp.status()) && attempt < self.max_retries => {
                    let wait = calculate_wait_time(&resp, attempt);
                    attempt += 1;
                    tracing::warn!(status = %resp.status(), attempt, "upstream returned retriable status, backing off");
                    tokio::time::sleep(wait).await;
                    continue;
                }
                Ok(resp) => return Ok(resp),
                Err(err) => {
                    let retriable = idempotent && attempt < self.max_retries && err.is_connect();
                    if retriable {
                        let wait = calculate_backoff(attempt);
                        attempt += 1;
                        tracing::warn!(error = %err, attempt, "upstream connect failed, retrying");
                        tokio::time::sleep(wait).await;
                        continue;
                    }
                    return Err(translate_error(err));
                }
            }
        }
    }
}

fn insert_str(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

fn translate_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::UpstreamTimeout
    } else {
        GatewayError::UpstreamUnavailable(err.to_string())
    }
}

fn calculate_wait_time(resp: &reqwest::Response, attempt: u32) -> Duration {
    if let Some(retry_after) = resp.headers().get("retry-after") {
        if let Ok(s) = retry_after.to_str() {
            if let Ok(secs) = s.parse::<u64>() {
                return Duration::from_secs(secs);
            }
        }
    }
    calculate_backoff(attempt)
}

fn calculate_backoff(attempt: u32) -> Duration {
    let base_ms: u64 = 500;
    let max_ms: u64 = 10_000;
    let exp = base_ms.saturating_mul(1u64 << attempt.min(8)).min(max_ms);
    let jitter = rand::thread_rng().gen_range(0..=exp / 4 + 1);
    Duration::from_millis(exp + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let a0 = calculate_backoff(0);
        let a5 = calculate_backoff(5);
        assert!(a5 >= a0);
        assert!(a5 <= Duration::from_millis(10_000 + 2_501));
    }
}
