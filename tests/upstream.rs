//! Drives `UpstreamClient::forward` against a real mocked HTTP server
//! instead of only the pure `calculate_backoff` helper, covering S6: a
//! retriable upstream failure followed by a successful retry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mcpgate::config::Config;
use mcpgate::proxy::upstream::UpstreamClient;
use reqwest::header::HeaderMap;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn test_config() -> Config {
    Config {
        port: 0,
        database_url: String::new(),
        redis_url: String::new(),
        upstream_timeout_seconds: 5,
        upstream_max_retries: 3,
        upstream_max_keepalive_connections: 10,
        upstream_max_connections: 10,
        proxy_forward_authorization: false,
        proxy_blocked_headers: vec!["cookie".into(), "set-cookie".into()],
        policy_cache_ttl_seconds: 10,
        decision_timeout_ms: 5000,
        audit_channel_capacity: 16,
    }
}

/// Answers 503 on the first call and 200 on every call after, so the test
/// can assert the client actually retried rather than just backed off once.
struct FlakyThenOk {
    calls: Arc<AtomicUsize>,
}

impl Respond for FlakyThenOk {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst);
        if attempt == 0 {
            ResponseTemplate::new(503)
        } else {
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": {}}))
        }
    }
}

#[tokio::test]
async fn retriable_status_is_retried_until_it_succeeds() {
    let server = MockServer::start().await;
    let calls = Arc::new(AtomicUsize::new(0));

    Mock::given(wiremock::matchers::method("POST"))
        .respond_with(FlakyThenOk { calls: calls.clone() })
        .mount(&server)
        .await;

    let client = UpstreamClient::new(&test_config());
    let resp = client
        .forward(&server.uri(), HeaderMap::new(), bytes::Bytes::from("{}"), true)
        .await
        .expect("eventually succeeds");

    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn non_retriable_status_is_returned_immediately() {
    let server = MockServer::start().await;

    Mock::given(wiremock::matchers::method("POST"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = UpstreamClient::new(&test_config());
    let resp = client
        .forward(&server.uri(), HeaderMap::new(), bytes::Bytes::from("{}"), true)
        .await
        .expect("404 is a response, not a transport error");

    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
}
