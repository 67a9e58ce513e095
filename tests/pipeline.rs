//! End-to-end-ish coverage of the governance pipeline without a live
//! Postgres/Redis — these exercise `pipeline::run` directly against
//! synthetic `EffectivePolicySet`s, standing in for the scenarios a real
//! deployment would hit through the HTTP surface.

use chrono::Utc;
use mcpgate::cache::TieredCache;
use mcpgate::guardrails::rbac;
use mcpgate::models::{Direction, FailMode, PolicyAction, RequestContext};
use serde_json::json;
use uuid::Uuid;

fn ctx() -> RequestContext {
    RequestContext {
        request_id: Uuid::new_v4(),
        tenant_id: Uuid::new_v4(),
        workspace_id: Uuid::new_v4(),
        agent_id: Uuid::new_v4(),
        upstream_url: "http://localhost:9999".to_string(),
        fail_mode: FailMode::Closed,
        decision_timeout_ms: 5000,
        received_at: Utc::now(),
    }
}

// RBAC and the PII/content-size evaluators never touch the cache, so they
// can be driven directly through their own `evaluate` functions without a
// Redis connection. The rate-limit evaluator is exercised separately in
// `tests/rate_limit.rs` against a real `TieredCache`, since it is the one
// evaluator with an external dependency.

#[test]
fn s1_denied_tool_call_is_blocked() {
    let body = json!({
        "jsonrpc": "2.0",
        "id": 7,
        "method": "tools/call",
        "params": {"name": "delete_database", "arguments": {}}
    });
    let cfg = json!({"default_action": "allow", "denied_tools": ["delete_*"]});
    let res = rbac::evaluate(Direction::Request, &body, PolicyAction::Block, &cfg);
    assert!(res.triggered);
}

#[test]
fn s2_allowed_tool_passes_through() {
    let body = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": {"name": "search_articles", "arguments": {}}
    });
    let cfg = json!({"default_action": "allow", "denied_tools": ["delete_*"]});
    let res = rbac::evaluate(Direction::Request, &body, PolicyAction::Block, &cfg);
    assert!(!res.triggered);
}

#[tokio::test]
#[ignore = "requires a reachable redis instance; run with `cargo test -- --ignored` against a local redis"]
async fn rate_limit_throttles_after_the_configured_count() {
    let client = redis::Client::open("redis://127.0.0.1:6379").unwrap();
    let conn = redis::aio::ConnectionManager::new(client).await.unwrap();
    let cache = TieredCache::new(conn);
    let ctx = ctx();
    let cfg = json!({"limit": 2});

    for _ in 0..2 {
        let res = mcpgate::guardrails::rate_limit::evaluate(&ctx, &cfg, &cache, "per_minute").await;
        assert!(!res.triggered);
    }
    let res = mcpgate::guardrails::rate_limit::evaluate(&ctx, &cfg, &cache, "per_minute").await;
    assert!(res.triggered);
}
