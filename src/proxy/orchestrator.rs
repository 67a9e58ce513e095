//! ProxyOrchestrator (§4.10): the single axum handler every inbound call
//! passes through. Authenticate, resolve policy, run the request pipeline,
//! forward upstream, run the response pipeline, audit — in that order,
//! short-circuiting as soon as a stage decides the call is done.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::errors::GatewayError;
use crate::mcp;
use crate::models::{AuditDecision, Direction, RequestId};
use crate::pipeline::{self, PipelineOutcome};
use crate::state::AppState;

pub async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();

    let ctx = match state
        .authenticator
        .authenticate(header_str(&headers, "authorization"), &state.audit.usage_sender(), request_id)
        .await
    {
        Ok(ctx) => ctx,
        Err(err) => return err.into_response(),
    };

    let deadline = Duration::from_millis(ctx.decision_timeout_ms.max(1));

    let outcome = tokio::time::timeout(deadline, run_governed_call(&state, &ctx, &path, &headers, &body)).await;

    let (response, final_action, direction, request_events, response_events, tool_name, method) = match outcome {
        Ok(result) => result,
        Err(_) => {
            let err = GatewayError::UpstreamTimeout;
            (err.into_response(), "timeout".to_string(), Direction::Request, vec![], vec![], None, String::new())
        }
    };

    state.audit.emit(AuditDecision {
        decision_id: Uuid::new_v4(),
        request_id: ctx.request_id,
        tenant_id: ctx.tenant_id,
        workspace_id: ctx.workspace_id,
        agent_id: ctx.agent_id,
        direction,
        method,
        tool_name,
        final_action,
        guardrail_events: serde_json::json!({"request": request_events, "response": response_events}),
        processing_time_ms: started.elapsed().as_millis() as i64,
        timestamp: Utc::now(),
    });

    response
}

type GovernedResult = (
    Response,
    String,
    Direction,
    Vec<pipeline::GuardrailEvent>,
    Vec<pipeline::GuardrailEvent>,
    Option<String>,
    String,
);

async fn run_governed_call(
    state: &Arc<AppState>,
    ctx: &crate::models::RequestContext,
    path: &str,
    headers: &HeaderMap,
    body: &Bytes,
) -> GovernedResult {
    let is_json = header_str(headers, "content-type")
        .map(|v| v.contains("application/json"))
        .unwrap_or(false);

    let parsed_body: Option<Value> = if is_json {
        serde_json::from_slice(body).ok()
    } else {
        None
    };

    let envelope = parsed_body.as_ref().and_then(mcp::parse_envelope);
    // §6: the JSON-RPC error envelope echoes the caller's own request id, or
    // null when the body isn't a parseable envelope at all.
    let echo_id = envelope.as_ref().map(|e| e.id.clone()).unwrap_or(Value::Null);
    let (method, tool_name) = envelope
        .map(|env| {
            let method = env.method.clone().unwrap_or_default();
            let tool = mcp::effective_tool_name(&env);
            (method, tool)
        })
        .unwrap_or_default();

    let policy = match state.policy_resolver.resolve(ctx).await {
        Ok(p) => p,
        Err(err) => {
            return terminal(
                err.into_response_with_id(echo_id),
                "policy_load_failure",
                Direction::Request,
                vec![],
                vec![],
                None,
                String::new(),
            );
        }
    };

    let request_body_for_pipeline = parsed_body.clone().unwrap_or(Value::Null);

    let request_outcome = pipeline::run(Direction::Request, &request_body_for_pipeline, ctx, &policy, &state.cache).await;

    let request_events = request_outcome.events().to_vec();

    let forward_body: Bytes = match &request_outcome {
        PipelineOutcome::Block { .. } => {
            let triggered: Vec<String> = request_events.iter().map(|e| e.guardrail_type.to_string()).collect();
            let err = GatewayError::GovernanceBlock {
                decision_id: Uuid::new_v4(),
                action: "block",
                guardrails_triggered: triggered,
            };
            return terminal(err.into_response_with_id(echo_id), "block", Direction::Request, request_events, vec![], tool_name, method);
        }
        PipelineOutcome::Throttle { retry_after_s, .. } => {
            let triggered: Vec<String> = request_events.iter().map(|e| e.guardrail_type.to_string()).collect();
            let err = GatewayError::RateLimited {
                decision_id: Uuid::new_v4(),
                guardrails_triggered: triggered,
                retry_after_seconds: *retry_after_s,
            };
            return terminal(err.into_response_with_id(echo_id), "throttle", Direction::Request, request_events, vec![], tool_name, method);
        }
        PipelineOutcome::Modify { body: new_body, .. } => {
            serde_json::to_vec(new_body).map(Bytes::from).unwrap_or_else(|_| body.clone())
        }
        PipelineOutcome::Allow { .. } => body.clone(),
    };

    let idempotent = is_idempotent_method(&method);
    let out_headers = state.upstream.build_headers(
        headers,
        ctx.request_id,
        ctx.tenant_id,
        ctx.workspace_id,
        ctx.agent_id,
    );

    let upstream_url = join_upstream_path(&ctx.upstream_url, path);

    let upstream_resp = match state.upstream.forward(&upstream_url, out_headers, forward_body, idempotent).await {
        Ok(resp) => resp,
        Err(err) => {
            return terminal(
                err.into_response_with_id(echo_id),
                "upstream_error",
                Direction::Request,
                request_events,
                vec![],
                tool_name,
                method,
            );
        }
    };

    let status = upstream_resp.status();
    let response_headers = upstream_resp.headers().clone();
    let response_bytes = match upstream_resp.bytes().await {
        Ok(b) => b,
        Err(err) => {
            return terminal(
                GatewayError::UpstreamUnavailable(err.to_string()).into_response_with_id(echo_id),
                "upstream_error",
                Direction::Request,
                request_events,
                vec![],
                tool_name,
                method,
            );
        }
    };

    let response_is_json = response_headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("application/json"))
        .unwrap_or(false);

    let parsed_response: Option<Value> = if response_is_json {
        serde_json::from_slice(&response_bytes).ok()
    } else {
        None
    };

    let response_body_for_pipeline = parsed_response.clone().unwrap_or(Value::Null);
    let response_outcome = pipeline::run(Direction::Response, &response_body_for_pipeline, ctx, &policy, &state.cache).await;
    let response_events = response_outcome.events().to_vec();

    let final_response = match &response_outcome {
        PipelineOutcome::Block { .. } => {
            let triggered: Vec<String> = response_events.iter().map(|e| e.guardrail_type.to_string()).collect();
            let err = GatewayError::GovernanceBlock {
                decision_id: Uuid::new_v4(),
                action: "block",
                guardrails_triggered: triggered,
            };
            return terminal(err.into_response_with_id(echo_id), "block", Direction::Response, request_events, response_events, tool_name, method);
        }
        PipelineOutcome::Throttle { retry_after_s, .. } => {
            let triggered: Vec<String> = response_events.iter().map(|e| e.guardrail_type.to_string()).collect();
            let err = GatewayError::RateLimited {
                decision_id: Uuid::new_v4(),
                guardrails_triggered: triggered,
                retry_after_seconds: *retry_after_s,
            };
            return terminal(err.into_response_with_id(echo_id), "throttle", Direction::Response, request_events, response_events, tool_name, method);
        }
        PipelineOutcome::Modify { body: new_body, .. } => {
            let bytes = serde_json::to_vec(new_body).unwrap_or_default();
            build_passthrough_response(status, bytes)
        }
        PipelineOutcome::Allow { .. } => build_passthrough_response(status, response_bytes.to_vec()),
    };

    let final_action = if matches!(response_outcome, PipelineOutcome::Modify { .. })
        || matches!(request_outcome, PipelineOutcome::Modify { .. })
    {
        "modify"
    } else {
        "allow"
    };

    // Both phases ran to completion; the response pipeline is the last one
    // to have touched the call, so it's the phase that produced this row.
    terminal(final_response, final_action, Direction::Response, request_events, response_events, tool_name, method)
}

fn terminal(
    mut response: Response,
    final_action: &str,
    direction: Direction,
    request_events: Vec<pipeline::GuardrailEvent>,
    response_events: Vec<pipeline::GuardrailEvent>,
    tool_name: Option<String>,
    method: String,
) -> GovernedResult {
    if let Ok(v) = HeaderValue::from_str(&Uuid::new_v4().to_string()) {
        response.headers_mut().insert("x-request-decision-id", v);
    }
    (response, final_action.to_string(), direction, request_events, response_events, tool_name, method)
}

fn build_passthrough_response(status: StatusCode, body: Vec<u8>) -> Response {
    (status, Json(serde_json::from_slice::<Value>(&body).unwrap_or(Value::Null))).into_response()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Append the inbound wildcard tail to the workspace's upstream MCP base
/// URL, per §6: `POST /governance-plane/api/v1/proxy/{path}` forwards to
/// `{upstream_mcp_url}/{path}`.
fn join_upstream_path(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// MCP methods that are safe to retry after a connection-level failure: they
/// don't mutate state on the upstream server, only read or list it.
fn is_idempotent_method(method: &str) -> bool {
    matches!(method, "tools/list" | "resources/list" | "resources/read" | "prompts/list" | "prompts/get" | "ping")
}
