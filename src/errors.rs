use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

/// One row per error kind in the governance data path's error table.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("policy load failed: {0}")]
    PolicyLoadFailure(String),

    #[error("governance infrastructure unavailable: {0}")]
    GuardrailInfraFailure(String),

    #[error("request blocked by policy")]
    GovernanceBlock {
        decision_id: Uuid,
        action: &'static str,
        guardrails_triggered: Vec<String>,
    },

    #[error("rate limited")]
    RateLimited {
        decision_id: Uuid,
        guardrails_triggered: Vec<String>,
        retry_after_seconds: u64,
    },

    #[error("upstream timed out")]
    UpstreamTimeout,

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("upstream returned {0}")]
    UpstreamError(u16),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("cache error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    /// JSON-RPC 2.0 error code per §6 of the governance spec.
    fn jsonrpc_code(&self) -> i64 {
        match self {
            GatewayError::GovernanceBlock { .. } | GatewayError::RateLimited { .. } => -32001,
            GatewayError::UpstreamTimeout => -32002,
            GatewayError::UpstreamUnavailable(_) | GatewayError::UpstreamError(_) => -32003,
            _ => -32000,
        }
    }

    /// Build the JSON-RPC error envelope, echoing the caller's request id.
    pub fn jsonrpc_body(&self, echo_id: Value) -> Value {
        let mut data = json!({});
        match self {
            GatewayError::GovernanceBlock {
                decision_id,
                action,
                guardrails_triggered,
            } => {
                data = json!({
                    "decision_id": decision_id,
                    "action": action,
                    "guardrails_triggered": guardrails_triggered,
                });
            }
            GatewayError::RateLimited {
                decision_id,
                guardrails_triggered,
                retry_after_seconds,
            } => {
                data = json!({
                    "decision_id": decision_id,
                    "action": "throttle",
                    "guardrails_triggered": guardrails_triggered,
                    "retry_after_seconds": retry_after_seconds,
                });
            }
            _ => {}
        }

        json!({
            "jsonrpc": "2.0",
            "id": echo_id,
            "error": {
                "code": self.jsonrpc_code(),
                "message": self.to_string(),
                "data": data,
            }
        })
    }

    /// HTTP status the JSON-RPC error envelope is wrapped in.
    fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::PolicyLoadFailure(_) => StatusCode::FORBIDDEN,
            GatewayError::GuardrailInfraFailure(_) => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::GovernanceBlock { .. } => StatusCode::FORBIDDEN,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamError(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Database(e) => {
                tracing::error!("database error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::Redis(e) => {
                tracing::error!("cache error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::Internal(e) => {
                tracing::error!("internal error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Build the HTTP response, echoing `echo_id` as the JSON-RPC `id` per
    /// §6. Call sites that have a parsed envelope in hand should use this
    /// instead of `into_response` so the caller's request id round-trips
    /// into the error body instead of being discarded.
    pub fn into_response_with_id(self, echo_id: Value) -> Response {
        let status = self.status();
        let body = Json(self.jsonrpc_body(echo_id));
        let mut response = (status, body).into_response();

        if let GatewayError::RateLimited {
            retry_after_seconds,
            ..
        } = &self
        {
            if let Ok(v) = axum::http::HeaderValue::from_str(&retry_after_seconds.to_string()) {
                response.headers_mut().insert("retry-after", v);
            }
        }

        response
    }
}

impl IntoResponse for GatewayError {
    /// Pre-auth and infrastructure failures have no parsed envelope to echo
    /// an id from, so this always answers with `"id": null`. Anywhere a
    /// request body has already been parsed, prefer `into_response_with_id`.
    fn into_response(self) -> Response {
        self.into_response_with_id(Value::Null)
    }
}
