//! RateLimitEvaluator (§4.7): fixed-window atomic counters in Redis, with an
//! optional two-bucket weighted blend to smooth the window-edge burst that a
//! naive fixed window allows.

use serde::Deserialize;
use serde_json::{json, Value};

use super::{EvalAction, EvaluationResult};
use crate::cache::TieredCache;
use crate::models::{FailMode, RequestContext};

#[derive(Debug, Deserialize)]
struct RateLimitConfig {
    limit: u64,
    #[serde(default)]
    sliding: bool,
}

fn window_seconds(window_label: &str) -> u64 {
    match window_label {
        "per_hour" => 3600,
        _ => 60,
    }
}

pub async fn evaluate(
    ctx: &RequestContext,
    config: &Value,
    cache: &TieredCache,
    window_label: &str,
) -> EvaluationResult {
    let cfg: RateLimitConfig = match serde_json::from_value(config.clone()) {
        Ok(c) => c,
        Err(_) => return EvaluationResult::allow(),
    };

    let window = window_seconds(window_label);
    let now = ctx.received_at.timestamp() as u64;
    let bucket = now / window;
    let offset_in_window = now % window;
    let retry_after = window - offset_in_window;

    let key = format!(
        "rl:{}:{}:{}:{}",
        ctx.tenant_id, ctx.agent_id, window_label, bucket
    );

    let count = match cache.increment(&key, window).await {
        Ok(c) => c,
        Err(err) => {
            return match ctx.fail_mode {
                FailMode::Closed => EvaluationResult {
                    action: EvalAction::Throttle { retry_after_s: retry_after },
                    triggered: true,
                    details: json!({"guardrail": window_label, "reason": "cache_unavailable_fail_closed", "error": err.to_string()}),
                },
                FailMode::Open => EvaluationResult {
                    action: EvalAction::LogOnly,
                    triggered: true,
                    details: json!({"guardrail": window_label, "reason": "cache_unavailable_fail_open", "error": err.to_string()}),
                },
            };
        }
    };

    let effective_count = if cfg.sliding && bucket > 0 {
        let prev_key = format!(
            "rl:{}:{}:{}:{}",
            ctx.tenant_id, ctx.agent_id, window_label, bucket - 1
        );
        let prev = cache.get_counter(&prev_key).await.unwrap_or(0);
        let weight = (window - offset_in_window) as f64 / window as f64;
        count as f64 + prev as f64 * weight
    } else {
        count as f64
    };

    if effective_count > cfg.limit as f64 {
        EvaluationResult {
            action: EvalAction::Throttle { retry_after_s: retry_after },
            triggered: true,
            details: json!({
                "guardrail": window_label,
                "count": count,
                "effective_count": effective_count,
                "limit": cfg.limit,
            }),
        }
    } else {
        EvaluationResult::allow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_seconds_maps_labels() {
        assert_eq!(window_seconds("per_minute"), 60);
        assert_eq!(window_seconds("per_hour"), 3600);
    }
}
