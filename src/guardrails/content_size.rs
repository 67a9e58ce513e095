//! ContentSizeEvaluator family (§4.6): three independent size caps over the
//! body tree — long strings, wide arrays, and oversized code blocks.

use serde::Deserialize;
use serde_json::{json, Value};

use super::{EvalAction, EvaluationResult};
use crate::jsonwalk::{looks_like_fenced_code, walk_arrays, walk_strings};
use crate::models::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeKind {
    LargeDocuments,
    StructuredData,
    SourceCode,
}

#[derive(Debug, Deserialize, Default)]
struct SizeConfig {
    max_chars: Option<usize>,
    max_rows: Option<usize>,
    #[serde(default = "default_direction")]
    direction: String,
}

fn default_direction() -> String {
    "both".to_string()
}

fn applies_to(direction: Direction, configured: &str) -> bool {
    match configured {
        "request" => direction == Direction::Request,
        "response" => direction == Direction::Response,
        _ => true,
    }
}

pub fn evaluate(kind: SizeKind, direction: Direction, body: &Value, config: &Value) -> EvaluationResult {
    let cfg: SizeConfig = serde_json::from_value(config.clone()).unwrap_or_default();

    if !applies_to(direction, &cfg.direction) {
        return EvaluationResult::allow();
    }

    match kind {
        SizeKind::LargeDocuments => check_large_documents(body, cfg.max_chars),
        SizeKind::StructuredData => check_structured_data(body, cfg.max_rows),
        SizeKind::SourceCode => check_source_code(body, cfg.max_chars),
    }
}

fn check_large_documents(body: &Value, max_chars: Option<usize>) -> EvaluationResult {
    let Some(limit) = max_chars else {
        return EvaluationResult::allow();
    };
    let mut violation = None;
    walk_strings(body, &mut |leaf| {
        if violation.is_none() && leaf.value.chars().count() > limit {
            violation = Some((leaf.path.join("."), leaf.value.chars().count()));
        }
    });
    match violation {
        Some((path, len)) => EvaluationResult {
            action: EvalAction::Block,
            triggered: true,
            details: json!({"guardrail": "content_large_documents", "path": path, "chars": len, "max_chars": limit}),
        },
        None => EvaluationResult::allow(),
    }
}

fn check_structured_data(body: &Value, max_rows: Option<usize>) -> EvaluationResult {
    let Some(limit) = max_rows else {
        return EvaluationResult::allow();
    };
    let mut violation = None;
    walk_arrays(body, &mut |arr| {
        if violation.is_none() && arr.len() > limit {
            violation = Some(arr.len());
        }
    });
    match violation {
        Some(len) => EvaluationResult {
            action: EvalAction::Block,
            triggered: true,
            details: json!({"guardrail": "content_structured_data", "rows": len, "max_rows": limit}),
        },
        None => EvaluationResult::allow(),
    }
}

fn check_source_code(body: &Value, max_chars: Option<usize>) -> EvaluationResult {
    let Some(limit) = max_chars else {
        return EvaluationResult::allow();
    };
    let mut violation = None;
    walk_strings(body, &mut |leaf| {
        if violation.is_some() {
            return;
        }
        let is_code = looks_like_fenced_code(leaf.value)
            || leaf.path.last().map(|k| k == "code" || k == "source").unwrap_or(false);
        if is_code && leaf.value.chars().count() > limit {
            violation = Some((leaf.path.join("."), leaf.value.chars().count()));
        }
    });
    match violation {
        Some((path, len)) => EvaluationResult {
            action: EvalAction::Block,
            triggered: true,
            details: json!({"guardrail": "content_source_code", "path": path, "chars": len, "max_chars": limit}),
        },
        None => EvaluationResult::allow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn large_documents_blocks_over_limit_string() {
        let body = json!({"text": "x".repeat(100)});
        let cfg = json!({"max_chars": 50});
        let res = evaluate(SizeKind::LargeDocuments, Direction::Request, &body, &cfg);
        assert!(matches!(res.action, EvalAction::Block));
    }

    #[test]
    fn large_documents_allows_under_limit() {
        let body = json!({"text": "short"});
        let cfg = json!({"max_chars": 50});
        let res = evaluate(SizeKind::LargeDocuments, Direction::Request, &body, &cfg);
        assert!(matches!(res.action, EvalAction::Allow));
    }

    #[test]
    fn structured_data_blocks_wide_array() {
        let rows: Vec<i32> = (0..20).collect();
        let body = json!({"rows": rows});
        let cfg = json!({"max_rows": 10});
        let res = evaluate(SizeKind::StructuredData, Direction::Response, &body, &cfg);
        assert!(matches!(res.action, EvalAction::Block));
    }

    #[test]
    fn structured_data_checks_nested_arrays() {
        let body = json!({"outer": {"inner_rows": (0..5).collect::<Vec<i32>>()}});
        let cfg = json!({"max_rows": 3});
        let res = evaluate(SizeKind::StructuredData, Direction::Response, &body, &cfg);
        assert!(matches!(res.action, EvalAction::Block));
    }

    #[test]
    fn source_code_blocks_oversized_fenced_block() {
        let code = format!("```rust\n{}\n```", "fn x() {}\n".repeat(50));
        let body = json!({"content": code});
        let cfg = json!({"max_chars": 100});
        let res = evaluate(SizeKind::SourceCode, Direction::Response, &body, &cfg);
        assert!(matches!(res.action, EvalAction::Block));
    }

    #[test]
    fn source_code_ignores_plain_prose() {
        let body = json!({"content": "just a normal sentence with no code fences at all here"});
        let cfg = json!({"max_chars": 10});
        let res = evaluate(SizeKind::SourceCode, Direction::Response, &body, &cfg);
        assert!(matches!(res.action, EvalAction::Allow));
    }

    #[test]
    fn missing_limit_is_a_no_op() {
        let body = json!({"text": "x".repeat(1000)});
        let cfg = json!({});
        let res = evaluate(SizeKind::LargeDocuments, Direction::Request, &body, &cfg);
        assert!(matches!(res.action, EvalAction::Allow));
    }

    #[test]
    fn direction_scoping_is_respected() {
        let body = json!({"text": "x".repeat(100)});
        let cfg = json!({"max_chars": 10, "direction": "response"});
        let res = evaluate(SizeKind::LargeDocuments, Direction::Request, &body, &cfg);
        assert!(matches!(res.action, EvalAction::Allow));
    }
}
