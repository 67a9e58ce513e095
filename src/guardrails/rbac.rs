//! RBACEvaluator (§4.4): tool allow/deny matching with glob wildcards.
//! Applies only on the request direction.

use serde::Deserialize;
use serde_json::{json, Value};

use super::{EvalAction, EvaluationResult};
use crate::mcp;
use crate::models::{Direction, PolicyAction};

#[derive(Debug, Deserialize)]
struct RbacConfig {
    #[serde(default = "default_action")]
    default_action: String,
    #[serde(default)]
    allowed_tools: Vec<String>,
    #[serde(default)]
    denied_tools: Vec<String>,
}

fn default_action() -> String {
    "allow".to_string()
}

pub fn evaluate(
    direction: Direction,
    body: &Value,
    _action: PolicyAction,
    config: &Value,
) -> EvaluationResult {
    if direction != Direction::Request {
        return EvaluationResult::allow();
    }

    let cfg: RbacConfig = match serde_json::from_value(config.clone()) {
        Ok(c) => c,
        Err(_) => return EvaluationResult::allow(),
    };

    let tool_name = match mcp::parse_envelope(body).and_then(|e| mcp::effective_tool_name(&e)) {
        Some(name) => name,
        None => return EvaluationResult::allow(),
    };

    // 1. deny-first
    if cfg.denied_tools.iter().any(|p| glob_match(p, &tool_name)) {
        return EvaluationResult {
            action: EvalAction::Block,
            triggered: true,
            details: json!({"tool_name": tool_name, "reason": "denied_tools match"}),
        };
    }

    // 2/3. allow-list, if present, is authoritative
    if !cfg.allowed_tools.is_empty() {
        if cfg.allowed_tools.iter().any(|p| glob_match(p, &tool_name)) {
            return EvaluationResult {
                action: EvalAction::Allow,
                triggered: true,
                details: json!({"tool_name": tool_name, "reason": "allowed_tools match"}),
            };
        }
        return EvaluationResult {
            action: EvalAction::Block,
            triggered: true,
            details: json!({"tool_name": tool_name, "reason": "not in allowed_tools"}),
        };
    }

    // 4. default action
    match cfg.default_action.as_str() {
        "deny" => EvaluationResult {
            action: EvalAction::Block,
            triggered: true,
            details: json!({"tool_name": tool_name, "reason": "default_action=deny"}),
        },
        _ => EvaluationResult::allow(),
    }
}

/// `*` matches any run of characters; matching is case-sensitive and
/// anchored to the full string.
fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    let mut p_chars = pattern.chars().peekable();
    let mut t_chars = text.chars().peekable();
    let mut stack: Vec<(
        std::iter::Peekable<std::str::Chars>,
        std::iter::Peekable<std::str::Chars>,
    )> = Vec::new();

    loop {
        match (p_chars.peek(), t_chars.peek()) {
            (Some('*'), _) => {
                p_chars.next();
                stack.push((p_chars.clone(), t_chars.clone()));
            }
            (Some(pc), Some(tc)) if *pc == *tc => {
                p_chars.next();
                t_chars.next();
            }
            (None, None) => return true,
            _ => {
                if let Some((saved_p, mut saved_t)) = stack.pop() {
                    if saved_t.peek().is_none() {
                        return false;
                    }
                    saved_t.next();
                    p_chars = saved_p;
                    t_chars = saved_t;
                    stack.push((p_chars.clone(), t_chars.clone()));
                } else {
                    return false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call_body(tool: &str) -> Value {
        json!({"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":tool,"arguments":{}}})
    }

    #[test]
    fn glob_star_matches_any_suffix() {
        assert!(glob_match("get_*", "get_article"));
        assert!(!glob_match("get_*", "create_article"));
        assert!(glob_match("*", "anything"));
    }

    #[test]
    fn glob_is_case_sensitive_full_string() {
        assert!(!glob_match("Get_*", "get_article"));
        assert!(!glob_match("get_art", "get_article"));
    }

    #[test]
    fn denied_tools_block_even_if_allowed() {
        let cfg = json!({
            "default_action": "deny",
            "allowed_tools": ["*"],
            "denied_tools": ["create_article"]
        });
        let res = evaluate(
            Direction::Request,
            &call_body("create_article"),
            PolicyAction::Block,
            &cfg,
        );
        assert!(matches!(res.action, EvalAction::Block));
    }

    #[test]
    fn allowed_tools_nonempty_blocks_unlisted() {
        let cfg = json!({
            "default_action": "deny",
            "allowed_tools": ["search_articles", "get_article"],
            "denied_tools": ["create_article"]
        });
        let res = evaluate(
            Direction::Request,
            &call_body("create_article"),
            PolicyAction::Block,
            &cfg,
        );
        assert!(matches!(res.action, EvalAction::Block));

        let res = evaluate(
            Direction::Request,
            &call_body("get_article"),
            PolicyAction::Block,
            &cfg,
        );
        assert!(matches!(res.action, EvalAction::Allow));
    }

    #[test]
    fn default_action_applies_when_no_lists_match() {
        let cfg = json!({"default_action": "allow", "allowed_tools": [], "denied_tools": []});
        let res = evaluate(
            Direction::Request,
            &call_body("anything"),
            PolicyAction::Allow,
            &cfg,
        );
        assert!(matches!(res.action, EvalAction::Allow));
    }

    #[test]
    fn non_tool_call_method_used_as_name() {
        let cfg = json!({"default_action": "deny", "denied_tools": ["tools/list"]});
        let body = json!({"jsonrpc":"2.0","id":1,"method":"tools/list"});
        let res = evaluate(Direction::Request, &body, PolicyAction::Block, &cfg);
        assert!(matches!(res.action, EvalAction::Block));
    }

    #[test]
    fn response_direction_is_a_no_op() {
        let cfg = json!({"default_action": "deny"});
        let res = evaluate(Direction::Response, &call_body("x"), PolicyAction::Block, &cfg);
        assert!(matches!(res.action, EvalAction::Allow));
        assert!(!res.triggered);
    }
}
