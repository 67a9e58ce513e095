//! JSON-RPC 2.0 envelope handling. The gateway does not interpret MCP
//! semantics beyond pulling the method name and, for `tools/call`, the tool
//! name out of the envelope — everything else passes through untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonRpcEnvelope {
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Value,
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

/// Extract the effective tool name per §4.4: `params.name` when the method
/// is `tools/call`, otherwise the method itself.
pub fn effective_tool_name(envelope: &JsonRpcEnvelope) -> Option<String> {
    let method = envelope.method.as_deref()?;
    if method == "tools/call" {
        envelope
            .params
            .as_ref()
            .and_then(|p| p.get("name"))
            .and_then(|n| n.as_str())
            .map(str::to_string)
    } else {
        Some(method.to_string())
    }
}

/// Parse a request body as a JSON-RPC envelope if it looks like one.
/// Returns `None` for non-JSON-RPC bodies — the orchestrator then treats the
/// body as opaque for RBAC purposes but still runs content-aware guardrails
/// on whatever JSON structure is present.
pub fn parse_envelope(body: &Value) -> Option<JsonRpcEnvelope> {
    if !body.is_object() {
        return None;
    }
    serde_json::from_value(body.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_call_uses_params_name() {
        let env = parse_envelope(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {"name": "get_article", "arguments": {}}
        }))
        .unwrap();
        assert_eq!(effective_tool_name(&env), Some("get_article".to_string()));
    }

    #[test]
    fn non_tool_call_uses_method() {
        let env = parse_envelope(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/list"
        }))
        .unwrap();
        assert_eq!(effective_tool_name(&env), Some("tools/list".to_string()));
    }

    #[test]
    fn tool_call_missing_name_yields_none() {
        let env = parse_envelope(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {"arguments": {}}
        }))
        .unwrap();
        assert_eq!(effective_tool_name(&env), None);
    }

    #[test]
    fn non_object_body_is_not_an_envelope() {
        assert!(parse_envelope(&json!([1, 2, 3])).is_none());
    }

    #[test]
    fn id_echoes_verbatim_including_null_and_string() {
        let env = parse_envelope(&json!({"jsonrpc":"2.0","id":"abc","method":"ping"})).unwrap();
        assert_eq!(env.id, json!("abc"));
        let env = parse_envelope(&json!({"jsonrpc":"2.0","id":null,"method":"ping"})).unwrap();
        assert_eq!(env.id, Value::Null);
    }
}
