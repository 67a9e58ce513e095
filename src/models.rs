//! Data model for the governance path: the entities the admin surface owns
//! but the proxy only ever reads, plus the per-request, non-persistent
//! structures the pipeline builds and consumes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One of the guardrail kinds enumerated in the guardrail catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailType {
    Rbac,
    PiiSsn,
    PiiCreditCard,
    PiiEmail,
    PiiPhone,
    PiiIpAddress,
    RateLimitPerMinute,
    RateLimitPerHour,
    ContentLargeDocuments,
    ContentStructuredData,
    ContentSourceCode,
}

impl GuardrailType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardrailType::Rbac => "rbac",
            GuardrailType::PiiSsn => "pii_ssn",
            GuardrailType::PiiCreditCard => "pii_credit_card",
            GuardrailType::PiiEmail => "pii_email",
            GuardrailType::PiiPhone => "pii_phone",
            GuardrailType::PiiIpAddress => "pii_ip_address",
            GuardrailType::RateLimitPerMinute => "rate_limit_per_minute",
            GuardrailType::RateLimitPerHour => "rate_limit_per_hour",
            GuardrailType::ContentLargeDocuments => "content_large_documents",
            GuardrailType::ContentStructuredData => "content_structured_data",
            GuardrailType::ContentSourceCode => "content_source_code",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAction {
    Allow,
    Block,
    Redact,
    Throttle,
    LogOnly,
}

/// Workspace-level choice of behavior when governance infrastructure degrades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailMode {
    Closed,
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Request,
    Response,
}

/// Row from `agent_access_keys`. Only the fields the authenticator needs.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AgentAccessKeyRow {
    pub id: Uuid,
    pub key_hash: String,
    pub key_prefix: String,
    pub workspace_id: Uuid,
    pub agent_id: Uuid,
    pub is_active: bool,
    pub is_revoked: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Row from `workspaces`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WorkspaceRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub upstream_mcp_url: String,
    pub fail_mode: String,
    pub decision_timeout_ms: i32,
}

impl WorkspaceRow {
    pub fn fail_mode(&self) -> FailMode {
        match self.fail_mode.as_str() {
            "open" => FailMode::Open,
            _ => FailMode::Closed,
        }
    }
}

/// Row from `policies`, joined with its guardrail type.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PolicyRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub workspace_id: Option<Uuid>,
    pub agent_id: Option<Uuid>,
    pub guardrail_type: String,
    pub action: String,
    pub config: serde_json::Value,
    pub priority: i32,
    pub enabled: bool,
}

impl PolicyRow {
    pub fn scope_rank(&self) -> u8 {
        match (self.workspace_id, self.agent_id) {
            (_, Some(_)) => 2, // agent scope
            (Some(_), None) => 1, // workspace scope
            (None, None) => 0, // tenant scope
        }
    }

    pub fn action(&self) -> PolicyAction {
        match self.action.as_str() {
            "block" => PolicyAction::Block,
            "redact" => PolicyAction::Redact,
            "throttle" => PolicyAction::Throttle,
            "log_only" => PolicyAction::LogOnly,
            _ => PolicyAction::Allow,
        }
    }
}

/// The id minted once per inbound call by `request_id_middleware`, carried
/// through axum request extensions so the `X-Request-ID` response header,
/// `RequestContext.request_id`, and the upstream `X-Gateway-Request-ID`
/// header all name the same call.
#[derive(Debug, Clone, Copy)]
pub struct RequestId(pub Uuid);

/// Derived per-request, non-persistent identity context.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub tenant_id: Uuid,
    pub workspace_id: Uuid,
    pub agent_id: Uuid,
    pub upstream_url: String,
    pub fail_mode: FailMode,
    pub decision_timeout_ms: u64,
    pub received_at: DateTime<Utc>,
}

/// One resolved entry in an effective policy set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveGuardrail {
    pub guardrail_type: GuardrailType,
    pub action: PolicyAction,
    pub config: serde_json::Value,
}

/// Resolved, precedence-reduced policy set for one request. Cached verbatim
/// between requests sharing the same (tenant, workspace, agent) triple.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EffectivePolicySet {
    pub entries: Vec<EffectiveGuardrail>,
}

impl EffectivePolicySet {
    pub fn get(&self, kind: GuardrailType) -> Option<&EffectiveGuardrail> {
        self.entries.iter().find(|e| e.guardrail_type == kind)
    }
}

/// Persisted governance decision, one per terminal pipeline state.
#[derive(Debug, Clone, Serialize)]
pub struct AuditDecision {
    pub decision_id: Uuid,
    pub request_id: Uuid,
    pub tenant_id: Uuid,
    pub workspace_id: Uuid,
    pub agent_id: Uuid,
    pub direction: Direction,
    pub method: String,
    pub tool_name: Option<String>,
    pub final_action: String,
    pub guardrail_events: serde_json::Value,
    pub processing_time_ms: i64,
    pub timestamp: DateTime<Utc>,
}
