use sqlx::PgPool;
use std::collections::HashMap;

use crate::cache::TieredCache;
use crate::errors::GatewayError;
use crate::models::{
    EffectiveGuardrail, EffectivePolicySet, FailMode, GuardrailType, PolicyRow, RequestContext,
};
use crate::store;

pub struct PolicyResolver {
    pool: PgPool,
    cache: TieredCache,
    cache_ttl_secs: u64,
}

impl PolicyResolver {
    pub fn new(pool: PgPool, cache: TieredCache, cache_ttl_secs: u64) -> Self {
        Self { pool, cache, cache_ttl_secs }
    }

    /// Resolve the effective policy set for this request's (tenant,
    /// workspace, agent) triple, consulting the cache first.
    pub async fn resolve(&self, ctx: &RequestContext) -> Result<EffectivePolicySet, GatewayError> {
        let key = format!(
            "policy:{}:{}:{}",
            ctx.tenant_id, ctx.workspace_id, ctx.agent_id
        );

        if let Some(cached) = self.cache.get::<EffectivePolicySet>(&key).await {
            return Ok(cached);
        }

        let rows = match store::find_matching_policies(
            &self.pool,
            ctx.tenant_id,
            ctx.workspace_id,
            ctx.agent_id,
        )
        .await
        {
            Ok(rows) => rows,
            Err(err) => {
                return match ctx.fail_mode {
                    FailMode::Closed => {
                        Err(GatewayError::PolicyLoadFailure(err.to_string()))
                    }
                    FailMode::Open => {
                        tracing::warn!(error = %err, "policy load failed, failing open");
                        Ok(EffectivePolicySet::default())
                    }
                };
            }
        };

        let resolved = reduce(rows);

        if let Err(err) = self.cache.set(&key, &resolved, self.cache_ttl_secs).await {
            tracing::debug!(error = %err, "failed to cache effective policy set");
        }

        Ok(resolved)
    }
}

/// Group by guardrail type, pick the highest `(scope_rank, priority)` row in
/// each group; agent scope beats workspace scope beats tenant scope, and
/// ties within a scope break on priority descending.
fn reduce(rows: Vec<PolicyRow>) -> EffectivePolicySet {
    let mut best: HashMap<GuardrailType, PolicyRow> = HashMap::new();

    for row in rows {
        let Some(kind) = parse_guardrail_type(&row.guardrail_type) else {
            continue;
        };

        match best.get(&kind) {
            Some(current) if !outranks(&row, current) => {}
            _ => {
                best.insert(kind, row);
            }
        }
    }

    let mut entries: Vec<EffectiveGuardrail> = best
        .into_iter()
        .map(|(kind, row)| EffectiveGuardrail {
            guardrail_type: kind,
            action: row.action(),
            config: row.config,
        })
        .collect();

    entries.sort_by_key(|e| e.guardrail_type.as_str());
    EffectivePolicySet { entries }
}

fn outranks(candidate: &PolicyRow, current: &PolicyRow) -> bool {
    (candidate.scope_rank(), candidate.priority) > (current.scope_rank(), current.priority)
}

fn parse_guardrail_type(s: &str) -> Option<GuardrailType> {
    match s {
        "rbac" => Some(GuardrailType::Rbac),
        "pii_ssn" => Some(GuardrailType::PiiSsn),
        "pii_credit_card" => Some(GuardrailType::PiiCreditCard),
        "pii_email" => Some(GuardrailType::PiiEmail),
        "pii_phone" => Some(GuardrailType::PiiPhone),
        "pii_ip_address" => Some(GuardrailType::PiiIpAddress),
        "rate_limit_per_minute" => Some(GuardrailType::RateLimitPerMinute),
        "rate_limit_per_hour" => Some(GuardrailType::RateLimitPerHour),
        "content_large_documents" => Some(GuardrailType::ContentLargeDocuments),
        "content_structured_data" => Some(GuardrailType::ContentStructuredData),
        "content_source_code" => Some(GuardrailType::ContentSourceCode),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn row(
        workspace_id: Option<Uuid>,
        agent_id: Option<Uuid>,
        action: &str,
        priority: i32,
    ) -> PolicyRow {
        PolicyRow {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            workspace_id,
            agent_id,
            guardrail_type: "rbac".to_string(),
            action: action.to_string(),
            config: json!({}),
            priority,
            enabled: true,
        }
    }

    #[test]
    fn agent_scope_beats_workspace_and_tenant_scope() {
        let ws = Uuid::new_v4();
        let agent = Uuid::new_v4();
        let rows = vec![
            row(None, None, "block", 100),
            row(Some(ws), None, "allow", 50),
            row(Some(ws), Some(agent), "log_only", 1),
        ];
        let resolved = reduce(rows);
        assert_eq!(resolved.entries.len(), 1);
        assert_eq!(resolved.entries[0].action, crate::models::PolicyAction::LogOnly);
    }

    #[test]
    fn ties_within_scope_break_on_priority() {
        let rows = vec![row(None, None, "allow", 1), row(None, None, "block", 10)];
        let resolved = reduce(rows);
        assert_eq!(resolved.entries[0].action, crate::models::PolicyAction::Block);
    }

    #[test]
    fn unknown_guardrail_type_is_dropped() {
        let mut r = row(None, None, "block", 1);
        r.guardrail_type = "not_a_real_type".to_string();
        let resolved = reduce(vec![r]);
        assert!(resolved.entries.is_empty());
    }
}
