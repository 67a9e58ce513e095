//! Postgres-backed reads for the five tables the data path consults
//! (tenants, workspaces, agent_access_keys, guardrails, policies) and the
//! one it writes (audit_decisions). The admin CRUD surface that owns writes
//! to the first five is out of scope per the governance spec; this module
//! only ever reads them, always filtering `deleted_at IS NULL`.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{AgentAccessKeyRow, AuditDecision, PolicyRow, WorkspaceRow};

pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    Ok(PgPool::connect(database_url).await?)
}

pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn find_access_key_by_hash(
    pool: &PgPool,
    hash: &str,
) -> Result<Option<AgentAccessKeyRow>, sqlx::Error> {
    sqlx::query_as::<_, AgentAccessKeyRow>(
        r#"SELECT id, key_hash, key_prefix, workspace_id, agent_id, is_active, is_revoked, expires_at
           FROM agent_access_keys
           WHERE key_hash = $1 AND deleted_at IS NULL"#,
    )
    .bind(hash)
    .fetch_optional(pool)
    .await
}

pub async fn touch_access_key_usage(pool: &PgPool, key_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE agent_access_keys SET last_used_at = NOW(), usage_count = usage_count + 1 WHERE id = $1",
    )
    .bind(key_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_workspace(
    pool: &PgPool,
    workspace_id: Uuid,
) -> Result<Option<WorkspaceRow>, sqlx::Error> {
    sqlx::query_as::<_, WorkspaceRow>(
        r#"SELECT id, tenant_id, upstream_mcp_url, fail_mode, decision_timeout_ms
           FROM workspaces
           WHERE id = $1 AND deleted_at IS NULL"#,
    )
    .bind(workspace_id)
    .fetch_optional(pool)
    .await
}

/// Every enabled, non-deleted policy whose scope matches this context at
/// any of the three levels (tenant-only, tenant+workspace, or
/// tenant+workspace+agent). Precedence reduction happens in `policy::resolver`.
pub async fn find_matching_policies(
    pool: &PgPool,
    tenant_id: Uuid,
    workspace_id: Uuid,
    agent_id: Uuid,
) -> Result<Vec<PolicyRow>, sqlx::Error> {
    sqlx::query_as::<_, PolicyRow>(
        r#"SELECT id, tenant_id, workspace_id, agent_id, guardrail_type, action, config, priority, enabled
           FROM policies
           WHERE tenant_id = $1
             AND enabled = true
             AND deleted_at IS NULL
             AND (
               (workspace_id IS NULL AND agent_id IS NULL)
               OR (workspace_id = $2 AND agent_id IS NULL)
               OR (workspace_id = $2 AND agent_id = $3)
             )"#,
    )
    .bind(tenant_id)
    .bind(workspace_id)
    .bind(agent_id)
    .fetch_all(pool)
    .await
}

pub async fn insert_audit_decision(
    pool: &PgPool,
    decision: &AuditDecision,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO audit_decisions
           (decision_id, request_id, tenant_id, workspace_id, agent_id, direction, method,
            tool_name, final_action, guardrail_events, processing_time_ms, created_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"#,
    )
    .bind(decision.decision_id)
    .bind(decision.request_id)
    .bind(decision.tenant_id)
    .bind(decision.workspace_id)
    .bind(decision.agent_id)
    .bind(match decision.direction {
        crate::models::Direction::Request => "request",
        crate::models::Direction::Response => "response",
    })
    .bind(&decision.method)
    .bind(&decision.tool_name)
    .bind(&decision.final_action)
    .bind(&decision.guardrail_events)
    .bind(decision.processing_time_ms)
    .bind(decision.timestamp)
    .execute(pool)
    .await?;
    Ok(())
}
