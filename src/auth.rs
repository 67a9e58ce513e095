//! KeyAuthenticator: resolves a bearer agent-access-key into a
//! `RequestContext`, per §4.1.

use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::PgPool;

use crate::errors::GatewayError;
use crate::models::RequestContext;
use crate::store;

pub struct KeyAuthenticator {
    pool: PgPool,
}

impl KeyAuthenticator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Extract the bearer token, hash it, and resolve it to a context.
    /// `usage_sender` is the bounded channel the fire-and-forget
    /// `last_used_at`/`usage_count` update is enqueued on. `request_id` is
    /// the id `request_id_middleware` already minted for this call — it is
    /// not generated here so the audit row, the upstream header, and the
    /// `X-Request-ID` response header all agree.
    pub async fn authenticate(
        &self,
        authorization_header: Option<&str>,
        usage_sender: &tokio::sync::mpsc::Sender<crate::audit::UsageUpdate>,
        request_id: uuid::Uuid,
    ) -> Result<RequestContext, GatewayError> {
        let token = extract_bearer(authorization_header).ok_or(GatewayError::Unauthorized)?;
        if token.is_empty() {
            return Err(GatewayError::Unauthorized);
        }

        let hash = hex::encode(Sha256::digest(token.as_bytes()));

        let key = store::find_access_key_by_hash(&self.pool, &hash)
            .await
            .map_err(GatewayError::Database)?
            .ok_or(GatewayError::Unauthorized)?;

        if !key.is_active || key.is_revoked {
            return Err(GatewayError::Unauthorized);
        }
        if let Some(expires_at) = key.expires_at {
            if expires_at <= Utc::now() {
                return Err(GatewayError::Unauthorized);
            }
        }

        let workspace = store::find_workspace(&self.pool, key.workspace_id)
            .await
            .map_err(GatewayError::Database)?
            .ok_or(GatewayError::Unauthorized)?;

        if usage_sender.try_send(crate::audit::UsageUpdate { key_id: key.id }).is_err() {
            crate::metrics::AUDIT_USAGE_UPDATES_DROPPED.inc();
            tracing::debug!("usage-update channel full, dropping update");
        }

        Ok(RequestContext {
            request_id,
            tenant_id: workspace.tenant_id,
            workspace_id: workspace.id,
            agent_id: key.agent_id,
            upstream_url: workspace.upstream_mcp_url.clone(),
            fail_mode: workspace.fail_mode(),
            decision_timeout_ms: workspace.decision_timeout_ms.max(0) as u64,
            received_at: Utc::now(),
        })
    }
}

fn extract_bearer(header: Option<&str>) -> Option<&str> {
    header?.strip_prefix("Bearer ").map(str::trim)
}
