//! AuditEmitter (§4.11): a bounded mpsc channel feeding one drain task that
//! owns all writes to `audit_decisions` and the access-key usage counters.
//! Bounded and drop-on-full rather than unbounded, so an audit write stall
//! degrades into lost audit rows instead of unbounded memory growth or
//! backpressure on the request path.

use sqlx::PgPool;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::metrics;
use crate::models::AuditDecision;
use crate::store;

/// Fire-and-forget `last_used_at`/`usage_count` bump for an access key.
#[derive(Debug, Clone, Copy)]
pub struct UsageUpdate {
    pub key_id: Uuid,
}

#[derive(Debug)]
enum AuditMessage {
    Decision(AuditDecision),
    Usage(UsageUpdate),
}

pub struct AuditEmitter {
    sender: mpsc::Sender<AuditMessage>,
    usage_sender: mpsc::Sender<UsageUpdate>,
}

impl AuditEmitter {
    /// Spawn the drain task and return the handle callers enqueue onto.
    /// `usage` gets its own channel of the same capacity so a burst of
    /// decision writes can't starve usage bumps or vice versa.
    pub fn spawn(pool: PgPool, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<AuditMessage>(capacity);
        let (usage_tx, mut usage_rx) = mpsc::channel::<UsageUpdate>(capacity);

        let drain_pool = pool.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(msg) = rx.recv() => {
                        if let AuditMessage::Decision(decision) = msg {
                            if let Err(err) = store::insert_audit_decision(&drain_pool, &decision).await {
                                tracing::error!(error = %err, decision_id = %decision.decision_id, "failed to persist audit decision");
                            }
                        }
                    }
                    Some(update) = usage_rx.recv() => {
                        if let Err(err) = store::touch_access_key_usage(&drain_pool, update.key_id).await {
                            tracing::error!(error = %err, key_id = %update.key_id, "failed to record key usage");
                        }
                    }
                    else => break,
                }
            }
        });

        Self { sender: tx, usage_sender: usage_tx }
    }

    /// Non-blocking enqueue of a terminal decision. Never backpressures the
    /// request path; a full channel just drops the row and counts it.
    pub fn emit(&self, decision: AuditDecision) {
        if self.sender.try_send(AuditMessage::Decision(decision)).is_err() {
            metrics::AUDIT_DECISIONS_DROPPED.inc();
            tracing::warn!("audit channel full, dropping decision");
        }
    }

    pub fn usage_sender(&self) -> mpsc::Sender<UsageUpdate> {
        self.usage_sender.clone()
    }

    pub fn dropped_decisions(&self) -> u64 {
        metrics::AUDIT_DECISIONS_DROPPED.get() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_update_carries_key_id() {
        let id = Uuid::new_v4();
        let update = UsageUpdate { key_id: id };
        assert_eq!(update.key_id, id);
    }
}
