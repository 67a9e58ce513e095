//! GuardrailRegistry and the evaluator contract (§4.3): every guardrail is a
//! tagged-variant value carrying its kind, its config, and (for rate
//! limiting) the cache it needs to suspend on — not a registry of
//! name-to-trait-object lookups.

pub mod content_size;
pub mod pii;
pub mod rate_limit;
pub mod rbac;

use serde_json::Value;

use crate::cache::TieredCache;
use crate::models::{Direction, EffectiveGuardrail, GuardrailType, PolicyAction, RequestContext};

/// Outcome of evaluating one guardrail against one (direction, body) pair.
#[derive(Debug, Clone)]
pub struct EvaluationResult {
    pub action: EvalAction,
    pub triggered: bool,
    pub details: Value,
}

#[derive(Debug, Clone)]
pub enum EvalAction {
    Allow,
    Block,
    RedactWith(Value),
    Throttle { retry_after_s: u64 },
    LogOnly,
}

impl EvaluationResult {
    pub fn allow() -> Self {
        Self {
            action: EvalAction::Allow,
            triggered: false,
            details: Value::Null,
        }
    }
}

/// Build the value the registry dispatches on for one effective-policy entry.
pub struct Guardrail<'a> {
    pub kind: GuardrailType,
    pub action: PolicyAction,
    pub config: &'a Value,
}

impl<'a> Guardrail<'a> {
    pub fn from_effective(e: &'a EffectiveGuardrail) -> Self {
        Self {
            kind: e.guardrail_type,
            action: e.action,
            config: &e.config,
        }
    }

    /// Dispatch to the evaluator matching `self.kind`. `cache` is only
    /// actually used by the rate-limit variants; every other evaluator is
    /// CPU-only and never suspends.
    pub async fn evaluate(
        &self,
        direction: Direction,
        body: &Value,
        ctx: &RequestContext,
        cache: &TieredCache,
    ) -> EvaluationResult {
        match self.kind {
            GuardrailType::Rbac => rbac::evaluate(direction, body, self.action, self.config),
            GuardrailType::PiiSsn => {
                pii::evaluate(pii::PiiKind::Ssn, direction, body, self.action, self.config)
            }
            GuardrailType::PiiCreditCard => pii::evaluate(
                pii::PiiKind::CreditCard,
                direction,
                body,
                self.action,
                self.config,
            ),
            GuardrailType::PiiEmail => {
                pii::evaluate(pii::PiiKind::Email, direction, body, self.action, self.config)
            }
            GuardrailType::PiiPhone => {
                pii::evaluate(pii::PiiKind::Phone, direction, body, self.action, self.config)
            }
            GuardrailType::PiiIpAddress => pii::evaluate(
                pii::PiiKind::IpAddress,
                direction,
                body,
                self.action,
                self.config,
            ),
            GuardrailType::ContentLargeDocuments => content_size::evaluate(
                content_size::SizeKind::LargeDocuments,
                direction,
                body,
                self.config,
            ),
            GuardrailType::ContentStructuredData => content_size::evaluate(
                content_size::SizeKind::StructuredData,
                direction,
                body,
                self.config,
            ),
            GuardrailType::ContentSourceCode => content_size::evaluate(
                content_size::SizeKind::SourceCode,
                direction,
                body,
                self.config,
            ),
            GuardrailType::RateLimitPerMinute => {
                rate_limit::evaluate(ctx, self.config, cache, "per_minute").await
            }
            GuardrailType::RateLimitPerHour => {
                rate_limit::evaluate(ctx, self.config, cache, "per_hour").await
            }
        }
    }
}
