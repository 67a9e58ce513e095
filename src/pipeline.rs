//! Pipeline (§4.8): composes the resolved guardrail set into the canonical
//! per-direction evaluation order and aggregates the outcome. Request
//! guardrails run RBAC, then rate limits, then the content-aware checks;
//! response guardrails skip RBAC and rate limits entirely since those only
//! ever gate the outbound call.

use serde_json::Value;

use crate::cache::TieredCache;
use crate::guardrails::{EvalAction, Guardrail};
use crate::models::{Direction, EffectivePolicySet, GuardrailType, RequestContext};

const REQUEST_ORDER: &[GuardrailType] = &[
    GuardrailType::Rbac,
    GuardrailType::RateLimitPerMinute,
    GuardrailType::RateLimitPerHour,
    GuardrailType::PiiSsn,
    GuardrailType::PiiCreditCard,
    GuardrailType::PiiEmail,
    GuardrailType::PiiPhone,
    GuardrailType::PiiIpAddress,
    GuardrailType::ContentLargeDocuments,
    GuardrailType::ContentStructuredData,
    GuardrailType::ContentSourceCode,
];

const RESPONSE_ORDER: &[GuardrailType] = &[
    GuardrailType::PiiSsn,
    GuardrailType::PiiCreditCard,
    GuardrailType::PiiEmail,
    GuardrailType::PiiPhone,
    GuardrailType::PiiIpAddress,
    GuardrailType::ContentLargeDocuments,
    GuardrailType::ContentStructuredData,
    GuardrailType::ContentSourceCode,
];

#[derive(Debug, Clone, serde::Serialize)]
pub struct GuardrailEvent {
    pub guardrail_type: &'static str,
    pub action: &'static str,
    pub details: Value,
}

#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    /// No guardrail triggered, or every trigger was `log_only`.
    Allow { body: Value, events: Vec<GuardrailEvent> },
    /// At least one `redact_with` rewrote the body; nothing blocked.
    Modify { body: Value, events: Vec<GuardrailEvent> },
    Block { events: Vec<GuardrailEvent>, triggering: GuardrailType },
    Throttle {
        retry_after_s: u64,
        events: Vec<GuardrailEvent>,
        triggering: GuardrailType,
    },
}

impl PipelineOutcome {
    pub fn events(&self) -> &[GuardrailEvent] {
        match self {
            PipelineOutcome::Allow { events, .. } => events,
            PipelineOutcome::Modify { events, .. } => events,
            PipelineOutcome::Block { events, .. } => events,
            PipelineOutcome::Throttle { events, .. } => events,
        }
    }

    pub fn final_action(&self) -> &'static str {
        match self {
            PipelineOutcome::Allow { .. } => "allow",
            PipelineOutcome::Modify { .. } => "modify",
            PipelineOutcome::Block { .. } => "block",
            PipelineOutcome::Throttle { .. } => "throttle",
        }
    }
}

pub async fn run(
    direction: Direction,
    body: &Value,
    ctx: &RequestContext,
    policy: &EffectivePolicySet,
    cache: &TieredCache,
) -> PipelineOutcome {
    let order = match direction {
        Direction::Request => REQUEST_ORDER,
        Direction::Response => RESPONSE_ORDER,
    };

    let mut current_body = body.clone();
    let mut events = Vec::new();
    let mut modified = false;

    for kind in order {
        let Some(entry) = policy.get(*kind) else {
            continue;
        };
        let guardrail = Guardrail::from_effective(entry);
        let result = guardrail.evaluate(direction, &current_body, ctx, cache).await;

        if !result.triggered {
            continue;
        }

        match result.action {
            EvalAction::Allow => {}
            EvalAction::LogOnly => {
                crate::metrics::GUARDRAIL_TRIGGERS.with_label_values(&[kind.as_str(), "log_only"]).inc();
                events.push(GuardrailEvent {
                    guardrail_type: kind.as_str(),
                    action: "log_only",
                    details: result.details,
                });
            }
            EvalAction::RedactWith(new_body) => {
                crate::metrics::GUARDRAIL_TRIGGERS.with_label_values(&[kind.as_str(), "redact"]).inc();
                current_body = new_body;
                modified = true;
                events.push(GuardrailEvent {
                    guardrail_type: kind.as_str(),
                    action: "redact",
                    details: result.details,
                });
            }
            EvalAction::Block => {
                crate::metrics::GUARDRAIL_TRIGGERS.with_label_values(&[kind.as_str(), "block"]).inc();
                events.push(GuardrailEvent {
                    guardrail_type: kind.as_str(),
                    action: "block",
                    details: result.details,
                });
                return PipelineOutcome::Block { events, triggering: *kind };
            }
            EvalAction::Throttle { retry_after_s } => {
                crate::metrics::GUARDRAIL_TRIGGERS.with_label_values(&[kind.as_str(), "throttle"]).inc();
                events.push(GuardrailEvent {
                    guardrail_type: kind.as_str(),
                    action: "throttle",
                    details: result.details,
                });
                return PipelineOutcome::Throttle {
                    retry_after_s,
                    events,
                    triggering: *kind,
                };
            }
        }
    }

    if modified {
        PipelineOutcome::Modify { body: current_body, events }
    } else {
        PipelineOutcome::Allow { body: current_body, events }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PolicyAction;
    use serde_json::json;

    fn event(kind: GuardrailType, action: &'static str) -> GuardrailEvent {
        GuardrailEvent {
            guardrail_type: kind.as_str(),
            action,
            details: json!({}),
        }
    }

    #[test]
    fn request_order_runs_rbac_before_rate_limits_and_content_checks() {
        let rbac_pos = REQUEST_ORDER.iter().position(|k| *k == GuardrailType::Rbac).unwrap();
        let rl_pos = REQUEST_ORDER
            .iter()
            .position(|k| *k == GuardrailType::RateLimitPerMinute)
            .unwrap();
        let pii_pos = REQUEST_ORDER.iter().position(|k| *k == GuardrailType::PiiSsn).unwrap();
        assert!(rbac_pos < rl_pos);
        assert!(rl_pos < pii_pos);
    }

    #[test]
    fn response_order_excludes_rbac_and_rate_limits() {
        assert!(!RESPONSE_ORDER.contains(&GuardrailType::Rbac));
        assert!(!RESPONSE_ORDER.contains(&GuardrailType::RateLimitPerMinute));
        assert!(!RESPONSE_ORDER.contains(&GuardrailType::RateLimitPerHour));
    }

    #[test]
    fn outcome_final_action_labels_match_variant() {
        let allow = PipelineOutcome::Allow { body: json!({}), events: vec![] };
        let modify = PipelineOutcome::Modify { body: json!({}), events: vec![event(GuardrailType::PiiEmail, "redact")] };
        let block = PipelineOutcome::Block { events: vec![], triggering: GuardrailType::Rbac };
        let throttle = PipelineOutcome::Throttle { retry_after_s: 5, events: vec![], triggering: GuardrailType::RateLimitPerMinute };

        assert_eq!(allow.final_action(), "allow");
        assert_eq!(modify.final_action(), "modify");
        assert_eq!(block.final_action(), "block");
        assert_eq!(throttle.final_action(), "throttle");
        assert_eq!(modify.events().len(), 1);
    }

    #[test]
    fn policy_action_values_are_reachable_from_config() {
        // sanity check that the policy action vocabulary the resolver hands
        // the pipeline covers every branch `Guardrail::evaluate` matches on.
        for a in [
            PolicyAction::Allow,
            PolicyAction::Block,
            PolicyAction::Redact,
            PolicyAction::Throttle,
            PolicyAction::LogOnly,
        ] {
            let _ = a;
        }
    }
}
