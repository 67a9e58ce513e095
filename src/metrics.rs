//! Process-wide `prometheus` counters for the gateway's own operational
//! health — audit-channel drops and guardrail trigger counts. This is
//! ambient observability, not a governance decision, so it lives beside
//! `audit.rs`/`pipeline.rs` rather than inside either.

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static AUDIT_DECISIONS_DROPPED: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "mcpgate_audit_decisions_dropped_total",
        "Audit decisions dropped because the audit channel was full",
    )
    .expect("valid metric");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric registered once");
    counter
});

pub static AUDIT_USAGE_UPDATES_DROPPED: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "mcpgate_audit_usage_updates_dropped_total",
        "Key usage updates dropped because the usage channel was full",
    )
    .expect("valid metric");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric registered once");
    counter
});

pub static GUARDRAIL_TRIGGERS: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "mcpgate_guardrail_triggers_total",
            "Guardrail evaluations that triggered, by guardrail type and resulting action",
        ),
        &["guardrail_type", "action"],
    )
    .expect("valid metric");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric registered once");
    counter
});

/// Render the registry in the Prometheus text exposition format for the
/// `/metrics` endpoint.
pub fn render() -> String {
    let metric_families = REGISTRY.gather();
    let mut buf = Vec::new();
    TextEncoder::new()
        .encode(&metric_families, &mut buf)
        .expect("prometheus encoding never fails for well-formed metrics");
    String::from_utf8(buf).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendering_includes_registered_metric_names() {
        AUDIT_DECISIONS_DROPPED.inc();
        GUARDRAIL_TRIGGERS.with_label_values(&["rbac", "block"]).inc();
        let rendered = render();
        assert!(rendered.contains("mcpgate_audit_decisions_dropped_total"));
        assert!(rendered.contains("mcpgate_guardrail_triggers_total"));
    }
}
