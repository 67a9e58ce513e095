//! PIIEvaluator family (§4.5): five detectors — SSN, credit card (Luhn),
//! email, phone, IPv4 — sharing one scan-and-rewrite shape over the
//! generic JSON tree walker.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{EvalAction, EvaluationResult};
use crate::jsonwalk::{map_strings, walk_strings};
use crate::models::{Direction, PolicyAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PiiKind {
    Ssn,
    CreditCard,
    Email,
    Phone,
    IpAddress,
}

impl PiiKind {
    fn default_token(&self) -> &'static str {
        match self {
            PiiKind::Ssn => "[REDACTED:SSN]",
            PiiKind::CreditCard => "[REDACTED:CREDIT_CARD]",
            PiiKind::Email => "[REDACTED:EMAIL]",
            PiiKind::Phone => "[REDACTED:PHONE]",
            PiiKind::IpAddress => "[REDACTED:IP_ADDRESS]",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            PiiKind::Ssn => "pii_ssn",
            PiiKind::CreditCard => "pii_credit_card",
            PiiKind::Email => "pii_email",
            PiiKind::Phone => "pii_phone",
            PiiKind::IpAddress => "pii_ip_address",
        }
    }
}

#[derive(Debug, Deserialize)]
struct PiiConfig {
    #[serde(default = "default_direction")]
    direction: String,
    redaction_token: Option<String>,
}

fn default_direction() -> String {
    "both".to_string()
}

fn applies_to(direction: Direction, configured: &str) -> bool {
    match configured {
        "request" => direction == Direction::Request,
        "response" => direction == Direction::Response,
        _ => true, // "both" or unrecognised
    }
}

pub fn evaluate(
    kind: PiiKind,
    direction: Direction,
    body: &Value,
    action: PolicyAction,
    config: &Value,
) -> EvaluationResult {
    let cfg: PiiConfig = serde_json::from_value(config.clone()).unwrap_or(PiiConfig {
        direction: default_direction(),
        redaction_token: None,
    });

    if !applies_to(direction, &cfg.direction) {
        return EvaluationResult::allow();
    }

    let mut hit_count = 0usize;
    walk_strings(body, &mut |leaf| {
        hit_count += find_matches(kind, leaf.value).len();
    });

    if hit_count == 0 {
        return EvaluationResult::allow();
    }

    match action {
        PolicyAction::Block => EvaluationResult {
            action: EvalAction::Block,
            triggered: true,
            details: json!({"guardrail": kind.label(), "match_count": hit_count}),
        },
        PolicyAction::Redact => {
            let token = cfg.redaction_token.unwrap_or_else(|| kind.default_token().to_string());
            let mut new_body = body.clone();
            map_strings(&mut new_body, &mut |s| redact_string(kind, s, &token));
            EvaluationResult {
                action: EvalAction::RedactWith(new_body),
                triggered: true,
                details: json!({"guardrail": kind.label(), "match_count": hit_count}),
            }
        }
        PolicyAction::LogOnly => EvaluationResult {
            action: EvalAction::LogOnly,
            triggered: true,
            details: json!({"guardrail": kind.label(), "match_count": hit_count}),
        },
        _ => EvaluationResult::allow(),
    }
}

fn redact_string(kind: PiiKind, s: &str, token: &str) -> String {
    let matches = find_matches(kind, s);
    if matches.is_empty() {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for (start, end) in matches {
        out.push_str(&s[last..start]);
        out.push_str(token);
        last = end;
    }
    out.push_str(&s[last..]);
    out
}

/// Byte-range spans of every PII match of `kind` within `text`.
fn find_matches(kind: PiiKind, text: &str) -> Vec<(usize, usize)> {
    match kind {
        PiiKind::Ssn => find_ssn(text),
        PiiKind::CreditCard => find_credit_card(text),
        PiiKind::Email => EMAIL_RE.find_iter(text).map(|m| (m.start(), m.end())).collect(),
        PiiKind::Phone => find_phone(text),
        PiiKind::IpAddress => IPV4_RE.find_iter(text).map(|m| (m.start(), m.end())).collect(),
    }
}

static SSN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{3})([- ]?)(\d{2})([- ]?)(\d{4})\b")
        .expect("static SSN pattern is valid")
});

fn find_ssn(text: &str) -> Vec<(usize, usize)> {
    SSN_RE
        .captures_iter(text)
        .filter_map(|c| {
            let m = c.get(0)?;
            let area: u32 = c.get(1)?.as_str().parse().ok()?;
            let group: u32 = c.get(3)?.as_str().parse().ok()?;
            let serial: u32 = c.get(5)?.as_str().parse().ok()?;
            let valid = (1..=899).contains(&area)
                && area != 666
                && (1..=99).contains(&group)
                && (1..=9999).contains(&serial);
            valid.then(|| (m.start(), m.end()))
        })
        .collect()
}

static CARD_CANDIDATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:\d[ -]?){13,19}\b").expect("static card pattern is valid"));

fn find_credit_card(text: &str) -> Vec<(usize, usize)> {
    CARD_CANDIDATE_RE
        .find_iter(text)
        .filter_map(|m| {
            let digits: String = m.as_str().chars().filter(|c| c.is_ascii_digit()).collect();
            if (13..=19).contains(&digits.len()) && luhn_valid(&digits) {
                Some((m.start(), m.end()))
            } else {
                None
            }
        })
        .collect()
}

fn luhn_valid(digits: &str) -> bool {
    let mut sum = 0u32;
    let mut alternate = false;
    for c in digits.chars().rev() {
        let mut d = c.to_digit(10).unwrap_or(0);
        if alternate {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
        alternate = !alternate;
    }
    sum % 10 == 0
}

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}")
        .expect("static email pattern is valid")
});

static PHONE_CANDIDATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+\d{1,3}[ .-]?)?(?:\(\d{2,4}\)[ .-]?)?\d[\d .()-]{7,17}\d")
        .expect("static phone pattern is valid")
});

fn find_phone(text: &str) -> Vec<(usize, usize)> {
    PHONE_CANDIDATE_RE
        .find_iter(text)
        .filter_map(|m| {
            let digits: usize = m.as_str().chars().filter(|c| c.is_ascii_digit()).count();
            (10..=15).contains(&digits).then(|| (m.start(), m.end()))
        })
        .collect()
}

static IPV4_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:25[0-5]|2[0-4]\d|[01]?\d\d?)\.(?:25[0-5]|2[0-4]\d|[01]?\d\d?)\.(?:25[0-5]|2[0-4]\d|[01]?\d\d?)\.(?:25[0-5]|2[0-4]\d|[01]?\d\d?)\b")
        .expect("static IPv4 pattern is valid")
});

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn block_cfg() -> Value {
        json!({"direction": "both"})
    }

    #[test]
    fn ssn_detects_valid_and_rejects_placeholder() {
        assert_eq!(find_ssn("SSN is 123-45-6789").len(), 1);
        assert!(find_ssn("000-00-0000").is_empty());
        assert!(find_ssn("666-12-3456").is_empty());
        assert!(find_ssn("901-12-3456").is_empty()); // area > 899
    }

    #[test]
    fn credit_card_requires_luhn() {
        // Valid Visa test number
        assert_eq!(find_credit_card("card 4111 1111 1111 1111 ok").len(), 1);
        // Same digits, last one flipped -> invalid luhn
        assert!(find_credit_card("card 4111 1111 1111 1112 ok").is_empty());
    }

    #[test]
    fn email_requires_two_letter_tld() {
        assert_eq!(find_matches(PiiKind::Email, "contact me at jane@example.com").len(), 1);
        assert!(find_matches(PiiKind::Email, "not-an-email@").is_empty());
    }

    #[test]
    fn ipv4_matches_dotted_quad() {
        assert_eq!(find_matches(PiiKind::IpAddress, "server at 10.0.0.42 now").len(), 1);
        assert!(find_matches(PiiKind::IpAddress, "999.999.999.999").is_empty());
    }

    #[test]
    fn phone_counts_total_digits() {
        assert_eq!(find_matches(PiiKind::Phone, "call (415) 555-2671").len(), 1);
        assert!(find_matches(PiiKind::Phone, "12345").is_empty());
    }

    #[test]
    fn block_action_short_circuits_without_transform() {
        let body = json!({"text": "SSN is 123-45-6789"});
        let res = evaluate(PiiKind::Ssn, Direction::Response, &body, PolicyAction::Block, &block_cfg());
        assert!(matches!(res.action, EvalAction::Block));
        assert!(res.triggered);
    }

    #[test]
    fn redact_action_replaces_substring_in_place() {
        let body = json!({"text": "contact me at jane@example.com"});
        let cfg = json!({"direction": "both", "redaction_token": "[REDACTED:EMAIL]"});
        let res = evaluate(PiiKind::Email, Direction::Response, &body, PolicyAction::Redact, &cfg);
        match res.action {
            EvalAction::RedactWith(new_body) => {
                assert_eq!(new_body["text"], "contact me at [REDACTED:EMAIL]");
            }
            _ => panic!("expected redact"),
        }
    }

    #[test]
    fn direction_scoping_is_respected() {
        let body = json!({"text": "jane@example.com"});
        let cfg = json!({"direction": "request"});
        let res = evaluate(PiiKind::Email, Direction::Response, &body, PolicyAction::Block, &cfg);
        assert!(!res.triggered);
    }

    #[test]
    fn no_match_allows() {
        let body = json!({"text": "nothing sensitive here"});
        let res = evaluate(PiiKind::Ssn, Direction::Request, &body, PolicyAction::Block, &block_cfg());
        assert!(matches!(res.action, EvalAction::Allow));
    }
}
