//! Validation rule evaluation.
//!
//! Each rule produces a [`RuleReport`] with a pass/fail flag and a
//! diagnostic payload (expected/target, observed value, computed bounds).
//! Unsupported rule kinds fail the rule, never the process.

use crate::model::{RuleReport, ValidationRule};
use serde_json::json;

/// Locale-aware numeric coercion.
///
/// Strips currency symbols and spacing, drops thousands separators and
/// converts a decimal comma to a decimal point. Dots are only treated as
/// thousands separators when a decimal comma is present, so already
/// dot-decimal input ("1234.56") passes through unchanged.
pub fn normalize_numeric(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-' | '+'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let normalized = if cleaned.contains(',') {
        cleaned.replace('.', "").replace(',', ".")
    } else {
        cleaned
    };
    normalized.parse::<f64>().ok()
}

fn stringify(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Evaluate a single rule against the extracted value.
pub fn evaluate_rule(value: Option<&str>, rule: &ValidationRule) -> RuleReport {
    let got = value.unwrap_or("");
    match rule {
        ValidationRule::Equals { expected } => {
            let expected_str = stringify(expected);
            let ok = got == expected_str;
            RuleReport {
                rule: "equals".into(),
                ok,
                detail: json!({ "expected": expected, "got": value }),
            }
        }
        ValidationRule::Regex { pattern } => match regex::Regex::new(pattern) {
            Ok(re) => RuleReport {
                rule: "regex".into(),
                ok: re.is_match(got),
                detail: json!({ "pattern": pattern, "got": value }),
            },
            Err(err) => RuleReport {
                rule: "regex".into(),
                ok: false,
                detail: json!({ "pattern": pattern, "error": err.to_string() }),
            },
        },
        ValidationRule::Range { min, max } => {
            let coerced = value.and_then(normalize_numeric);
            let ok = match coerced {
                Some(v) => min.map_or(true, |m| v >= m) && max.map_or(true, |m| v <= m),
                None => false,
            };
            RuleReport {
                rule: "range".into(),
                ok,
                detail: json!({ "min": min, "max": max, "got": coerced }),
            }
        }
        ValidationRule::Tolerance { target, pct } => {
            let coerced = value.and_then(normalize_numeric);
            match coerced {
                None => RuleReport {
                    rule: "tolerance".into(),
                    ok: false,
                    detail: json!({ "error": "value_not_numeric", "got": value }),
                },
                Some(v) => {
                    let low = target * (1.0 - pct);
                    let high = target * (1.0 + pct);
                    RuleReport {
                        rule: "tolerance".into(),
                        ok: v >= low && v <= high,
                        detail: json!({
                            "target": target,
                            "pct": pct,
                            "interval": [low, high],
                            "got": v,
                        }),
                    }
                }
            }
        }
        ValidationRule::Unsupported { kind } => RuleReport {
            rule: kind.clone(),
            ok: false,
            detail: json!({ "error": "unsupported rule" }),
        },
    }
}

/// Evaluate all rules in order. Returns the overall outcome and the ordered
/// per-rule reports. An empty rule list is vacuously true.
pub fn evaluate_all(value: Option<&str>, rules: &[ValidationRule]) -> (bool, Vec<RuleReport>) {
    let reports: Vec<RuleReport> = rules.iter().map(|r| evaluate_rule(value, r)).collect();
    let ok = reports.iter().all(|r| r.ok);
    (ok, reports)
}
