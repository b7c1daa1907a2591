//! Value objects moved between configuration, collectors and the runner.
//!
//! Everything here is immutable by convention: created from configuration or
//! collector output, consumed within one task execution, then discarded.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Raw content produced by a collector, tagged by kind so extraction
/// strategies can be matched against compatible payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    Text { body: String },
    Image { path: PathBuf },
    Empty,
}

impl Payload {
    pub fn text(body: impl Into<String>) -> Self {
        Payload::Text { body: body.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text { body } => Some(body),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Text { .. } => "text",
            Payload::Image { .. } => "image",
            Payload::Empty => "empty",
        }
    }
}

/// What a collector is asked to fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectRequest {
    /// URL or application target.
    pub source: String,
    /// CSS/XPath hint, when applicable.
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default = "default_method")]
    pub method: String,
    /// Collector-specific options: credentials, timeouts, tab names.
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl CollectRequest {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            selector: None,
            method: default_method(),
            extra: BTreeMap::new(),
        }
    }
}

/// What a collector hands back to the runner. Ownership passes to the
/// runner, which never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectResponse {
    pub payload: Payload,
    /// Pre-extracted value, when the collector already knows it.
    pub value: Option<String>,
    /// Status codes, engine name, output paths.
    pub meta: serde_json::Map<String, serde_json::Value>,
}

/// Declarative rule evaluated against the extracted value.
///
/// `Unsupported` is produced by the configuration layer for unrecognized
/// kinds, so evaluation can report the failure instead of aborting the task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidationRule {
    Equals {
        expected: serde_json::Value,
    },
    Regex {
        pattern: String,
    },
    Range {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    Tolerance {
        target: f64,
        #[serde(default = "default_pct")]
        pct: f64,
    },
    Unsupported {
        kind: String,
    },
}

fn default_pct() -> f64 {
    0.01
}

impl ValidationRule {
    pub fn kind(&self) -> &str {
        match self {
            ValidationRule::Equals { .. } => "equals",
            ValidationRule::Regex { .. } => "regex",
            ValidationRule::Range { .. } => "range",
            ValidationRule::Tolerance { .. } => "tolerance",
            ValidationRule::Unsupported { kind } => kind,
        }
    }
}

/// How a scalar value is derived from a raw payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ExtractionSpec {
    #[default]
    None,
    Css {
        path: String,
    },
    Pattern {
        pattern: String,
    },
    /// Unrecognized strategy tag, rejected at evaluation time.
    Other {
        kind: String,
    },
}

impl ExtractionSpec {
    pub fn is_none(&self) -> bool {
        matches!(self, ExtractionSpec::None)
    }
}

/// One end-to-end unit of work. Tasks are independent of each other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub collector: String,
    pub request: CollectRequest,
    #[serde(default)]
    pub extraction: ExtractionSpec,
    #[serde(default)]
    pub rules: Vec<ValidationRule>,
}

/// Pass/fail outcome of a single rule, with diagnostic detail for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleReport {
    pub rule: String,
    pub ok: bool,
    pub detail: serde_json::Value,
}

/// One structured record per task, produced on every path so callers can
/// tell "failed validation" from "could not run".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRecord {
    pub task_id: String,
    pub ok: bool,
    pub value: Option<String>,
    pub validations: Vec<RuleReport>,
    pub meta: serde_json::Map<String, serde_json::Value>,
}
