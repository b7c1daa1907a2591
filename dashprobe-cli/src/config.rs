//! TOML configuration: collector settings plus the task list.
//!
//! Rule and extraction tables are deserialized loosely so unrecognized tags
//! degrade instead of failing the whole file: an unknown rule `type` becomes
//! [`ValidationRule::Unsupported`] (reported as a failing rule at run time),
//! an unknown extraction `strategy` becomes [`ExtractionSpec::Other`]
//! (rejected when the task executes). Known tags are validated strictly at
//! load so typos surface before any browser starts.

use anyhow::{Context, Result};
use dashprobe_core::collect::browser::login::LoginSelectors;
use dashprobe_core::collect::browser::BrowserCollectorConfig;
use dashprobe_core::collect::http::HttpCollectorConfig;
use dashprobe_core::collect::screen::ScreenCollectorConfig;
use dashprobe_core::model::{CollectRequest, ExtractionSpec, Task, ValidationRule};
use dashprobe_core::RunnerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub http: HttpSection,
    #[serde(default)]
    pub browser: BrowserSection,
    #[serde(default)]
    pub screen: ScreenSection,
    #[validate(length(min = 1, message = "at least one [[tasks]] entry is required"))]
    #[serde(default)]
    pub tasks: Vec<TaskSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpSection {
    pub timeout_secs: Option<u64>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrowserSection {
    pub headless: Option<bool>,
    pub browser_path: Option<String>,
    pub window_size: Option<(u32, u32)>,
    pub export_dir: Option<PathBuf>,
    pub default_timeout_ms: Option<u64>,
    pub report_markers: Option<Vec<String>>,
    #[serde(default)]
    pub selectors: SelectorsSection,
}

/// Site-specific login selector overrides. Unset fields keep the defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectorsSection {
    pub username: Option<String>,
    pub password: Option<String>,
    pub submit: Option<String>,
    pub postback_target: Option<String>,
    pub failure_message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScreenSection {
    pub capture_command: Option<String>,
    pub output_dir: Option<PathBuf>,
}

// Serialize is required by the validator derive on the containing task list.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskSection {
    pub id: String,
    pub collector: String,
    pub source: String,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default = "default_method")]
    pub method: String,
    /// Collector-specific options, passed through as-is.
    #[serde(default)]
    pub extra: toml::Table,
    #[serde(default)]
    pub extraction: Option<toml::Table>,
    #[serde(default)]
    pub rules: Vec<toml::Table>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: ConfigFile = toml::from_str(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("validating {}", path.display()))?;
        Ok(config)
    }

    pub fn runner_config(&self) -> RunnerConfig {
        let http_defaults = HttpCollectorConfig::default();
        let browser_defaults = BrowserCollectorConfig::default();
        let selector_defaults = LoginSelectors::default();

        let s = &self.browser.selectors;
        RunnerConfig {
            http: HttpCollectorConfig {
                timeout_secs: self.http.timeout_secs.unwrap_or(http_defaults.timeout_secs),
                user_agent: self
                    .http
                    .user_agent
                    .clone()
                    .unwrap_or(http_defaults.user_agent),
            },
            browser: BrowserCollectorConfig {
                headless: self.browser.headless.unwrap_or(browser_defaults.headless),
                browser_path: self.browser.browser_path.clone(),
                window_size: self
                    .browser
                    .window_size
                    .unwrap_or(browser_defaults.window_size),
                export_dir: self
                    .browser
                    .export_dir
                    .clone()
                    .unwrap_or(browser_defaults.export_dir),
                default_timeout_ms: self
                    .browser
                    .default_timeout_ms
                    .unwrap_or(browser_defaults.default_timeout_ms),
                report_markers: self
                    .browser
                    .report_markers
                    .clone()
                    .unwrap_or(browser_defaults.report_markers),
                selectors: LoginSelectors {
                    username: s.username.clone().or(selector_defaults.username),
                    password: s.password.clone().or(selector_defaults.password),
                    submit: s.submit.clone().or(selector_defaults.submit),
                    postback_target: s.postback_target.clone(),
                    failure_message: s
                        .failure_message
                        .clone()
                        .unwrap_or(selector_defaults.failure_message),
                },
            },
            screen: ScreenCollectorConfig {
                capture_command: self.screen.capture_command.clone(),
                output_dir: self
                    .screen
                    .output_dir
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("exports/screens")),
            },
        }
    }

    pub fn tasks(&self) -> Result<Vec<Task>> {
        self.tasks.iter().map(build_task).collect()
    }
}

fn build_task(section: &TaskSection) -> Result<Task> {
    let extraction = parse_extraction(section.extraction.as_ref())
        .with_context(|| format!("task '{}': extraction", section.id))?;
    let rules = section
        .rules
        .iter()
        .map(parse_rule)
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("task '{}': rules", section.id))?;

    if extraction.is_none() && rules.is_empty() {
        tracing::info!(task = %section.id, "no extraction and no rules; validation skipped");
    }

    let mut request = CollectRequest::new(section.source.clone());
    request.selector = section.selector.clone();
    request.method = section.method.clone();
    request.extra = section
        .extra
        .iter()
        .map(|(k, v)| (k.clone(), toml_to_json(v)))
        .collect();

    Ok(Task {
        id: section.id.clone(),
        collector: section.collector.clone(),
        request,
        extraction,
        rules,
    })
}

fn parse_extraction(table: Option<&toml::Table>) -> Result<ExtractionSpec> {
    let Some(table) = table else {
        return Ok(ExtractionSpec::None);
    };
    let strategy = table
        .get("strategy")
        .and_then(|v| v.as_str())
        .context("extraction table needs a 'strategy' string")?;
    match strategy {
        "none" => Ok(ExtractionSpec::None),
        "css" => {
            let path = require_str(table, "path")?;
            Ok(ExtractionSpec::Css { path })
        }
        "pattern" => {
            let pattern = require_str(table, "pattern")?;
            regex::Regex::new(&pattern)
                .with_context(|| format!("invalid extraction pattern '{pattern}'"))?;
            Ok(ExtractionSpec::Pattern { pattern })
        }
        other => {
            tracing::warn!(strategy = other, "unrecognized extraction strategy");
            Ok(ExtractionSpec::Other {
                kind: other.to_string(),
            })
        }
    }
}

fn parse_rule(table: &toml::Table) -> Result<ValidationRule> {
    let kind = table
        .get("type")
        .and_then(|v| v.as_str())
        .context("rule table needs a 'type' string")?;
    match kind {
        "equals" => {
            let expected = table
                .get("expected")
                .context("equals rule needs 'expected'")?;
            Ok(ValidationRule::Equals {
                expected: toml_to_json(expected),
            })
        }
        "regex" => {
            let pattern = require_str(table, "pattern")?;
            regex::Regex::new(&pattern)
                .with_context(|| format!("invalid rule pattern '{pattern}'"))?;
            Ok(ValidationRule::Regex { pattern })
        }
        "range" => {
            let min = opt_f64(table, "min")?;
            let max = opt_f64(table, "max")?;
            if min.is_none() && max.is_none() {
                anyhow::bail!("range rule needs 'min' or 'max'");
            }
            Ok(ValidationRule::Range { min, max })
        }
        "tolerance" => {
            let target =
                opt_f64(table, "target")?.context("tolerance rule needs a numeric 'target'")?;
            let pct = opt_f64(table, "pct")?.unwrap_or(0.01);
            Ok(ValidationRule::Tolerance { target, pct })
        }
        other => {
            tracing::warn!(kind = other, "unrecognized rule type, will report as failing");
            Ok(ValidationRule::Unsupported {
                kind: other.to_string(),
            })
        }
    }
}

fn require_str(table: &toml::Table, key: &str) -> Result<String> {
    table
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .with_context(|| format!("missing or non-string '{key}'"))
}

fn opt_f64(table: &toml::Table, key: &str) -> Result<Option<f64>> {
    match table.get(key) {
        None => Ok(None),
        Some(toml::Value::Float(f)) => Ok(Some(*f)),
        Some(toml::Value::Integer(i)) => Ok(Some(*i as f64)),
        Some(other) => anyhow::bail!("'{key}' must be numeric, got {other}"),
    }
}

/// TOML values carry over to JSON verbatim; datetimes become strings.
fn toml_to_json(value: &toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s.clone()),
        toml::Value::Integer(i) => serde_json::Value::from(*i),
        toml::Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        toml::Value::Boolean(b) => serde_json::Value::Bool(*b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => serde_json::Value::Object(
            table
                .iter()
                .map(|(k, v)| (k.clone(), toml_to_json(v)))
                .collect(),
        ),
    }
}
