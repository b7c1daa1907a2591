//! Browser-automation collector.
//!
//! One collect call drives a full session: launch, login, navigate to the
//! report, locate its frame, extract tabs to CSV, merge to a spreadsheet,
//! close. The browser process is released on every exit path.

pub mod frames;
pub mod login;
pub mod session;
pub mod table;
pub mod tabs;

use crate::collect::Collector;
use crate::error::{Error, Result};
use crate::export::merge_exports;
use crate::model::{CollectRequest, CollectResponse, Payload};
use async_trait::async_trait;
use frames::find_report_frame;
use login::{perform_login, Credentials, LoginSelectors};
use serde_json::json;
use session::{Session, SessionConfig};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tabs::{process_tabs, DEFAULT_EXPORT_STEM};

/// Environment variables consulted when the request carries no credentials.
pub const USERNAME_ENV: &str = "DASHPROBE_USERNAME";
pub const PASSWORD_ENV: &str = "DASHPROBE_PASSWORD";

#[derive(Debug, Clone)]
pub struct BrowserCollectorConfig {
    pub headless: bool,
    pub browser_path: Option<String>,
    pub window_size: (u32, u32),
    /// Per-tab CSV exports land here; debug snapshots in a subdirectory.
    pub export_dir: PathBuf,
    pub default_timeout_ms: u64,
    pub report_markers: Vec<String>,
    pub selectors: LoginSelectors,
}

impl Default for BrowserCollectorConfig {
    fn default() -> Self {
        Self {
            headless: true,
            browser_path: None,
            window_size: (1280, 720),
            export_dir: PathBuf::from("exports/dashboard"),
            default_timeout_ms: 30_000,
            report_markers: frames::DEFAULT_REPORT_MARKERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            selectors: LoginSelectors::default(),
        }
    }
}

impl BrowserCollectorConfig {
    fn debug_dir(&self) -> PathBuf {
        self.export_dir.join("debug")
    }
}

/// Typed view of the request's `extra` map, validated before any browser
/// starts.
#[derive(Debug, Clone)]
struct TaskOptions {
    credentials: Credentials,
    login_url: Option<String>,
    use_return_url: bool,
    wait_ms: u64,
    nav_timeout_ms: u64,
    merge_to_excel: bool,
    excel_name: String,
    tabs: Vec<String>,
}

fn opt_str(
    extra: &BTreeMap<String, serde_json::Value>,
    key: &str,
) -> Result<Option<String>> {
    match extra.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(Error::Config(format!(
            "request option '{key}' must be a string, got {other}"
        ))),
    }
}

fn opt_bool(
    extra: &BTreeMap<String, serde_json::Value>,
    key: &str,
    default: bool,
) -> Result<bool> {
    match extra.get(key) {
        None | Some(serde_json::Value::Null) => Ok(default),
        Some(serde_json::Value::Bool(b)) => Ok(*b),
        Some(other) => Err(Error::Config(format!(
            "request option '{key}' must be a boolean, got {other}"
        ))),
    }
}

fn opt_u64(
    extra: &BTreeMap<String, serde_json::Value>,
    key: &str,
    default: u64,
) -> Result<u64> {
    match extra.get(key) {
        None | Some(serde_json::Value::Null) => Ok(default),
        Some(serde_json::Value::Number(n)) => n.as_u64().ok_or_else(|| {
            Error::Config(format!("request option '{key}' must be a non-negative integer"))
        }),
        Some(other) => Err(Error::Config(format!(
            "request option '{key}' must be an integer, got {other}"
        ))),
    }
}

impl TaskOptions {
    fn from_request(request: &CollectRequest, default_timeout_ms: u64) -> Result<Self> {
        let extra = &request.extra;

        let username = opt_str(extra, "username")?
            .or_else(|| std::env::var(USERNAME_ENV).ok())
            .filter(|s| !s.is_empty());
        let password = opt_str(extra, "password")?
            .or_else(|| std::env::var(PASSWORD_ENV).ok())
            .filter(|s| !s.is_empty());
        let (username, password) = match (username, password) {
            (Some(u), Some(p)) => (u, p),
            _ => {
                return Err(Error::Config(format!(
                    "missing credentials: set request username/password or \
                     {USERNAME_ENV}/{PASSWORD_ENV}"
                )))
            }
        };

        let tabs = match extra.get("tabs") {
            None | Some(serde_json::Value::Null) => Vec::new(),
            Some(serde_json::Value::Array(items)) => {
                let mut tabs = Vec::with_capacity(items.len());
                for item in items {
                    match item.as_str() {
                        Some(s) if !s.trim().is_empty() => tabs.push(s.to_string()),
                        _ => {
                            return Err(Error::Config(
                                "request option 'tabs' must be non-empty strings".into(),
                            ))
                        }
                    }
                }
                tabs
            }
            Some(other) => {
                return Err(Error::Config(format!(
                    "request option 'tabs' must be a list, got {other}"
                )))
            }
        };

        Ok(Self {
            credentials: Credentials { username, password },
            login_url: opt_str(extra, "login_url")?,
            use_return_url: opt_bool(extra, "use_return_url", false)?,
            wait_ms: opt_u64(extra, "wait_ms", 6_000)?,
            nav_timeout_ms: opt_u64(extra, "nav_timeout_ms", default_timeout_ms.max(60_000))?,
            merge_to_excel: opt_bool(extra, "merge_to_excel", true)?,
            excel_name: opt_str(extra, "excel_name")?
                .unwrap_or_else(|| "dashboard_export.xlsx".into()),
            tabs,
        })
    }

    fn login_url_for(&self, source: &str) -> String {
        let base = self.login_url.clone().unwrap_or_else(|| source.to_string());
        if !self.use_return_url {
            return base;
        }
        let encoded: String = url::form_urlencoded::byte_serialize(source.as_bytes()).collect();
        let sep = if base.contains('?') { '&' } else { '?' };
        format!("{base}{sep}returnUrl={encoded}")
    }
}

pub struct BrowserCollector {
    config: BrowserCollectorConfig,
}

impl BrowserCollector {
    pub fn new(config: BrowserCollectorConfig) -> Self {
        Self { config }
    }

    async fn drive(
        &self,
        session: &Session,
        request: &CollectRequest,
        options: &TaskOptions,
    ) -> Result<CollectResponse> {
        let mut meta = serde_json::Map::new();
        meta.insert("engine".into(), "browser".into());

        let login_url = options.login_url_for(&request.source);
        let report = perform_login(
            session,
            &login_url,
            &options.credentials,
            &self.config.selectors,
            options.nav_timeout_ms,
            self.config.default_timeout_ms,
        )
        .await?;
        meta.insert("login".into(), serde_json::to_value(&report).unwrap_or_default());

        // Some targets keep the URL but set a session cookie; always try the
        // report even when the login attempt looked inconclusive.
        tracing::info!(source = %request.source, "opening report");
        if let Err(err) = session.navigate(&request.source, options.nav_timeout_ms).await {
            tracing::error!(%err, "report navigation failed");
            session.save_snapshot("report_navigation_failure").await;
            meta.insert("navigation_error".into(), err.to_string().into());
        }

        let frame = find_report_frame(session.page(), &self.config.report_markers).await?;
        let Some(frame) = frame else {
            tracing::warn!("report frame not located");
            session.save_snapshot("report_frame_missing").await;
            meta.insert("frame".into(), "not_found".into());
            let html = session.content().await?;
            return Ok(CollectResponse {
                payload: Payload::text(html),
                value: None,
                meta,
            });
        };

        std::fs::create_dir_all(&self.config.export_dir)?;
        let timeout = self.config.default_timeout_ms;
        if options.tabs.is_empty() {
            let out_csv = self
                .config
                .export_dir
                .join(format!("{DEFAULT_EXPORT_STEM}.csv"));
            let exported =
                table::extract_to_csv(&frame, &out_csv, DEFAULT_EXPORT_STEM, timeout).await?;
            meta.insert("tabs".into(), json!([{ "tab": DEFAULT_EXPORT_STEM, "exported": exported }]));
        } else {
            let outcomes = process_tabs(
                session,
                &frame,
                &options.tabs,
                &self.config.export_dir,
                15_000,
                timeout,
                1_000,
            )
            .await;
            meta.insert(
                "tabs".into(),
                serde_json::to_value(&outcomes).unwrap_or_default(),
            );
        }

        if options.merge_to_excel {
            let dest = self
                .config
                .export_dir
                .parent()
                .unwrap_or(self.config.export_dir.as_path())
                .join(&options.excel_name);
            match merge_exports(&self.config.export_dir, &dest) {
                Ok(path) => {
                    meta.insert("excel_path".into(), path.display().to_string().into());
                }
                Err(err) => {
                    tracing::warn!(%err, "export merge failed");
                    meta.insert("excel_error".into(), err.to_string().into());
                }
            }
        }

        if options.wait_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(options.wait_ms)).await;
        }

        meta.insert(
            "export_dir".into(),
            self.config.export_dir.display().to_string().into(),
        );
        let html = session.content().await?;
        Ok(CollectResponse {
            payload: Payload::text(html),
            value: None,
            meta,
        })
    }
}

#[async_trait]
impl Collector for BrowserCollector {
    async fn collect(&self, request: &CollectRequest) -> Result<CollectResponse> {
        // Validated before any browser process exists.
        let options = TaskOptions::from_request(request, self.config.default_timeout_ms)?;

        let session_config = SessionConfig {
            headless: self.config.headless,
            browser_path: self.config.browser_path.clone(),
            window_size: self.config.window_size,
            debug_dir: self.config.debug_dir(),
        };
        let session = Session::launch(&session_config).await?;
        let outcome = self.drive(&session, request, &options).await;
        session.close().await;
        outcome
    }
}
