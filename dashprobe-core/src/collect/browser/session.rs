//! Browser session lifecycle over CDP.
//!
//! One session per collect call: launch, drive, unconditionally close. The
//! session also writes debug snapshots (full document markup plus a
//! full-page PNG) for offline inspection of failures.

use crate::error::{Error, Result};
use anyhow::Context;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, CaptureScreenshotParams,
};
use chromiumoxide::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub headless: bool,
    pub browser_path: Option<String>,
    pub window_size: (u32, u32),
    pub debug_dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            headless: true,
            browser_path: None,
            window_size: (1280, 720),
            debug_dir: PathBuf::from("exports/dashboard/debug"),
        }
    }
}

/// Locate a Chrome/Chromium binary: configured path first, then PATH lookup.
pub fn find_browser(configured: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = configured {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }
    for name in ["google-chrome", "chromium", "chromium-browser", "chrome"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }
    None
}

/// A live browser process with one page.
pub struct Session {
    browser: Browser,
    page: Page,
    handler_task: tokio::task::JoinHandle<()>,
    debug_dir: PathBuf,
}

impl Session {
    pub async fn launch(config: &SessionConfig) -> Result<Self> {
        let executable = find_browser(config.browser_path.as_deref()).ok_or_else(|| {
            Error::DependencyMissing("no Chrome/Chromium binary found".into())
        })?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(executable)
            .window_size(config.window_size.0, config.window_size.1)
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu");
        if !config.headless {
            builder = builder.with_head();
        }
        let browser_config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("building browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("failed to launch browser")?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to create page")?;

        std::fs::create_dir_all(&config.debug_dir)?;

        Ok(Self {
            browser,
            page,
            handler_task,
            debug_dir: config.debug_dir.clone(),
        })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Navigate with a bounded timeout. Timeouts and navigation errors are
    /// upstream failures.
    pub async fn navigate(&self, url: &str, timeout_ms: u64) -> Result<()> {
        let outcome = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.page.goto(url),
        )
        .await;
        match outcome {
            Ok(Ok(_)) => {
                let _ = self.page.wait_for_navigation().await;
                Ok(())
            }
            Ok(Err(e)) => Err(Error::Upstream(format!("navigation to {url} failed: {e}"))),
            Err(_) => Err(Error::Upstream(format!(
                "navigation to {url} timed out after {timeout_ms}ms"
            ))),
        }
    }

    pub async fn content(&self) -> Result<String> {
        Ok(self.page.content().await.context("reading page content")?)
    }

    pub async fn current_url(&self) -> Option<String> {
        self.page.url().await.ok().flatten()
    }

    /// Best-effort diagnostic snapshot named by failure context.
    pub async fn save_snapshot(&self, name: &str) {
        let html_path = self.debug_dir.join(format!("{name}.html"));
        let png_path = self.debug_dir.join(format!("{name}.png"));

        match self.page.content().await {
            Ok(html) => {
                if let Err(err) = std::fs::write(&html_path, html) {
                    tracing::warn!(%err, path = %html_path.display(), "snapshot html write failed");
                } else {
                    tracing::debug!(path = %html_path.display(), "saved snapshot html");
                }
            }
            Err(err) => tracing::warn!(%err, "snapshot: could not read page content"),
        }

        let params = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .capture_beyond_viewport(true)
            .build();
        match self.page.screenshot(params).await {
            Ok(png) => {
                if let Err(err) = std::fs::write(&png_path, png) {
                    tracing::warn!(%err, path = %png_path.display(), "snapshot png write failed");
                } else {
                    tracing::debug!(path = %png_path.display(), "saved snapshot png");
                }
            }
            Err(err) => tracing::warn!(%err, "snapshot: screenshot failed"),
        }
    }

    /// Tear down the page, the browser process and its event handler.
    pub async fn close(mut self) {
        let _ = self.page.close().await;
        if let Err(err) = self.browser.close().await {
            tracing::warn!(%err, "browser close failed");
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
    }
}

/// Poll until `document.readyState` is complete, bounded by `timeout_ms`.
/// Returns false when the page never settles; callers treat that as a
/// logged, non-fatal condition.
pub async fn wait_for_quiescence(page: &Page, timeout_ms: u64) -> bool {
    let start = std::time::Instant::now();
    let timeout = Duration::from_millis(timeout_ms);
    loop {
        let ready = page
            .evaluate_expression("document.readyState === 'complete'")
            .await
            .ok()
            .and_then(|r| r.value().and_then(|v| v.as_bool()))
            .unwrap_or(false);
        if ready {
            return true;
        }
        if start.elapsed() >= timeout {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}
