//! Per-tab orchestration: activate each named report tab and extract its
//! table. A failing tab is logged and snapshotted; remaining tabs proceed.

use crate::collect::browser::frames::FrameContext;
use crate::collect::browser::session::Session;
use crate::collect::browser::table::extract_to_csv;
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;

/// Filename used when the task names no tabs and the currently visible
/// table is exported once.
pub const DEFAULT_EXPORT_STEM: &str = "current_view";

#[derive(Debug, Clone, Serialize)]
pub struct TabOutcome {
    pub tab: String,
    pub exported: bool,
}

/// Locate the tab control by accessible label, title attribute, tooltip
/// attribute, then plain visible text; click it when found and visible.
const CLICK_TAB_JS: &str = r#"
(name) => {
    const visible = (el) =>
        !!el && !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length);
    const byAttr = (attr) =>
        Array.from(document.querySelectorAll('[' + attr + ']')).find(
            (el) => el.getAttribute(attr) === name && visible(el));
    let el = byAttr('aria-label') || byAttr('title') || byAttr('data-tooltip-content');
    if (!el) {
        el = Array.from(document.querySelectorAll('button, [role="tab"], a, div, span')).find(
            (n) => visible(n) && (n.textContent || '').trim() === name) || null;
    }
    if (!el) return false;
    el.click();
    return true;
}
"#;

/// Poll (bounded) until the tab control is visible and clicked.
async fn click_tab(ctx: &FrameContext, tab: &str, timeout_ms: u64) -> bool {
    let js = format!("({CLICK_TAB_JS})({})", json!(tab));
    let start = std::time::Instant::now();
    let timeout = Duration::from_millis(timeout_ms);
    loop {
        match ctx.eval(js.clone()).await {
            Ok(serde_json::Value::Bool(true)) => return true,
            Ok(_) => {}
            Err(err) => tracing::trace!(tab, %err, "tab lookup errored"),
        }
        if start.elapsed() >= timeout {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

fn sanitize(tab: &str) -> String {
    tab.replace(' ', "_")
}

/// Process every named tab in order, writing one CSV per tab. Returns the
/// per-tab outcomes; no failure aborts the remaining tabs.
pub async fn process_tabs(
    session: &Session,
    frame: &FrameContext,
    tabs: &[String],
    export_dir: &Path,
    tab_timeout_ms: u64,
    table_timeout_ms: u64,
    settle_ms: u64,
) -> Vec<TabOutcome> {
    let mut outcomes = Vec::with_capacity(tabs.len());
    for tab in tabs {
        tracing::info!(tab, "processing report tab");
        let stem = sanitize(tab);

        if !click_tab(frame, tab, tab_timeout_ms).await {
            tracing::error!(tab, "tab control not found or not clickable");
            session.save_snapshot(&format!("tab_{stem}_failure")).await;
            outcomes.push(TabOutcome {
                tab: tab.clone(),
                exported: false,
            });
            continue;
        }

        // Render settlement after the click is best-effort.
        tokio::time::sleep(Duration::from_millis(settle_ms)).await;

        let out_csv = export_dir.join(format!("{stem}.csv"));
        let exported = match extract_to_csv(frame, &out_csv, tab, table_timeout_ms).await {
            Ok(done) => done,
            Err(err) => {
                tracing::error!(tab, %err, "tab extraction failed");
                session.save_snapshot(&format!("tab_{stem}_failure")).await;
                false
            }
        };
        outcomes.push(TabOutcome {
            tab: tab.clone(),
            exported,
        });
    }
    outcomes
}
