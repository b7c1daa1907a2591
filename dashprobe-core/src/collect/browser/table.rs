//! Heuristic conversion of a rendered report region into header/row data.
//!
//! Two strategies, tried in order: a semantic pass over table/grid
//! accessibility roles, and a fallback that flattens the visual container's
//! text nodes and re-segments them into rows on date-like tokens.

use crate::collect::browser::frames::FrameContext;
use crate::error::Result;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

/// Abbreviated month + two-digit year, e.g. "Jan/23" or "fev/24". Accepts
/// Portuguese and English month abbreviations.
static MONTH_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(jan|fev|feb|mar|abr|apr|mai|may|jun|jul|ago|aug|set|sep|out|oct|nov|dez|dec)/\d{2}$",
    )
    .expect("month token pattern")
});

pub fn is_month_token(token: &str) -> bool {
    MONTH_TOKEN.is_match(token.trim())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableData {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableData {
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.rows.is_empty()
    }
}

const TABLE_ROOT_SELECTOR: &str = "[role=\"grid\"], [role=\"table\"], \
     [data-automationid=\"visualContainer\"], [data-automation-id=\"visualContainer\"]";

/// Semantic pass: first element with a table/grid role. Headers from
/// column-header roles or conventional header cells, rows from row roles,
/// empty cell text dropped, rows kept when any cell is non-empty.
const SEMANTIC_TABLE_JS: &str = r#"
(() => {
    const visible = (el) =>
        !!el && !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length);
    const norm = (s) => (s || '').trim();
    const table = document.querySelector('[role="table"], [role="grid"]');
    if (!visible(table)) return null;
    const headers = [];
    for (const cell of table.querySelectorAll('[role="columnheader"], thead th')) {
        const t = norm(cell.textContent);
        if (t) headers.push(t);
    }
    const rows = [];
    for (const row of table.querySelectorAll('[role="row"]')) {
        const cells = [];
        for (const cell of row.querySelectorAll('[role="gridcell"], td')) {
            const t = norm(cell.textContent);
            if (t) cells.push(t);
        }
        if (cells.length) rows.push(cells);
    }
    return { headers: headers, rows: rows };
})()
"#;

/// Fallback pass: flatten the visual container's text nodes (first 2000) in
/// document order. Row segmentation happens on the Rust side.
const FLATTEN_VISUAL_JS: &str = r#"
(() => {
    const visual = document.querySelector(
        '[data-automationid="visualContainer"], [data-automation-id="visualContainer"]');
    if (!visual) return null;
    const out = [];
    const walker = document.createTreeWalker(visual, NodeFilter.SHOW_TEXT);
    let node;
    while ((node = walker.nextNode()) && out.length < 2000) {
        const t = (node.textContent || '').trim();
        if (t) out.push(t);
    }
    return out;
})()
"#;

/// Re-segment a flat text stream into rows: a month-like token starts a new
/// row, everything else accumulates into the current one, and a trailing
/// partial row is flushed.
pub fn segment_rows(tokens: &[String]) -> Vec<Vec<String>> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    for token in tokens {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if is_month_token(token) {
            if !current.is_empty() {
                rows.push(std::mem::take(&mut current));
            }
            current.push(token.to_string());
        } else {
            current.push(token.to_string());
        }
    }
    if !current.is_empty() {
        rows.push(current);
    }
    rows
}

/// Poll (bounded) until a table/grid/visual-container root exists in the
/// context. A timeout is a per-tab miss, not an error.
pub async fn wait_for_table_root(ctx: &FrameContext, timeout_ms: u64) -> bool {
    let start = std::time::Instant::now();
    let timeout = Duration::from_millis(timeout_ms);
    let probe = format!(
        "!!document.querySelector({})",
        serde_json::to_string(TABLE_ROOT_SELECTOR).unwrap_or_default()
    );
    loop {
        let found = ctx
            .eval(probe.clone())
            .await
            .ok()
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if found {
            return true;
        }
        if start.elapsed() >= timeout {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

/// Run the semantic strategy, then the heuristic fallback when it yields
/// nothing.
pub async fn extract_table(ctx: &FrameContext) -> Result<TableData> {
    let semantic = ctx.eval(SEMANTIC_TABLE_JS.trim().to_string()).await?;
    if !semantic.is_null() {
        let headers = semantic["headers"]
            .as_array()
            .map(|v| json_strings(v))
            .unwrap_or_default();
        let rows = semantic["rows"]
            .as_array()
            .map(|rows| {
                rows.iter()
                    .filter_map(|r| r.as_array().map(|v| json_strings(v)))
                    .filter(|r| !r.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        let data = TableData { headers, rows };
        if !data.is_empty() {
            return Ok(data);
        }
    }

    let flat = ctx.eval(FLATTEN_VISUAL_JS.trim().to_string()).await?;
    let tokens: Vec<String> = flat.as_array().map(|v| json_strings(v)).unwrap_or_default();
    Ok(TableData {
        headers: Vec::new(),
        rows: segment_rows(&tokens),
    })
}

fn json_strings(values: &[serde_json::Value]) -> Vec<String> {
    values
        .iter()
        .filter_map(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Write headers (if any) and rows as UTF-8 CSV.
pub fn write_csv(data: &TableData, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| anyhow::anyhow!("opening {}: {e}", path.display()))?;
    if !data.headers.is_empty() {
        writer
            .write_record(&data.headers)
            .map_err(|e| anyhow::anyhow!("writing header: {e}"))?;
    }
    for row in &data.rows {
        writer
            .write_record(row)
            .map_err(|e| anyhow::anyhow!("writing row: {e}"))?;
    }
    writer
        .flush()
        .map_err(|e| anyhow::anyhow!("flushing {}: {e}", path.display()))?;
    Ok(())
}

/// Wait for a table root, extract and persist to a per-tab CSV. Returns
/// whether anything was written; misses are logged, not raised.
pub async fn extract_to_csv(
    ctx: &FrameContext,
    out_csv: &Path,
    tab_name: &str,
    timeout_ms: u64,
) -> Result<bool> {
    if !wait_for_table_root(ctx, timeout_ms).await {
        tracing::warn!(tab = tab_name, "timed out waiting for table/visual root");
        return Ok(false);
    }
    let data = extract_table(ctx).await?;
    if data.is_empty() {
        tracing::warn!(tab = tab_name, "nothing tabular visible");
        return Ok(false);
    }
    write_csv(&data, out_csv)?;
    tracing::info!(tab = tab_name, path = %out_csv.display(), rows = data.rows.len(), "wrote csv");
    Ok(true)
}
