//! Browsing-context plumbing: frame-scoped script evaluation and the
//! heuristic search for the analytics report's rendering frame.

use crate::error::Result;
use anyhow::Context;
use chromiumoxide::cdp::browser_protocol::page::{
    CreateIsolatedWorldParams, FrameId, FrameTree, GetFrameTreeParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::Page;

/// URL/attribute marker substrings identifying the report-embedding frame.
pub const DEFAULT_REPORT_MARKERS: &[&str] = &[
    "app.powerbi.com/reportembed",
    "powerbi",
    "report",
    "relatorio.aspx",
    "reportid=",
];

/// A script-evaluation target: either the main document or one nested frame.
///
/// Child-frame evaluation goes through an isolated world created for that
/// frame, so the same script source works in both cases.
#[derive(Clone)]
pub struct FrameContext {
    page: Page,
    frame_id: Option<FrameId>,
}

impl FrameContext {
    pub fn main(page: Page) -> Self {
        Self {
            page,
            frame_id: None,
        }
    }

    pub fn child(page: Page, frame_id: FrameId) -> Self {
        Self {
            page,
            frame_id: Some(frame_id),
        }
    }

    pub fn is_main(&self) -> bool {
        self.frame_id.is_none()
    }

    /// Evaluate a JS expression, returning its JSON value (null when the
    /// script yields none).
    pub async fn eval(&self, expression: String) -> Result<serde_json::Value> {
        match &self.frame_id {
            None => {
                let result = self
                    .page
                    .evaluate_expression(expression)
                    .await
                    .context("script evaluation failed")?;
                Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
            }
            Some(frame_id) => {
                let world = self
                    .page
                    .execute(
                        CreateIsolatedWorldParams::builder()
                            .frame_id(frame_id.clone())
                            .world_name("dashprobe")
                            // method name follows the CDP crate's spelling
                            .grant_univeral_access(true)
                            .build()
                            .map_err(|e| anyhow::anyhow!("isolated world params: {e}"))?,
                    )
                    .await
                    .context("creating isolated world")?;

                let params = EvaluateParams::builder()
                    .expression(expression)
                    .context_id(world.execution_context_id.clone())
                    .return_by_value(true)
                    .await_promise(true)
                    .build()
                    .map_err(|e| anyhow::anyhow!("evaluate params: {e}"))?;

                let response = self
                    .page
                    .execute(params)
                    .await
                    .context("frame script evaluation failed")?;
                if let Some(exception) = &response.exception_details {
                    return Err(
                        anyhow::anyhow!("frame script threw: {}", exception.text).into()
                    );
                }
                Ok(response
                    .result
                    .result
                    .value
                    .clone()
                    .unwrap_or(serde_json::Value::Null))
            }
        }
    }
}

fn flatten_tree(tree: &FrameTree, out: &mut Vec<(FrameId, String)>) {
    out.push((tree.frame.id.clone(), tree.frame.url.to_lowercase()));
    if let Some(children) = &tree.child_frames {
        for child in children {
            flatten_tree(child, out);
        }
    }
}

/// All browsing contexts of the page: the main document first, then every
/// nested frame in tree order.
pub async fn all_contexts(page: &Page) -> Result<Vec<FrameContext>> {
    let tree = page
        .execute(GetFrameTreeParams::default())
        .await
        .context("reading frame tree")?;
    let mut frames = Vec::new();
    flatten_tree(&tree.frame_tree, &mut frames);

    let mut contexts = vec![FrameContext::main(page.clone())];
    contexts.extend(
        frames
            .into_iter()
            .skip(1)
            .map(|(id, _)| FrameContext::child(page.clone(), id)),
    );
    Ok(contexts)
}

const IFRAME_SCAN_JS: &str = r#"
(markers) => {
    const frames = Array.from(document.querySelectorAll('iframe')).slice(0, 50);
    for (const el of frames) {
        const src = (el.getAttribute('src') || '').toLowerCase();
        const title = (el.getAttribute('title') || '').toLowerCase();
        if (markers.some((m) => src.includes(m) || title.includes(m))) {
            return src;
        }
    }
    return null;
}
"#;

/// Two-pass search for the frame hosting the analytics report.
///
/// Pass 1 matches every context URL in the CDP frame tree against the
/// markers. Pass 2 scans DOM iframes (first 50) by `src`/`title` and maps a
/// hit back to its frame-tree entry. Returns `None` when neither pass
/// matches; that is a degraded outcome, not an error.
pub async fn find_report_frame(page: &Page, markers: &[String]) -> Result<Option<FrameContext>> {
    let tree = page
        .execute(GetFrameTreeParams::default())
        .await
        .context("reading frame tree")?;
    let mut frames = Vec::new();
    flatten_tree(&tree.frame_tree, &mut frames);

    for (index, (frame_id, url)) in frames.iter().enumerate() {
        if markers.iter().any(|m| url.contains(m.as_str())) {
            tracing::debug!(%url, "report frame matched by context url");
            return Ok(Some(if index == 0 {
                FrameContext::main(page.clone())
            } else {
                FrameContext::child(page.clone(), frame_id.clone())
            }));
        }
    }

    let scan = format!(
        "({IFRAME_SCAN_JS})({})",
        serde_json::to_string(markers).unwrap_or_else(|_| "[]".into())
    );
    let matched_src = FrameContext::main(page.clone())
        .eval(scan)
        .await
        .unwrap_or(serde_json::Value::Null);
    if let Some(src) = matched_src.as_str() {
        let src = src.to_lowercase();
        for (frame_id, url) in frames.iter().skip(1) {
            if frame_urls_match(url, &src) {
                tracing::debug!(%url, "report frame matched by iframe attributes");
                return Ok(Some(FrameContext::child(page.clone(), frame_id.clone())));
            }
        }
    }

    Ok(None)
}

/// Containment match between a frame-tree URL and a scanned iframe `src`.
/// An empty side never matches: a title-only iframe hit reports `src = ""`,
/// which must not resolve to an arbitrary frame.
fn frame_urls_match(url: &str, src: &str) -> bool {
    !url.is_empty() && !src.is_empty() && (url == src || url.contains(src) || src.contains(url))
}
