//! Login automation against a form whose markup is unknown in advance.
//!
//! Field location and submission are ordered cascades of candidate
//! strategies, expressed as data and tried until one succeeds. A candidate
//! failing is expected, logged at trace level and never raised; only
//! exhaustion of the whole cascade is reported. "Submission executed" is
//! recorded separately from "credentials accepted": the post-login
//! settlement check and failure-message scan are the authentication signal.

use crate::collect::browser::frames::{all_contexts, FrameContext};
use crate::collect::browser::session::{wait_for_quiescence, Session};
use crate::error::Result;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType,
};
use serde::Serialize;
use serde_json::json;
use std::time::Duration;

/// Site-specific selector overrides, injected via configuration.
#[derive(Debug, Clone)]
pub struct LoginSelectors {
    pub username: Option<String>,
    pub password: Option<String>,
    pub submit: Option<String>,
    /// Legacy postback target name. The strategy is skipped when unset.
    pub postback_target: Option<String>,
    pub failure_message: String,
}

impl Default for LoginSelectors {
    fn default() -> Self {
        Self {
            username: Some("#lgnCredencial_UserName".into()),
            password: Some("#lgnCredencial_Password".into()),
            submit: Some("#lgnCredencial_LoginButton".into()),
            postback_target: None,
            failure_message:
                "#lgnCredencial_FailureText, .validation-summary-errors, [id*=\"FailureText\"]"
                    .into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Progress of the login attempt. Failure to advance never aborts the
/// pipeline; a persisted session may already be authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginStage {
    NotAttempted,
    FieldsLocated,
    Submitted,
    Settled,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginReport {
    pub stage: LoginStage,
    pub submit_strategy: Option<&'static str>,
    pub failure_message: Option<String>,
}

/// One way of locating an input field.
#[derive(Debug, Clone)]
pub enum FieldCandidate {
    /// Structural CSS selector.
    Css(String),
    /// Placeholder / accessible-label / label text, matched case-insensitively.
    Hint(String),
}

/// Localized label texts tried for the username field.
const USERNAME_HINTS: &[&str] = &["Login", "Usuário", "E-mail", "Username", "User name"];
/// Localized label texts tried for the password field.
const PASSWORD_HINTS: &[&str] = &["Senha", "Password"];
/// Localized submit-control texts.
const SUBMIT_TEXTS: &[&str] = &["Entrar", "Acessar", "Login", "Sign in"];

const GENERIC_SUBMIT_SELECTORS: &str = "input[type=\"submit\"], input[type=\"image\"], \
     button[type=\"submit\"], [id$=\"LoginButton\"], [name$=\"LoginButton\"]";

/// Ordered cascade for the username field: exact site selector, localized
/// hints, attribute suffixes, attribute substrings, generic input types.
pub fn username_candidates(selectors: &LoginSelectors) -> Vec<FieldCandidate> {
    let mut out = Vec::new();
    if let Some(known) = &selectors.username {
        out.push(FieldCandidate::Css(known.clone()));
    }
    out.extend(USERNAME_HINTS.iter().map(|h| FieldCandidate::Hint((*h).into())));
    for sel in ["input[id$=\"UserName\"]", "input[name$=\"UserName\"]"] {
        out.push(FieldCandidate::Css(sel.into()));
    }
    for sel in [
        "input[name=\"username\"]",
        "input[id=\"username\"]",
        "input[type=\"email\"]",
        "input[type=\"text\"]:not([hidden])",
        "input[name*=\"user\" i]",
        "input[id*=\"user\" i]",
        "input[name*=\"login\" i]",
        "input[id*=\"login\" i]",
        "input:not([type]):not([hidden])",
    ] {
        out.push(FieldCandidate::Css(sel.into()));
    }
    out
}

/// Ordered cascade for the password field.
pub fn password_candidates(selectors: &LoginSelectors) -> Vec<FieldCandidate> {
    let mut out = Vec::new();
    if let Some(known) = &selectors.password {
        out.push(FieldCandidate::Css(known.clone()));
    }
    out.extend(PASSWORD_HINTS.iter().map(|h| FieldCandidate::Hint((*h).into())));
    for sel in ["input[id$=\"Password\"]", "input[name$=\"Password\"]"] {
        out.push(FieldCandidate::Css(sel.into()));
    }
    for sel in [
        "input[name=\"password\"]",
        "input[id=\"password\"]",
        "input[type=\"password\"]",
        "input[name*=\"senha\" i]",
        "input[id*=\"senha\" i]",
        "input[name*=\"pass\" i]",
        "input[id*=\"pass\" i]",
    ] {
        out.push(FieldCandidate::Css(sel.into()));
    }
    out
}

/// Finds one candidate element, checks visibility and fills it (overwrite
/// semantics, with input/change events so framework bindings notice).
const FILL_JS: &str = r#"
(spec) => {
    const visible = (el) =>
        !!el && !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length);
    let el = null;
    if (spec.kind === 'css') {
        el = document.querySelector(spec.query);
    } else {
        const text = spec.query.toLowerCase();
        el = Array.from(document.querySelectorAll('input, textarea')).find((i) => {
            const ph = (i.getAttribute('placeholder') || '').toLowerCase();
            const al = (i.getAttribute('aria-label') || '').toLowerCase();
            let lbl = '';
            if (i.id) {
                const l = document.querySelector('label[for="' + i.id + '"]');
                if (l) lbl = (l.textContent || '').toLowerCase();
            }
            return ph.includes(text) || al.includes(text) || lbl.includes(text);
        }) || null;
    }
    if (!visible(el)) return false;
    const proto = el instanceof HTMLTextAreaElement
        ? HTMLTextAreaElement.prototype
        : HTMLInputElement.prototype;
    Object.getOwnPropertyDescriptor(proto, 'value').set.call(el, spec.value);
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
    return true;
}
"#;

/// Try the cascade in order; first successful fill wins.
pub async fn fill_field(
    ctx: &FrameContext,
    candidates: &[FieldCandidate],
    value: &str,
) -> bool {
    for candidate in candidates {
        let spec = match candidate {
            FieldCandidate::Css(query) => json!({ "kind": "css", "query": query, "value": value }),
            FieldCandidate::Hint(query) => {
                json!({ "kind": "hint", "query": query, "value": value })
            }
        };
        let js = format!("({FILL_JS})({spec})");
        match ctx.eval(js).await {
            Ok(serde_json::Value::Bool(true)) => {
                tracing::debug!(?candidate, "field filled");
                return true;
            }
            Ok(_) => {}
            Err(err) => tracing::trace!(?candidate, %err, "fill candidate errored"),
        }
    }
    false
}

const CLICK_SELECTOR_JS: &str = r#"
(selector) => {
    const visible = (el) =>
        !!el && !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length);
    const el = Array.from(document.querySelectorAll(selector)).find(visible);
    if (!el) return false;
    el.click();
    return true;
}
"#;

const CLICK_TEXT_JS: &str = r#"
(texts) => {
    const visible = (el) =>
        !!el && !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length);
    const wanted = texts.map((t) => t.toLowerCase());
    const el = Array.from(document.querySelectorAll('button, a, input[type="button"]')).find(
        (n) => {
            if (!visible(n)) return false;
            const label = ((n.textContent || '') + ' ' + (n.value || '')).toLowerCase();
            return wanted.some((t) => label.includes(t));
        },
    );
    if (!el) return false;
    el.click();
    return true;
}
"#;

const FORM_SUBMIT_JS: &str = r#"
(pwdSelector) => {
    const pwd = document.querySelector(pwdSelector) ||
        document.querySelector('input[type="password"]');
    const form = pwd && (pwd.form || pwd.closest('form'));
    if (!form) return false;
    form.submit();
    return true;
}
"#;

const POSTBACK_JS: &str = r#"
(target) => {
    if (typeof window.__doPostBack !== 'function') return false;
    window.__doPostBack(target, '');
    return true;
}
"#;

const FOCUS_PASSWORD_JS: &str = r#"
(pwdSelector) => {
    const pwd = document.querySelector(pwdSelector) ||
        document.querySelector('input[type="password"]');
    if (!pwd) return false;
    pwd.focus();
    return true;
}
"#;

/// One submission strategy. Execution success means the strategy ran, not
/// that the credential was accepted.
#[derive(Debug, Clone)]
pub enum SubmitStrategy {
    KnownControl(String),
    GenericControls,
    ButtonTexts,
    FormSubmit,
    Postback(String),
    EnterKey,
}

impl SubmitStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            SubmitStrategy::KnownControl(_) => "known_control",
            SubmitStrategy::GenericControls => "generic_controls",
            SubmitStrategy::ButtonTexts => "button_text",
            SubmitStrategy::FormSubmit => "form_submit",
            SubmitStrategy::Postback(_) => "postback",
            SubmitStrategy::EnterKey => "enter_key",
        }
    }
}

/// Ordered submission plan. The postback strategy only appears when a
/// target name is configured.
pub fn submit_plan(selectors: &LoginSelectors) -> Vec<SubmitStrategy> {
    let mut plan = Vec::new();
    if let Some(known) = &selectors.submit {
        plan.push(SubmitStrategy::KnownControl(known.clone()));
    }
    plan.push(SubmitStrategy::GenericControls);
    plan.push(SubmitStrategy::ButtonTexts);
    plan.push(SubmitStrategy::FormSubmit);
    if let Some(target) = &selectors.postback_target {
        plan.push(SubmitStrategy::Postback(target.clone()));
    }
    plan.push(SubmitStrategy::EnterKey);
    plan
}

async fn press_enter(session: &Session) -> Result<()> {
    for event_type in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
        let mut params = DispatchKeyEventParams::new(event_type);
        params.key = Some("Enter".to_string());
        params.code = Some("Enter".to_string());
        params.windows_virtual_key_code = Some(13);
        session
            .page()
            .execute(params)
            .await
            .map_err(|e| anyhow::anyhow!("dispatching Enter: {e}"))?;
    }
    Ok(())
}

async fn try_strategy(
    session: &Session,
    ctx: &FrameContext,
    selectors: &LoginSelectors,
    strategy: &SubmitStrategy,
) -> bool {
    let password_selector = selectors
        .password
        .clone()
        .unwrap_or_else(|| "input[type=\"password\"]".into());
    let result = match strategy {
        SubmitStrategy::KnownControl(sel) => {
            ctx.eval(format!("({CLICK_SELECTOR_JS})({})", json!(sel))).await
        }
        SubmitStrategy::GenericControls => {
            ctx.eval(format!(
                "({CLICK_SELECTOR_JS})({})",
                json!(GENERIC_SUBMIT_SELECTORS)
            ))
            .await
        }
        SubmitStrategy::ButtonTexts => {
            ctx.eval(format!("({CLICK_TEXT_JS})({})", json!(SUBMIT_TEXTS))).await
        }
        SubmitStrategy::FormSubmit => {
            ctx.eval(format!("({FORM_SUBMIT_JS})({})", json!(password_selector)))
                .await
        }
        SubmitStrategy::Postback(target) => {
            ctx.eval(format!("({POSTBACK_JS})({})", json!(target))).await
        }
        SubmitStrategy::EnterKey => {
            let focused = ctx
                .eval(format!("({FOCUS_PASSWORD_JS})({})", json!(password_selector)))
                .await;
            match focused {
                Ok(serde_json::Value::Bool(true)) => match press_enter(session).await {
                    Ok(()) => Ok(serde_json::Value::Bool(true)),
                    Err(err) => Err(err),
                },
                other => other,
            }
        }
    };
    match result {
        Ok(serde_json::Value::Bool(true)) => true,
        Ok(_) => false,
        Err(err) => {
            tracing::trace!(strategy = strategy.name(), %err, "submit strategy errored");
            false
        }
    }
}

async fn scan_failure_message(ctx: &FrameContext, selector: &str) -> Option<String> {
    const SCAN_JS: &str = r#"
(selector) => {
    const visible = (el) =>
        !!el && !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length);
    const el = document.querySelector(selector);
    if (!visible(el)) return null;
    const text = (el.textContent || '').trim();
    return text || null;
}
"#;
    ctx.eval(format!("({SCAN_JS})({})", json!(selector)))
        .await
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
}

/// Drive the login flow: navigate, locate and fill both credential fields
/// (main document first, nested frames after), submit via the cascade, wait
/// for settlement and scan for a failure message.
pub async fn perform_login(
    session: &Session,
    login_url: &str,
    credentials: &Credentials,
    selectors: &LoginSelectors,
    nav_timeout_ms: u64,
    settle_timeout_ms: u64,
) -> Result<LoginReport> {
    tracing::info!(url = login_url, "navigating to login page");
    session.navigate(login_url, nav_timeout_ms).await?;
    session.save_snapshot("login_page").await;

    let username_plan = username_candidates(selectors);
    let password_plan = password_candidates(selectors);

    let mut report = LoginReport {
        stage: LoginStage::NotAttempted,
        submit_strategy: None,
        failure_message: None,
    };

    // Main context fully (both fields) before any nested context.
    let mut filled_ctx: Option<FrameContext> = None;
    for ctx in all_contexts(session.page()).await? {
        let user_ok = fill_field(&ctx, &username_plan, &credentials.username).await;
        let pass_ok = fill_field(&ctx, &password_plan, &credentials.password).await;
        if user_ok && pass_ok {
            filled_ctx = Some(ctx);
            break;
        }
    }

    if let Some(ctx) = &filled_ctx {
        report.stage = LoginStage::FieldsLocated;
        tokio::time::sleep(Duration::from_millis(250)).await;

        for strategy in submit_plan(selectors) {
            if try_strategy(session, ctx, selectors, &strategy).await {
                tracing::debug!(strategy = strategy.name(), "submit strategy executed");
                report.stage = LoginStage::Submitted;
                report.submit_strategy = Some(strategy.name());
                break;
            }
        }
        if report.stage != LoginStage::Submitted {
            tracing::warn!("no submit strategy executed");
        }
    } else {
        tracing::warn!("credential fields not located; proceeding, session may already be authenticated");
    }

    if wait_for_quiescence(session.page(), settle_timeout_ms).await {
        if report.stage == LoginStage::Submitted {
            report.stage = LoginStage::Settled;
        }
    } else {
        tracing::warn!("page did not settle after login attempt");
    }

    let main = FrameContext::main(session.page().clone());
    report.failure_message = scan_failure_message(&main, &selectors.failure_message).await;
    if let Some(message) = &report.failure_message {
        tracing::warn!(%message, "login form reported an error");
    }

    if let Some(url) = session.current_url().await {
        tracing::info!(%url, stage = ?report.stage, "login attempt finished");
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_cascade_starts_exact_and_ends_generic() {
        let plan = username_candidates(&LoginSelectors::default());
        assert!(matches!(
            &plan[0],
            FieldCandidate::Css(sel) if sel == "#lgnCredencial_UserName"
        ));
        assert!(matches!(
            plan.last().unwrap(),
            FieldCandidate::Css(sel) if sel == "input:not([type]):not([hidden])"
        ));
        // Localized hints come before attribute-suffix selectors.
        let hint_pos = plan
            .iter()
            .position(|c| matches!(c, FieldCandidate::Hint(h) if h == "Usuário"))
            .unwrap();
        let suffix_pos = plan
            .iter()
            .position(|c| matches!(c, FieldCandidate::Css(s) if s.contains("id$=")))
            .unwrap();
        assert!(hint_pos < suffix_pos);
    }

    #[test]
    fn password_cascade_includes_generic_type_selector() {
        let plan = password_candidates(&LoginSelectors::default());
        assert!(plan
            .iter()
            .any(|c| matches!(c, FieldCandidate::Css(s) if s == "input[type=\"password\"]")));
    }

    #[test]
    fn cascade_without_known_selector_still_has_fallbacks() {
        let selectors = LoginSelectors {
            username: None,
            password: None,
            submit: None,
            postback_target: None,
            failure_message: String::new(),
        };
        let plan = password_candidates(&selectors);
        assert!(!plan.is_empty());
        assert!(matches!(&plan[0], FieldCandidate::Hint(_)));
    }

    #[test]
    fn postback_strategy_only_when_configured() {
        let without = submit_plan(&LoginSelectors::default());
        assert!(!without
            .iter()
            .any(|s| matches!(s, SubmitStrategy::Postback(_))));

        let with = submit_plan(&LoginSelectors {
            postback_target: Some("lgnCredencial$LoginButton".into()),
            ..LoginSelectors::default()
        });
        let postback_pos = with
            .iter()
            .position(|s| matches!(s, SubmitStrategy::Postback(_)))
            .unwrap();
        let enter_pos = with
            .iter()
            .position(|s| matches!(s, SubmitStrategy::EnterKey))
            .unwrap();
        assert!(postback_pos < enter_pos);
        assert!(matches!(with[0], SubmitStrategy::KnownControl(_)));
    }
}
