//! Integration tests driving a real headless Chrome/Chromium over CDP.
//!
//! They are `#[ignore]` by default because they require a Chrome/Chromium
//! binary installed. Pages are served as `data:` URLs so no network access
//! is needed.
//!
//! Run with:
//!   cargo test -p dashprobe-core --test browser_flows -- --ignored

use dashprobe_core::collect::browser::frames::{all_contexts, FrameContext};
use dashprobe_core::collect::browser::login::{
    fill_field, password_candidates, username_candidates, Credentials, LoginSelectors, LoginStage,
};
use dashprobe_core::collect::browser::session::{Session, SessionConfig};
use dashprobe_core::collect::browser::table::{extract_table, wait_for_table_root};

fn data_url(html: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(html.as_bytes()).collect();
    format!("data:text/html,{encoded}")
}

async fn session_in(dir: &tempfile::TempDir) -> Session {
    Session::launch(&SessionConfig {
        headless: true,
        debug_dir: dir.path().join("debug"),
        ..SessionConfig::default()
    })
    .await
    .expect("browser launch")
}

#[tokio::test]
#[ignore]
async fn password_only_form_is_still_filled_by_the_cascade() {
    let dir = tempfile::tempdir().unwrap();
    let session = session_in(&dir).await;

    // No id, no name: only the generic type selector can find this field.
    let page = data_url("<html><body><form><input type='password'></form></body></html>");
    session.navigate(&page, 30_000).await.unwrap();

    let ctx = FrameContext::main(session.page().clone());
    let plan = password_candidates(&LoginSelectors::default());
    assert!(fill_field(&ctx, &plan, "s3cret").await);

    let value = ctx
        .eval("document.querySelector('input[type=\"password\"]').value".to_string())
        .await
        .unwrap();
    assert_eq!(value.as_str(), Some("s3cret"));

    session.close().await;
}

#[tokio::test]
#[ignore]
async fn hinted_field_is_found_by_placeholder() {
    let dir = tempfile::tempdir().unwrap();
    let session = session_in(&dir).await;

    let page = data_url(
        "<html><body><form>\
         <input type='text' placeholder='Digite seu usuário'>\
         </form></body></html>",
    );
    session.navigate(&page, 30_000).await.unwrap();

    let ctx = FrameContext::main(session.page().clone());
    let plan = username_candidates(&LoginSelectors {
        username: None,
        ..LoginSelectors::default()
    });
    assert!(fill_field(&ctx, &plan, "alice").await);

    let value = ctx
        .eval("document.querySelector('input').value".to_string())
        .await
        .unwrap();
    assert_eq!(value.as_str(), Some("alice"));

    session.close().await;
}

#[tokio::test]
#[ignore]
async fn login_settles_even_without_a_form() {
    let dir = tempfile::tempdir().unwrap();
    let session = session_in(&dir).await;

    let page = data_url("<html><body><p>already signed in</p></body></html>");
    let report = dashprobe_core::collect::browser::login::perform_login(
        &session,
        &page,
        &Credentials {
            username: "alice".into(),
            password: "s3cret".into(),
        },
        &LoginSelectors::default(),
        30_000,
        10_000,
    )
    .await
    .unwrap();

    // No fields located, nothing submitted, no failure message scraped.
    assert_eq!(report.stage, LoginStage::NotAttempted);
    assert!(report.failure_message.is_none());

    session.close().await;
}

#[tokio::test]
#[ignore]
async fn child_frame_evaluation_sees_the_frame_document() {
    let dir = tempfile::tempdir().unwrap();
    let session = session_in(&dir).await;

    let page = data_url(
        "<html><body><p>outer</p>\
         <iframe srcdoc=\"<p id='inner'>inner text</p>\"></iframe>\
         </body></html>",
    );
    session.navigate(&page, 30_000).await.unwrap();

    let contexts = all_contexts(session.page()).await.unwrap();
    assert!(contexts.len() >= 2, "expected a nested frame context");

    let child = contexts.into_iter().find(|c| !c.is_main()).unwrap();
    let text = child
        .eval("document.body.textContent".to_string())
        .await
        .unwrap();
    assert!(text.as_str().unwrap().contains("inner text"));

    session.close().await;
}

#[tokio::test]
#[ignore]
async fn semantic_table_is_extracted_from_grid_roles() {
    let dir = tempfile::tempdir().unwrap();
    let session = session_in(&dir).await;

    let page = data_url(
        "<html><body><div role='grid'>\
         <div role='row'><span role='columnheader'>Mês</span>\
         <span role='columnheader'>Valor</span></div>\
         <div role='row'><span role='gridcell'>Jan/23</span>\
         <span role='gridcell'>100</span></div>\
         <div role='row'><span role='gridcell'>Fev/23</span>\
         <span role='gridcell'>200</span></div>\
         </div></body></html>",
    );
    session.navigate(&page, 30_000).await.unwrap();

    let ctx = FrameContext::main(session.page().clone());
    assert!(wait_for_table_root(&ctx, 10_000).await);

    let data = extract_table(&ctx).await.unwrap();
    assert_eq!(data.headers, vec!["Mês", "Valor"]);
    assert!(data
        .rows
        .contains(&vec!["Jan/23".to_string(), "100".to_string()]));

    session.close().await;
}

#[tokio::test]
#[ignore]
async fn visual_container_fallback_segments_rows() {
    let dir = tempfile::tempdir().unwrap();
    let session = session_in(&dir).await;

    let page = data_url(
        "<html><body><div data-automationid='visualContainer'>\
         <span>Jan/23</span><span>100</span>\
         <span>Fev/23</span><span>200</span>\
         </div></body></html>",
    );
    session.navigate(&page, 30_000).await.unwrap();

    let ctx = FrameContext::main(session.page().clone());
    assert!(wait_for_table_root(&ctx, 10_000).await);

    let data = extract_table(&ctx).await.unwrap();
    assert!(data.headers.is_empty());
    assert_eq!(
        data.rows,
        vec![
            vec!["Jan/23".to_string(), "100".to_string()],
            vec!["Fev/23".to_string(), "200".to_string()],
        ]
    );

    session.close().await;
}
