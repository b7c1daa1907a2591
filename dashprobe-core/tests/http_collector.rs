//! HTTP collector behavior against a local mock server.

use dashprobe_core::collect::http::{HttpCollector, HttpCollectorConfig};
use dashprobe_core::collect::Collector;
use dashprobe_core::error::Error;
use dashprobe_core::model::CollectRequest;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn successful_request_yields_text_payload_and_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/price"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<span id='p'>42</span>"))
        .mount(&server)
        .await;

    let collector = HttpCollector::new(HttpCollectorConfig::default()).unwrap();
    let request = CollectRequest::new(format!("{}/price", server.uri()));
    let response = collector.collect(&request).await.unwrap();

    assert_eq!(response.meta["status"], 200);
    assert_eq!(response.meta["engine"], "http");
    assert!(response
        .payload
        .as_text()
        .unwrap()
        .contains("<span id='p'>42</span>"));
}

#[tokio::test]
async fn non_success_status_is_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let collector = HttpCollector::new(HttpCollectorConfig::default()).unwrap();
    let request = CollectRequest::new(format!("{}/broken", server.uri()));
    let err = collector.collect(&request).await.unwrap_err();
    assert!(matches!(err, Error::Upstream(_)), "got: {err}");
}

#[tokio::test]
async fn invalid_method_is_config_error() {
    let collector = HttpCollector::new(HttpCollectorConfig::default()).unwrap();
    let mut request = CollectRequest::new("http://localhost/ignored");
    request.method = "NOT A METHOD".into();
    let err = collector.collect(&request).await.unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[tokio::test]
async fn unreachable_host_is_upstream_error() {
    let collector = HttpCollector::new(HttpCollectorConfig {
        timeout_secs: 2,
        ..HttpCollectorConfig::default()
    })
    .unwrap();
    // Reserved TEST-NET-1 address, nothing listens there.
    let request = CollectRequest::new("http://192.0.2.1:9/");
    let err = collector.collect(&request).await.unwrap_err();
    assert!(matches!(err, Error::Upstream(_)));
}
