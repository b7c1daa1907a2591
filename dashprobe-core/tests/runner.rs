//! End-to-end runner behavior with stub collectors.

use async_trait::async_trait;
use dashprobe_core::collect::Collector;
use dashprobe_core::error::{Error, Result};
use dashprobe_core::model::{
    CollectRequest, CollectResponse, ExtractionSpec, Payload, Task, ValidationRule,
};
use dashprobe_core::{Runner, RunnerConfig};
use std::sync::Arc;

struct StaticCollector {
    body: &'static str,
}

#[async_trait]
impl Collector for StaticCollector {
    async fn collect(&self, _request: &CollectRequest) -> Result<CollectResponse> {
        let mut meta = serde_json::Map::new();
        meta.insert("engine".into(), "static".into());
        Ok(CollectResponse {
            payload: Payload::text(self.body),
            value: None,
            meta,
        })
    }
}

struct FailingCollector;

#[async_trait]
impl Collector for FailingCollector {
    async fn collect(&self, _request: &CollectRequest) -> Result<CollectResponse> {
        Err(Error::Upstream("host unreachable".into()))
    }
}

fn runner_with(name: &str, collector: Arc<dyn Collector>) -> Runner {
    let mut runner = Runner::new(RunnerConfig::default()).unwrap();
    runner.register(name, collector);
    runner
}

fn task(collector: &str, extraction: ExtractionSpec, rules: Vec<ValidationRule>) -> Task {
    Task {
        id: "t1".into(),
        collector: collector.into(),
        request: CollectRequest::new("https://example.com/"),
        extraction,
        rules,
    }
}

#[tokio::test]
async fn none_strategy_without_rules_is_ok_with_null_value() {
    let runner = runner_with("static", Arc::new(StaticCollector { body: "<html/>" }));
    let record = runner
        .run_task(&task("static", ExtractionSpec::None, vec![]))
        .await
        .unwrap();
    assert!(record.ok);
    assert_eq!(record.value, None);
    assert!(record.validations.is_empty());
    assert_eq!(record.meta["engine"], "static");
}

#[tokio::test]
async fn pattern_extraction_feeds_validation() {
    let runner = runner_with(
        "static",
        Arc::new(StaticCollector {
            body: "preço: R$ 1.300,00",
        }),
    );
    let record = runner
        .run_task(&task(
            "static",
            ExtractionSpec::Pattern {
                pattern: r"preço:\s*(R\$\s*[\d.,]+)".into(),
            },
            vec![ValidationRule::Tolerance {
                target: 1299.90,
                pct: 0.05,
            }],
        ))
        .await
        .unwrap();
    assert!(record.ok, "validations: {:?}", record.validations);
    assert_eq!(record.value.as_deref(), Some("R$ 1.300,00"));
    assert_eq!(record.validations.len(), 1);
}

#[tokio::test]
async fn failing_rule_fails_the_record_but_not_the_run() {
    let runner = runner_with("static", Arc::new(StaticCollector { body: "total 9" }));
    let record = runner
        .run_task(&task(
            "static",
            ExtractionSpec::Pattern {
                pattern: r"total (\d+)".into(),
            },
            vec![ValidationRule::Range {
                min: Some(10.0),
                max: None,
            }],
        ))
        .await
        .unwrap();
    assert!(!record.ok);
    assert_eq!(record.value.as_deref(), Some("9"));
}

#[tokio::test]
async fn unsupported_rule_is_reported_not_raised() {
    let runner = runner_with("static", Arc::new(StaticCollector { body: "x" }));
    let record = runner
        .run_task(&task(
            "static",
            ExtractionSpec::None,
            vec![ValidationRule::Unsupported {
                kind: "checksum".into(),
            }],
        ))
        .await
        .unwrap();
    assert!(!record.ok);
    assert_eq!(record.validations[0].rule, "checksum");
}

#[tokio::test]
async fn unknown_collector_is_an_error() {
    let runner = Runner::new(RunnerConfig::default()).unwrap();
    let err = runner
        .run_task(&task("carrier-pigeon", ExtractionSpec::None, vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CollectorNotRegistered(name) if name == "carrier-pigeon"));
}

#[tokio::test]
async fn upstream_failure_degrades_the_record() {
    let runner = runner_with("flaky", Arc::new(FailingCollector));
    let record = runner
        .run_task(&task(
            "flaky",
            ExtractionSpec::Pattern {
                pattern: r"(\d+)".into(),
            },
            vec![ValidationRule::Regex {
                pattern: r"\d".into(),
            }],
        ))
        .await
        .unwrap();
    assert!(!record.ok);
    assert_eq!(record.value, None);
    assert!(record.meta["upstream_error"]
        .as_str()
        .unwrap()
        .contains("host unreachable"));
}

#[tokio::test]
async fn unsupported_extraction_strategy_is_task_fatal() {
    let runner = runner_with("static", Arc::new(StaticCollector { body: "x" }));
    let err = runner
        .run_task(&task(
            "static",
            ExtractionSpec::Other {
                kind: "xpath".into(),
            },
            vec![],
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedStrategy(k) if k == "xpath"));
}

#[tokio::test]
async fn pre_extracted_value_short_circuits_extraction() {
    struct PreExtracted;
    #[async_trait]
    impl Collector for PreExtracted {
        async fn collect(&self, _request: &CollectRequest) -> Result<CollectResponse> {
            Ok(CollectResponse {
                payload: Payload::Empty,
                value: Some("42".into()),
                meta: serde_json::Map::new(),
            })
        }
    }
    let runner = runner_with("pre", Arc::new(PreExtracted));
    let record = runner
        .run_task(&task(
            "pre",
            ExtractionSpec::None,
            vec![ValidationRule::Equals {
                expected: serde_json::json!("42"),
            }],
        ))
        .await
        .unwrap();
    assert!(record.ok);
    assert_eq!(record.value.as_deref(), Some("42"));
}
