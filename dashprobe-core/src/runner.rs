//! Task orchestration: resolve collector, collect, extract, validate,
//! assemble one result record per task.

use crate::collect::browser::{BrowserCollector, BrowserCollectorConfig};
use crate::collect::http::{HttpCollector, HttpCollectorConfig};
use crate::collect::screen::{ScreenCollector, ScreenCollectorConfig};
use crate::collect::Collector;
use crate::error::{Error, Result};
use crate::extract::extract_value;
use crate::model::{CollectResponse, Payload, ResultRecord, Task};
use crate::validate::evaluate_all;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct RunnerConfig {
    pub http: HttpCollectorConfig,
    pub browser: BrowserCollectorConfig,
    pub screen: ScreenCollectorConfig,
}

/// Dispatches tasks to registered collectors, strictly sequentially.
pub struct Runner {
    collectors: HashMap<String, Arc<dyn Collector>>,
    /// Collectors whose capability check failed at construction, with the
    /// reason; a task naming one fails with `DependencyMissing`.
    disabled: HashMap<String, String>,
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Result<Self> {
        let mut collectors: HashMap<String, Arc<dyn Collector>> = HashMap::new();
        let mut disabled = HashMap::new();

        collectors.insert("http".into(), Arc::new(HttpCollector::new(config.http)?));
        collectors.insert(
            "browser".into(),
            Arc::new(BrowserCollector::new(config.browser)),
        );
        match ScreenCollector::new(config.screen) {
            Ok(screen) => {
                collectors.insert("screen".into(), Arc::new(screen));
            }
            Err(err) => {
                tracing::debug!(%err, "screen collector disabled");
                disabled.insert("screen".into(), err.to_string());
            }
        }

        Ok(Self {
            collectors,
            disabled,
        })
    }

    /// Register or replace a collector under a name.
    pub fn register(&mut self, name: impl Into<String>, collector: Arc<dyn Collector>) {
        self.collectors.insert(name.into(), collector);
    }

    /// Execute one task end to end.
    ///
    /// Upstream failures degrade the record (null value, condition recorded
    /// in metadata); configuration and dependency problems are returned as
    /// errors for the caller to report.
    pub async fn run_task(&self, task: &Task) -> Result<ResultRecord> {
        let collector = match self.collectors.get(&task.collector) {
            Some(c) => Arc::clone(c),
            None => {
                if let Some(reason) = self.disabled.get(&task.collector) {
                    return Err(Error::DependencyMissing(reason.clone()));
                }
                return Err(Error::CollectorNotRegistered(task.collector.clone()));
            }
        };

        tracing::info!(task = %task.id, collector = %task.collector, "collecting");
        let response = match collector.collect(&task.request).await {
            Ok(response) => response,
            Err(Error::Upstream(message)) => {
                tracing::error!(task = %task.id, %message, "upstream failure, degrading task");
                let mut meta = serde_json::Map::new();
                meta.insert("upstream_error".into(), message.into());
                CollectResponse {
                    payload: Payload::Empty,
                    value: None,
                    meta,
                }
            }
            Err(other) => return Err(other),
        };

        let value = match response.value.clone() {
            Some(pre_extracted) => Some(pre_extracted),
            None => extract_value(&response.payload, &task.extraction)?,
        };

        let (ok, validations) = evaluate_all(value.as_deref(), &task.rules);

        Ok(ResultRecord {
            task_id: task.id.clone(),
            ok,
            value,
            validations,
            meta: response.meta,
        })
    }
}
