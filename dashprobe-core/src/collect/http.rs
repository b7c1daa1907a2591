//! Synchronous request/response collection over HTTP.

use crate::collect::Collector;
use crate::error::{Error, Result};
use crate::model::{CollectRequest, CollectResponse, Payload};
use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpCollectorConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpCollectorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 25,
            user_agent: format!("dashprobe/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

pub struct HttpCollector {
    client: reqwest::Client,
}

impl HttpCollector {
    pub fn new(config: HttpCollectorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent)
            .build()
            .map_err(|e| anyhow::anyhow!("building http client: {e}"))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Collector for HttpCollector {
    async fn collect(&self, request: &CollectRequest) -> Result<CollectResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| Error::Config(format!("invalid http method '{}'", request.method)))?;

        let response = self
            .client
            .request(method, &request.source)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("request to {} failed: {e}", request.source)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Upstream(format!(
                "{} returned HTTP {status}",
                request.source
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Upstream(format!("reading body from {}: {e}", request.source)))?;

        let mut meta = serde_json::Map::new();
        meta.insert("engine".into(), "http".into());
        meta.insert("status".into(), status.as_u16().into());

        Ok(CollectResponse {
            payload: Payload::text(body),
            value: None,
            meta,
        })
    }
}
