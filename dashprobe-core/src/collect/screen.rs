//! Desktop screen capture via an external command.
//!
//! The capture facility is injected through configuration and checked at
//! construction time; an unset command is a missing dependency, not a
//! mid-task surprise.

use crate::collect::Collector;
use crate::error::{Error, Result};
use crate::model::{CollectRequest, CollectResponse, Payload};
use async_trait::async_trait;
use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct ScreenCollectorConfig {
    /// Command line that writes a PNG. `{out}` is replaced by the output
    /// path; when absent the path is appended as the last argument.
    pub capture_command: Option<String>,
    pub output_dir: PathBuf,
}

#[derive(Debug)]
pub struct ScreenCollector {
    command: String,
    output_dir: PathBuf,
}

impl ScreenCollector {
    pub fn new(config: ScreenCollectorConfig) -> Result<Self> {
        let command = config.capture_command.ok_or_else(|| {
            Error::DependencyMissing("no screen capture command configured".into())
        })?;
        if command.trim().is_empty() {
            return Err(Error::DependencyMissing(
                "screen capture command is empty".into(),
            ));
        }
        Ok(Self {
            command,
            output_dir: config.output_dir,
        })
    }
}

#[async_trait]
impl Collector for ScreenCollector {
    async fn collect(&self, _request: &CollectRequest) -> Result<CollectResponse> {
        std::fs::create_dir_all(&self.output_dir)?;
        let out = self.output_dir.join(format!(
            "screen_{}.png",
            chrono::Utc::now().format("%Y%m%dT%H%M%S")
        ));
        let out_str = out.to_string_lossy().into_owned();

        let mut parts = self.command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| Error::DependencyMissing("screen capture command is empty".into()))?;
        let mut args: Vec<String> = parts.collect();
        if args.iter().any(|a| a.contains("{out}")) {
            for arg in &mut args {
                *arg = arg.replace("{out}", &out_str);
            }
        } else {
            args.push(out_str.clone());
        }

        let status = tokio::process::Command::new(&program)
            .args(&args)
            .status()
            .await
            .map_err(|e| Error::DependencyMissing(format!("running '{program}': {e}")))?;
        if !status.success() {
            return Err(Error::Upstream(format!(
                "screen capture command exited with {status}"
            )));
        }

        let mut meta = serde_json::Map::new();
        meta.insert("engine".into(), "screen".into());
        meta.insert("path".into(), out_str.into());

        Ok(CollectResponse {
            payload: Payload::Image { path: out },
            value: None,
            meta,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_command_is_missing_dependency() {
        let err = ScreenCollector::new(ScreenCollectorConfig::default()).unwrap_err();
        assert!(matches!(err, Error::DependencyMissing(_)));
    }
}
