//! Error taxonomy shared by collectors, extraction and the runner.
//!
//! Only `Config`, `DependencyMissing` and `CollectorNotRegistered` abort a
//! task before/without I/O. `Upstream` degrades the task's value to null and
//! is recorded in metadata; extraction misses and validation failures are
//! reported per tab/rule and never raised.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or missing configuration. Fatal to the affected task,
    /// raised before any I/O happens.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A required external capability (browser binary, capture command,
    /// spreadsheet writer) is not available.
    #[error("missing dependency: {0}")]
    DependencyMissing(String),

    /// The task names a collector the runner does not know.
    #[error("collector '{0}' is not registered")]
    CollectorNotRegistered(String),

    /// The external source rejected or failed the request (non-2xx status,
    /// navigation timeout, login navigation failure).
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// No tabular or scalar data was found where some was expected.
    #[error("nothing extracted: {0}")]
    ExtractionMiss(String),

    /// The task's extraction configuration names a strategy this build does
    /// not implement.
    #[error("extraction strategy '{0}' is not supported")]
    UnsupportedStrategy(String),

    /// The export merge found no CSV files to merge.
    #[error("no export files found in {}", .0.display())]
    NoExportsFound(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
