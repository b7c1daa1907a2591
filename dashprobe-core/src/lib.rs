//! Core library for dashprobe: declarative data-collection checks.
//!
//! A [`runner::Runner`] dispatches configured tasks to collectors (HTTP,
//! CDP-driven browser, desktop screen), applies an extraction strategy to the
//! collected payload and evaluates validation rules against the extracted
//! value. The browser collector handles the hard path: form login against
//! unknown markup, locating an embedded analytics report inside nested
//! frames, and turning its rendered grid into per-tab CSV exports merged
//! into a single spreadsheet.

pub mod collect;
pub mod error;
pub mod export;
pub mod extract;
pub mod model;
pub mod runner;
pub mod validate;

pub use error::{Error, Result};
pub use runner::{Runner, RunnerConfig};
