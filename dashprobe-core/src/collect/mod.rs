//! Collectors: turn a request description into a raw payload plus metadata.

pub mod browser;
pub mod http;
pub mod screen;

use crate::error::Result;
use crate::model::{CollectRequest, CollectResponse};
use async_trait::async_trait;

/// Polymorphic collection capability.
///
/// Implementations fail with [`crate::Error::DependencyMissing`] when their
/// runtime dependency is absent and [`crate::Error::Upstream`] when the
/// external source rejects the request.
#[async_trait]
pub trait Collector: Send + Sync {
    async fn collect(&self, request: &CollectRequest) -> Result<CollectResponse>;
}
