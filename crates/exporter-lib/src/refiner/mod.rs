//! Resource refiners
//!
//! A refiner is a capability-checked enrichment step: the pipeline
//! applies every refiner whose `supports` returns true, in fixed
//! registration order, before handing the resource to the model
//! registry. Refiners that perform network round trips go through the
//! enrichment cache and serialize their check-else-populate sequence
//! behind their own mutex.

mod demo;
mod ec2;
mod s3;

pub use demo::DemoUtilizationRefiner;
pub use ec2::Ec2UtilizationRefiner;
pub use s3::S3BucketRefiner;

use crate::models::Resource;
use anyhow::Result;
use std::collections::HashMap;
use std::time::Duration;

pub use async_trait::async_trait;

/// A pluggable enrichment step applied before power estimation
#[async_trait]
pub trait Refiner: Send + Sync {
    /// Stable name, used to namespace cache keys and diagnostics
    fn name(&self) -> &str;

    /// Whether this refiner applies to the given resource
    fn supports(&self, resource: &Resource) -> bool;

    /// Populate the resource's attributes in place
    async fn refine(&self, resource: &mut Resource) -> Result<()>;
}

/// Monitoring query boundary, implemented by provider API clients.
///
/// Given a query expression and a time window, returns the latest
/// numeric sample per resource-name label. The query language is
/// provider-specific and opaque to the refiners.
#[async_trait]
pub trait MonitoringSource: Send + Sync {
    async fn query(&self, expr: &str, window: Duration) -> Result<HashMap<String, f64>>;
}

/// Object-store inventory boundary, implemented by provider API clients.
#[async_trait]
pub trait ObjectStoreInventory: Send + Sync {
    /// The bucket's true region, which discovery may not know upfront
    async fn bucket_region(&self, bucket: &str) -> Result<String>;

    /// Total payload bytes and object count, `None` when the
    /// inventory has no data for the bucket yet
    async fn bucket_stats(&self, bucket: &str, region: &str) -> Result<Option<(f64, u64)>>;
}
