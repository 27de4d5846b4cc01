//! S3 bucket refiner
//!
//! Corrects the bucket's region (discovery lists buckets globally and
//! does not know where they live) and fills in payload size from the
//! inventory source. Both lookups are cached per bucket; a bucket the
//! inventory has no data for yet is negative-cached with a short TTL.

use super::{ObjectStoreInventory, Refiner};
use crate::cache::ExpiringCache;
use crate::models::{BucketAttrs, Resource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

const REFINER_NAME: &str = "s3_bucket_inventory";

/// Bucket locations effectively never change.
const REGION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Inventory figures are refreshed daily upstream; an hour of reuse
/// keeps scrapes cheap without going stale.
const STATS_TTL: Duration = Duration::from_secs(60 * 60);

/// Sentinel TTL for buckets the inventory has not reported yet.
const SENTINEL_TTL: Duration = Duration::from_secs(60);

/// Enriches `s3/bucket` resources with location and size
pub struct S3BucketRefiner {
    inventory: Arc<dyn ObjectStoreInventory>,
    region_cache: ExpiringCache<String>,
    stats_cache: ExpiringCache<(f64, u64)>,
    lock: Mutex<()>,
}

impl S3BucketRefiner {
    pub fn new(inventory: Arc<dyn ObjectStoreInventory>) -> Self {
        Self {
            inventory,
            region_cache: ExpiringCache::new(),
            stats_cache: ExpiringCache::new(),
            lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl Refiner for S3BucketRefiner {
    fn name(&self) -> &str {
        REFINER_NAME
    }

    fn supports(&self, resource: &Resource) -> bool {
        resource.kind == "s3/bucket"
    }

    async fn refine(&self, resource: &mut Resource) -> Result<()> {
        let _guard = self.lock.lock().await;
        let bucket = resource.id.clone();

        let region = self
            .region_cache
            .get_or_set(
                &format!("{REFINER_NAME}_region_{bucket}"),
                || async {
                    self.inventory
                        .bucket_region(&bucket)
                        .await
                        .with_context(|| format!("resolving region of bucket {bucket}"))
                },
                REGION_TTL,
            )
            .await?;
        resource.region = region.clone();

        let stats_key = format!("{REFINER_NAME}_stats_{bucket}");
        let stats = match self.stats_cache.get(&stats_key).await? {
            Some(stats) => stats,
            None => {
                match self
                    .inventory
                    .bucket_stats(&bucket, &region)
                    .await
                    .with_context(|| format!("fetching inventory of bucket {bucket}"))?
                {
                    Some(stats) => {
                        self.stats_cache.set(stats_key, stats, STATS_TTL);
                        stats
                    }
                    None => {
                        debug!(bucket = %bucket, "no inventory data yet, caching zero sentinel");
                        let sentinel = (0.0, 0);
                        self.stats_cache.set(stats_key, sentinel, SENTINEL_TTL);
                        sentinel
                    }
                }
            }
        };

        resource.attrs.bucket = Some(BucketAttrs {
            size_bytes: stats.0,
            object_count: stats.1,
        });
        Ok(())
    }
}
