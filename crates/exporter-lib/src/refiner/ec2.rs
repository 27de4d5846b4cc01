//! EC2 instance utilization refiner
//!
//! Fills `cpu_utilization_percent` from the monitoring source. The
//! per-region average-utilization query is expensive and shared by
//! every instance in the region, so it is registered as a dynamic
//! cache entry computed once per window. Instances absent from the
//! query result are negative-cached with a short TTL so an empty
//! lookup is not hammered on every run.

use super::{MonitoringSource, Refiner};
use crate::cache::ExpiringCache;
use crate::models::Resource;
use crate::observability::ExporterMetrics;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

const REFINER_NAME: &str = "ec2_instance_cloudwatch";

/// Window and reuse period for the regional utilization query.
const UTILIZATION_TTL: Duration = Duration::from_secs(5 * 60);

/// Sentinel TTL for instances with no monitoring data yet.
const SENTINEL_TTL: Duration = Duration::from_secs(30);

/// Enriches `ec2/instance` resources with observed CPU utilization
pub struct Ec2UtilizationRefiner {
    monitoring: Arc<dyn MonitoringSource>,
    /// One entry per region: instance id -> latest utilization sample
    region_cache: ExpiringCache<Arc<HashMap<String, f64>>>,
    /// Negative cache for instances missing from the regional result
    sentinel_cache: ExpiringCache<f64>,
    /// Serializes check-else-populate so concurrent instances of the
    /// same region never issue duplicate outbound queries
    lock: Mutex<()>,
}

impl Ec2UtilizationRefiner {
    pub fn new(monitoring: Arc<dyn MonitoringSource>) -> Self {
        Self {
            monitoring,
            region_cache: ExpiringCache::new(),
            sentinel_cache: ExpiringCache::new(),
            lock: Mutex::new(()),
        }
    }

    fn region_key(region: &str) -> String {
        format!("{REFINER_NAME}_cpu_utilization_{region}")
    }

    fn sentinel_key(region: &str, id: &str) -> String {
        format!("{}/{}", Self::region_key(region), id)
    }

    /// Utilization for one instance, from cache or a fresh regional query.
    async fn utilization(&self, region: &str, id: &str) -> Result<f64> {
        let _guard = self.lock.lock().await;
        let metrics = ExporterMetrics::new();

        // Covers both real zero samples and negative-cached misses.
        if let Some(value) = self.sentinel_cache.get(&Self::sentinel_key(region, id)).await? {
            metrics.inc_cache_hits();
            return Ok(value);
        }

        // Liveness check only: `get` on an expired dynamic key would
        // already re-invoke the generator here.
        let key = Self::region_key(region);
        if self.region_cache.has_live(&key) {
            metrics.inc_cache_hits();
        } else {
            metrics.inc_cache_misses();
        }

        let monitoring = Arc::clone(&self.monitoring);
        let query_region = region.to_string();
        self.region_cache.set_dynamic_if_not_exists(
            key.clone(),
            move || {
                let monitoring = Arc::clone(&monitoring);
                let region = query_region.clone();
                async move {
                    let expr = format!("avg_cpu_utilization_percent_by_instance{{region=\"{region}\"}}");
                    let samples = monitoring
                        .query(&expr, UTILIZATION_TTL)
                        .await
                        .with_context(|| format!("querying cpu utilization for region {region}"))?;
                    Ok(Arc::new(samples))
                }
            },
            UTILIZATION_TTL,
        );

        let samples = self
            .region_cache
            .get(&key)
            .await?
            .unwrap_or_else(|| Arc::new(HashMap::new()));

        match samples.get(id) {
            Some(value) => Ok(*value),
            None => {
                debug!(
                    instance_id = %id,
                    region = %region,
                    "no monitoring data for instance, caching zero sentinel"
                );
                self.sentinel_cache
                    .set(Self::sentinel_key(region, id), 0.0, SENTINEL_TTL);
                Ok(0.0)
            }
        }
    }
}

#[async_trait]
impl Refiner for Ec2UtilizationRefiner {
    fn name(&self) -> &str {
        REFINER_NAME
    }

    fn supports(&self, resource: &Resource) -> bool {
        resource.kind == "ec2/instance"
    }

    async fn refine(&self, resource: &mut Resource) -> Result<()> {
        // Discovery may not have provided instance attributes; the
        // calculation degrades to a zero metric on its own.
        let running = resource
            .attrs
            .instance
            .as_ref()
            .is_some_and(|instance| instance.running);
        if !running {
            return Ok(());
        }

        let utilization = self.utilization(&resource.region, &resource.id).await?;
        if let Some(instance) = resource.attrs.instance.as_mut() {
            instance.cpu_utilization_percent = Some(utilization);
        }
        Ok(())
    }
}
