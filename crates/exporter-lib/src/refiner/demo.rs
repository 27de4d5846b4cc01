//! Demo utilization refiner
//!
//! Deterministic stand-in for a monitoring-backed refiner: derives a
//! stable pseudo-utilization from the resource id. No I/O, no cache.

use super::Refiner;
use crate::models::Resource;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Fills synthetic CPU utilization for `demo/instance` resources
pub struct DemoUtilizationRefiner;

impl DemoUtilizationRefiner {
    /// Stable utilization in [0, 100) derived from the resource id.
    fn synthetic_utilization(id: &str) -> f64 {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        (hasher.finish() % 1000) as f64 / 10.0
    }
}

#[async_trait]
impl Refiner for DemoUtilizationRefiner {
    fn name(&self) -> &str {
        "demo_instance_utilization"
    }

    fn supports(&self, resource: &Resource) -> bool {
        resource.kind == "demo/instance"
    }

    async fn refine(&self, resource: &mut Resource) -> Result<()> {
        if let Some(instance) = resource.attrs.instance.as_mut() {
            if instance.running {
                instance.cpu_utilization_percent =
                    Some(Self::synthetic_utilization(&resource.id));
            }
        }
        Ok(())
    }
}
