//! Energy/carbon model registry
//!
//! Maps `(provider, kind)` to a pure calculation function turning an
//! enriched resource into a watts metric, then derives the emissions
//! metric through the carbon intensity map. The table is built once at
//! startup and injected into the pipeline; there is no ambient global
//! state and no locking because nothing here mutates.
//!
//! Calculation functions never perform I/O and never fail: a missing
//! attribute is an expected condition (a resource observed before
//! monitoring data exists) and degrades to a zero-value metric.

use crate::energy::{cpu, primitives, CarbonIntensityMap};
use crate::models::{Metric, Provider, Resource, StorageMedia, WATTS_METRIC_NAME};
use std::collections::HashMap;

/// EBS-style block storage is triple-replicated within a region.
const BLOCK_REPLICATION_FACTOR: f64 = 3.0;

/// Controller, cooling and slack capacity overhead on block storage.
const BLOCK_OVERHEAD_FACTOR: f64 = 1.5;

/// Object stores shard data across many physical disks; erasure
/// coding plus spare capacity roughly doubles the powered footprint.
const OBJECT_OVERHEAD_FACTOR: f64 = 2.0;

/// Snapshots land on object-store backed cold storage.
const SNAPSHOT_OVERHEAD_FACTOR: f64 = 1.3;

/// Pure calculation: enriched resource to watts metric
pub type CalcFn = fn(&Resource) -> Metric;

/// Immutable (provider, kind) -> calculation table
pub struct ModelRegistry {
    calculations: HashMap<(Provider, String), CalcFn>,
    intensity: CarbonIntensityMap,
}

impl ModelRegistry {
    /// Build the calculation table for one provider.
    pub fn for_provider(provider: Provider) -> Self {
        let entries: &[(&str, CalcFn)] = match provider {
            Provider::Aws => &[
                ("ec2/instance", instance_watts),
                ("ec2/volume", volume_watts),
                ("ec2/snapshot", snapshot_watts),
                ("s3/bucket", bucket_watts),
            ],
            Provider::Gcp => &[
                ("gce/instance", instance_watts),
                ("gce/disk", volume_watts),
                ("gcs/bucket", bucket_watts),
            ],
            Provider::Scaleway => &[
                ("instance/server", instance_watts),
                ("instance/volume", volume_watts),
            ],
            Provider::Demo => &[
                ("demo/instance", instance_watts),
                ("demo/volume", volume_watts),
            ],
        };

        let calculations = entries
            .iter()
            .map(|(kind, calc)| ((provider, (*kind).to_string()), *calc))
            .collect();

        Self {
            calculations,
            intensity: CarbonIntensityMap::for_provider(provider),
        }
    }

    /// Remove kinds disabled by configuration.
    pub fn without_kinds(mut self, kinds: &[String]) -> Self {
        self.calculations.retain(|(_, kind), _| !kinds.contains(kind));
        self
    }

    /// Whether a calculation exists for this resource
    pub fn supports(&self, resource: &Resource) -> bool {
        self.calculations
            .contains_key(&(resource.provider, resource.kind.clone()))
    }

    /// Kinds with a registered calculation, for discovery filtering
    pub fn supported_kinds(&self) -> Vec<&str> {
        self.calculations.keys().map(|(_, kind)| kind.as_str()).collect()
    }

    /// The carbon intensity map backing emission derivation
    pub fn intensity(&self) -> &CarbonIntensityMap {
        &self.intensity
    }

    /// Compute the watts metric and its derived emissions metric.
    ///
    /// Returns `None` for unsupported kinds. The watts metric always
    /// comes first; the emissions metric follows whenever the resource
    /// has a region to rate against.
    pub fn compute_metrics(&self, resource: &Resource) -> Option<Vec<Metric>> {
        let calc = self
            .calculations
            .get(&(resource.provider, resource.kind.clone()))?;

        let mut watts = calc(resource);
        watts.name = WATTS_METRIC_NAME.to_string();
        watts.resource_id = Some(resource.id.clone());

        // Resource labels first, structural labels last so user tags
        // can never mask the correlation keys.
        for (key, value) in &resource.labels {
            if !value.is_empty() || !watts.labels.contains_key(key) {
                watts.labels.insert(key.clone(), value.clone());
            }
        }
        watts.labels.insert("provider".to_string(), resource.provider.to_string());
        watts.labels.insert("kind".to_string(), resource.kind.clone());
        watts.labels.insert("id".to_string(), resource.id.clone());
        if !resource.region.is_empty() {
            watts.labels.insert("region".to_string(), resource.region.clone());
        }

        let mut metrics = Vec::with_capacity(2);
        let emissions = self.intensity.co2eq_from_watts(&watts);
        metrics.push(watts);
        if let Some(emissions) = emissions {
            metrics.push(emissions);
        }
        Some(metrics)
    }
}

/// Compute instance: CPU draw at observed utilization plus memory and
/// attached ephemeral storage. A non-running instance draws nothing.
fn instance_watts(resource: &Resource) -> Metric {
    let Some(instance) = resource.attrs.instance.as_ref() else {
        return Metric::new(WATTS_METRIC_NAME, 0.0);
    };
    if !instance.running {
        return Metric::new(WATTS_METRIC_NAME, 0.0);
    }

    let processor = cpu::lookup_processor(&instance.processor_name);
    let utilization = instance.cpu_utilization_percent.unwrap_or(0.0);
    let watts = cpu::estimate_cpu_watts(processor, instance.core_count, utilization)
        + primitives::memory_watts(instance.memory_gb)
        + primitives::block_storage_watts(instance.ephemeral_storage_gb, StorageMedia::Ssd);

    Metric::new(WATTS_METRIC_NAME, watts)
}

/// Block storage volume: provisioned bytes on HDD or SSD media,
/// replicated and with controller overhead.
fn volume_watts(resource: &Resource) -> Metric {
    let Some(volume) = resource.attrs.volume.as_ref() else {
        return Metric::new(WATTS_METRIC_NAME, 0.0);
    };

    let base = primitives::block_storage_watts(volume.size_gb, volume.media);
    Metric::new(
        WATTS_METRIC_NAME,
        base * BLOCK_REPLICATION_FACTOR * BLOCK_OVERHEAD_FACTOR,
    )
}

/// Snapshot: cold object-backed storage, HDD coefficient.
fn snapshot_watts(resource: &Resource) -> Metric {
    let Some(volume) = resource.attrs.volume.as_ref() else {
        return Metric::new(WATTS_METRIC_NAME, 0.0);
    };

    let base = primitives::block_storage_watts(volume.size_gb, StorageMedia::Hdd);
    Metric::new(WATTS_METRIC_NAME, base * SNAPSHOT_OVERHEAD_FACTOR)
}

/// Object storage bucket: payload bytes scaled by the erasure-coding
/// and spare-capacity factor.
fn bucket_watts(resource: &Resource) -> Metric {
    let Some(bucket) = resource.attrs.bucket.as_ref() else {
        return Metric::new(WATTS_METRIC_NAME, 0.0);
    };

    Metric::new(
        WATTS_METRIC_NAME,
        primitives::object_storage_watts(bucket.size_bytes) * OBJECT_OVERHEAD_FACTOR,
    )
}
