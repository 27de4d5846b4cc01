//! Core data models for the carbon exporter
//!
//! A `Resource` is one discovered cloud asset flowing through the
//! collection pipeline; a `Metric` is one numeric observation produced
//! for it. Refiners fill in the typed `Attributes` side-table, the
//! model registry reads it and never writes it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Metric name carrying the estimated power draw in watts.
pub const WATTS_METRIC_NAME: &str = "estimated_watts";

/// Metric name carrying the derived emission rate in grams CO2eq per second.
pub const EMISSIONS_METRIC_NAME: &str = "estimated_g_co2eq_second";

/// Supported cloud providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Aws,
    Gcp,
    #[serde(rename = "scw")]
    Scaleway,
    Demo,
}

impl Provider {
    /// Short vendor tag used in metric labels and resource kinds
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Aws => "aws",
            Provider::Gcp => "gcp",
            Provider::Scaleway => "scw",
            Provider::Demo => "demo",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aws" => Ok(Provider::Aws),
            "gcp" => Ok(Provider::Gcp),
            "scw" | "scaleway" => Ok(Provider::Scaleway),
            "demo" => Ok(Provider::Demo),
            other => Err(anyhow::anyhow!("unknown provider: {other}")),
        }
    }
}

/// One discovered cloud asset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    /// Cloud provider this resource belongs to
    pub provider: Provider,
    /// Vendor-qualified type discriminator, e.g. `ec2/instance`
    pub kind: String,
    /// Vendor-unique identifier within its kind
    pub id: String,
    /// Location string; refiners may correct it once an API lookup completes
    pub region: String,
    /// User/vendor tags, merged non-destructively
    pub labels: BTreeMap<String, String>,
    /// Typed attributes populated by refiners
    #[serde(default)]
    pub attrs: Attributes,
}

impl Resource {
    /// Create a resource with empty labels and attributes
    pub fn new(
        provider: Provider,
        kind: impl Into<String>,
        id: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            kind: kind.into(),
            id: id.into(),
            region: region.into(),
            labels: BTreeMap::new(),
            attrs: Attributes::default(),
        }
    }

    /// Merge labels non-destructively: a later writer never overwrites
    /// an existing value with an empty one.
    pub fn merge_labels(&mut self, other: &BTreeMap<String, String>) {
        for (key, value) in other {
            if value.is_empty() && self.labels.contains_key(key) {
                continue;
            }
            self.labels.insert(key.clone(), value.clone());
        }
    }
}

/// Typed attribute side-table filled in by refiners
///
/// Each field belongs to the refiner family that populates it. Keeping
/// the variants as plain structs makes the calculation functions
/// compile-checked readers instead of "cast and hope" consumers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Attributes {
    pub instance: Option<InstanceAttrs>,
    pub volume: Option<VolumeAttrs>,
    pub bucket: Option<BucketAttrs>,
}

/// Compute instance attributes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceAttrs {
    /// Number of vCPU threads allocated to the instance
    pub core_count: u32,
    /// Memory size in GiB
    pub memory_gb: f64,
    /// Vendor-reported processor name, resolved fuzzily against the
    /// known processor table at calculation time
    pub processor_name: String,
    /// Whether the instance is currently running
    pub running: bool,
    /// Latest observed CPU utilization (0-100), absent before
    /// monitoring data exists
    pub cpu_utilization_percent: Option<f64>,
    /// Attached ephemeral local storage in GiB, zero when none
    pub ephemeral_storage_gb: f64,
}

/// Block storage media kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMedia {
    Hdd,
    Ssd,
}

/// Block storage volume attributes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeAttrs {
    pub size_gb: f64,
    pub media: StorageMedia,
}

/// Object storage bucket attributes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketAttrs {
    pub size_bytes: f64,
    pub object_count: u64,
}

/// One numeric observation
///
/// `Clone` performs a deep copy of the label map; the registry derives
/// the emissions metric from the watts metric and must not share or
/// mutate the original's labels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metric {
    pub name: String,
    pub value: f64,
    pub labels: BTreeMap<String, String>,
    pub resource_id: Option<String>,
}

impl Metric {
    /// Create a metric with no labels
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            labels: BTreeMap::new(),
            resource_id: None,
        }
    }

    /// Add or replace a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}
