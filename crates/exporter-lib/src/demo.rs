//! Demo provider
//!
//! A credential-free discovery source that fabricates a deterministic
//! fleet of instances and volumes across a few regions. It exercises
//! the whole pipeline (discovery, refinement, estimation, exposition)
//! and backs the default configuration and the end-to-end tests.

use crate::models::{InstanceAttrs, Provider, Resource, StorageMedia, VolumeAttrs};
use crate::pipeline::Discoverer;
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

const DEMO_REGIONS: &[&str] = &["eu-west-1", "us-east-1", "ap-southeast-2"];

const DEMO_PROCESSORS: &[&str] = &[
    "Intel Xeon Platinum 8175M",
    "AMD EPYC 7R13",
    "AWS Graviton3",
];

/// Deterministic synthetic fleet for one provider-free deployment
pub struct DemoDiscoverer {
    instance_count: usize,
    volume_count: usize,
}

impl DemoDiscoverer {
    pub fn new(instance_count: usize, volume_count: usize) -> Self {
        Self {
            instance_count,
            volume_count,
        }
    }

    fn instance(index: usize) -> Resource {
        let region = DEMO_REGIONS[index % DEMO_REGIONS.len()];
        let cores = [2u32, 4, 8, 16][index % 4];
        let mut resource = Resource::new(
            Provider::Demo,
            "demo/instance",
            format!("demo-{index:04}"),
            region,
        );
        resource.attrs.instance = Some(InstanceAttrs {
            core_count: cores,
            memory_gb: f64::from(cores) * 4.0,
            processor_name: DEMO_PROCESSORS[index % DEMO_PROCESSORS.len()].to_string(),
            // Every seventh instance is stopped.
            running: index % 7 != 0,
            cpu_utilization_percent: None,
            ephemeral_storage_gb: if index % 5 == 0 { 100.0 } else { 0.0 },
        });
        resource
            .labels
            .insert("team".to_string(), format!("team-{}", index % 3));
        resource
    }

    fn volume(index: usize) -> Resource {
        let region = DEMO_REGIONS[index % DEMO_REGIONS.len()];
        let mut resource = Resource::new(
            Provider::Demo,
            "demo/volume",
            format!("demo-vol-{index:04}"),
            region,
        );
        resource.attrs.volume = Some(VolumeAttrs {
            size_gb: [64.0, 256.0, 1024.0][index % 3],
            media: if index % 2 == 0 {
                StorageMedia::Ssd
            } else {
                StorageMedia::Hdd
            },
        });
        resource
    }
}

#[async_trait]
impl Discoverer for DemoDiscoverer {
    async fn discover(&self, tx: mpsc::Sender<Resource>) -> Result<()> {
        debug!(
            instances = self.instance_count,
            volumes = self.volume_count,
            "discovering demo fleet"
        );
        for index in 0..self.instance_count {
            if tx.send(Self::instance(index)).await.is_err() {
                return Ok(());
            }
        }
        for index in 0..self.volume_count {
            if tx.send(Self::volume(index)).await.is_err() {
                return Ok(());
            }
        }
        Ok(())
    }
}
