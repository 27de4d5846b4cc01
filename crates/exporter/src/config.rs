//! Exporter configuration

use anyhow::Result;
use serde::Deserialize;

/// Exporter configuration, loaded from `EXPORTER_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ExporterConfig {
    /// Cloud provider to collect from (`demo`, `aws`, `gcp`, `scw`)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// HTTP port for the metrics/health endpoints
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Concurrency ceiling for the refine+compute stage
    #[serde(default = "default_worker_limit")]
    pub worker_limit: usize,

    /// Synthetic fleet size when the demo provider is selected
    #[serde(default = "default_demo_instances")]
    pub demo_instances: usize,

    #[serde(default = "default_demo_volumes")]
    pub demo_volumes: usize,

    /// Resource kinds excluded from the calculation table
    #[serde(default)]
    pub disabled_kinds: Vec<String>,
}

fn default_provider() -> String {
    "demo".to_string()
}

fn default_listen_port() -> u16 {
    8080
}

fn default_worker_limit() -> usize {
    5
}

fn default_demo_instances() -> usize {
    50
}

fn default_demo_volumes() -> usize {
    20
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            listen_port: default_listen_port(),
            worker_limit: default_worker_limit(),
            demo_instances: default_demo_instances(),
            demo_volumes: default_demo_volumes(),
            disabled_kinds: Vec::new(),
        }
    }
}

impl ExporterConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("EXPORTER"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_default())
    }
}
