//! Cloud carbon exporter
//!
//! Estimates the power draw and CO2-equivalent emission rate of
//! discovered cloud resources and serves them over HTTP. Each scrape
//! triggers one fresh collection run.

use anyhow::{bail, Result};
use exporter_lib::demo::DemoDiscoverer;
use exporter_lib::models::Provider;
use exporter_lib::observability::ExporterMetrics;
use exporter_lib::pipeline::Pipeline;
use exporter_lib::refiner::{DemoUtilizationRefiner, Refiner};
use exporter_lib::registry::ModelRegistry;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const EXPORTER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!(version = EXPORTER_VERSION, "Starting carbon-exporter");

    let config = config::ExporterConfig::load()?;
    let provider: Provider = config.provider.parse()?;
    info!(provider = %provider, port = config.listen_port, "Exporter configured");

    // Initialize self-metrics early so the registry exists before the
    // first scrape.
    let _metrics = ExporterMetrics::new();

    let registry = Arc::new(
        ModelRegistry::for_provider(provider).without_kinds(&config.disabled_kinds),
    );

    // Cloud providers need their API clients wired in here; only the
    // credential-free demo provider ships with the exporter itself.
    let (discoverer, refiners): (Arc<dyn exporter_lib::Discoverer>, Vec<Arc<dyn Refiner>>) =
        match provider {
            Provider::Demo => (
                Arc::new(DemoDiscoverer::new(config.demo_instances, config.demo_volumes)),
                vec![Arc::new(DemoUtilizationRefiner)],
            ),
            other => bail!("provider {other} requires external API client wiring"),
        };

    let pipeline = Arc::new(
        Pipeline::new(discoverer, refiners, registry).with_worker_limit(config.worker_limit),
    );
    let app_state = Arc::new(api::AppState::new(pipeline));

    let api_handle = tokio::spawn(api::serve(config.listen_port, app_state));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    api_handle.abort();

    Ok(())
}
