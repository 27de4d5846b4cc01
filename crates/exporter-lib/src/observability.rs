//! Observability infrastructure for the exporter
//!
//! Prometheus self-metrics about the collection pipeline itself:
//! collection latency, discovered resource counts, refinement errors
//! and enrichment-cache effectiveness. The estimation output metrics
//! travel through the pipeline stream instead, never through this
//! registry.

use prometheus::{register_histogram, register_int_counter, Histogram, IntCounter};
use std::sync::OnceLock;

/// Histogram buckets for collection run duration (in seconds)
const DURATION_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ExporterMetricsInner> = OnceLock::new();

struct ExporterMetricsInner {
    collection_duration_seconds: Histogram,
    resources_discovered: IntCounter,
    metrics_emitted: IntCounter,
    refinement_errors: IntCounter,
    cache_hits: IntCounter,
    cache_misses: IntCounter,
}

impl ExporterMetricsInner {
    fn new() -> Self {
        Self {
            collection_duration_seconds: register_histogram!(
                "carbon_exporter_collection_duration_seconds",
                "Time spent on one full collection run",
                DURATION_BUCKETS.to_vec()
            )
            .expect("Failed to register collection_duration_seconds"),

            resources_discovered: register_int_counter!(
                "carbon_exporter_resources_discovered_total",
                "Total number of resources received from discovery"
            )
            .expect("Failed to register resources_discovered_total"),

            metrics_emitted: register_int_counter!(
                "carbon_exporter_metrics_emitted_total",
                "Total number of estimation metrics written to the stream"
            )
            .expect("Failed to register metrics_emitted_total"),

            refinement_errors: register_int_counter!(
                "carbon_exporter_refinement_errors_total",
                "Total number of resources whose refinement failed"
            )
            .expect("Failed to register refinement_errors_total"),

            cache_hits: register_int_counter!(
                "carbon_exporter_cache_hits_total",
                "Enrichment cache lookups answered without an API call"
            )
            .expect("Failed to register cache_hits_total"),

            cache_misses: register_int_counter!(
                "carbon_exporter_cache_misses_total",
                "Enrichment cache lookups that required an API call"
            )
            .expect("Failed to register cache_misses_total"),
        }
    }
}

/// Lightweight handle to the global exporter metrics.
/// Multiple clones share the same underlying instance.
#[derive(Clone)]
pub struct ExporterMetrics {
    _private: (),
}

impl Default for ExporterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ExporterMetrics {
    /// Create a metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ExporterMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ExporterMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Record the duration of one collection run
    pub fn observe_collection_duration(&self, duration_secs: f64) {
        self.inner().collection_duration_seconds.observe(duration_secs);
    }

    /// Count resources received from discovery
    pub fn inc_resources_discovered(&self) {
        self.inner().resources_discovered.inc();
    }

    /// Count estimation metrics written to the output stream
    pub fn add_metrics_emitted(&self, count: u64) {
        self.inner().metrics_emitted.inc_by(count);
    }

    /// Count resources whose refinement failed
    pub fn inc_refinement_errors(&self) {
        self.inner().refinement_errors.inc();
    }

    /// Count enrichment-cache hits
    pub fn inc_cache_hits(&self) {
        self.inner().cache_hits.inc();
    }

    /// Count enrichment-cache misses
    pub fn inc_cache_misses(&self) {
        self.inner().cache_misses.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exporter_metrics_creation() {
        // Prometheus registration is global; creating the handle twice
        // must reuse the same instance instead of re-registering.
        let metrics = ExporterMetrics::new();
        let _again = ExporterMetrics::new();

        metrics.observe_collection_duration(0.1);
        metrics.inc_resources_discovered();
        metrics.add_metrics_emitted(2);
        metrics.inc_refinement_errors();
        metrics.inc_cache_hits();
        metrics.inc_cache_misses();
    }
}
