//! Collection pipeline
//!
//! Orchestrates one collection run: discovery writes resources onto an
//! internal queue, a bounded pool of workers refines each resource and
//! evaluates its energy model, and the resulting metrics are streamed
//! to the caller. The first error cancels the run; metrics already
//! emitted stand.

use crate::models::{Metric, Resource};
use crate::observability::ExporterMetrics;
use crate::refiner::Refiner;
use crate::registry::ModelRegistry;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Concurrency ceiling for the refine+compute stage.
const DEFAULT_WORKER_LIMIT: usize = 5;

/// Depth of the discovery-to-worker handoff queue.
const RESOURCE_QUEUE_DEPTH: usize = 32;

/// Errors terminating a collection run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("discovering resources: {source}")]
    Discovery {
        #[source]
        source: anyhow::Error,
    },

    #[error("refining {kind} {id}: {source}")]
    Refinement {
        kind: String,
        id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("metric stream closed by consumer")]
    StreamClosed,
}

/// Discovery source boundary, implemented per provider.
///
/// Produces a lazy, finite sequence of resources onto the queue and
/// closes it (by dropping the sender) on completion. Implementations
/// may fan out internally, e.g. one listing task per region, and
/// should pre-filter to kinds the registry supports.
#[async_trait]
pub trait Discoverer: Send + Sync {
    async fn discover(&self, tx: mpsc::Sender<Resource>) -> Result<()>;
}

/// One-shot resource collection pipeline
pub struct Pipeline {
    discoverer: Arc<dyn Discoverer>,
    refiners: Vec<Arc<dyn Refiner>>,
    registry: Arc<ModelRegistry>,
    worker_limit: usize,
}

impl Pipeline {
    pub fn new(
        discoverer: Arc<dyn Discoverer>,
        refiners: Vec<Arc<dyn Refiner>>,
        registry: Arc<ModelRegistry>,
    ) -> Self {
        Self {
            discoverer,
            refiners,
            registry,
            worker_limit: DEFAULT_WORKER_LIMIT,
        }
    }

    /// Override the refine+compute concurrency ceiling.
    pub fn with_worker_limit(mut self, worker_limit: usize) -> Self {
        self.worker_limit = worker_limit.max(1);
        self
    }

    /// Run one collection, streaming metrics to `out`.
    ///
    /// The stream is closed exactly once, on every path, before this
    /// returns. The first error encountered is returned; metrics
    /// already written remain valid.
    pub async fn collect(&self, out: mpsc::Sender<Metric>) -> Result<()> {
        let started = Instant::now();
        let metrics = ExporterMetrics::new();
        let first_error: Arc<Mutex<Option<anyhow::Error>>> = Arc::new(Mutex::new(None));
        let (cancel_tx, mut cancel_rx) = broadcast::channel::<()>(1);

        // Discovery writes onto the internal queue and reports its
        // error immediately so in-flight workers observe cancellation.
        let (resource_tx, mut resource_rx) = mpsc::channel::<Resource>(RESOURCE_QUEUE_DEPTH);
        let discovery = {
            let discoverer = Arc::clone(&self.discoverer);
            let cancel_tx = cancel_tx.clone();
            let mut cancel_rx = cancel_tx.subscribe();
            let first_error = Arc::clone(&first_error);
            tokio::spawn(async move {
                let result = tokio::select! {
                    result = discoverer.discover(resource_tx) => result,
                    _ = cancel_rx.recv() => Ok(()),
                };
                if let Err(source) = result {
                    record_error(&first_error, PipelineError::Discovery { source }.into()).await;
                    let _ = cancel_tx.send(());
                }
            })
        };

        let semaphore = Arc::new(Semaphore::new(self.worker_limit));
        let mut workers = JoinSet::new();
        let mut discovered = 0usize;

        loop {
            let resource = tokio::select! {
                maybe = resource_rx.recv() => match maybe {
                    Some(resource) => resource,
                    None => break,
                },
                _ = cancel_rx.recv() => break,
            };

            discovered += 1;
            metrics.inc_resources_discovered();

            // Hard ceiling: wait for a free slot instead of queuing
            // unboundedly in memory.
            let permit = tokio::select! {
                permit = Arc::clone(&semaphore).acquire_owned() => {
                    permit.expect("worker semaphore is never closed")
                }
                _ = cancel_rx.recv() => break,
            };

            let refiners = self.refiners.clone();
            let registry = Arc::clone(&self.registry);
            let out = out.clone();
            let cancel_tx = cancel_tx.clone();
            let mut worker_cancel = cancel_tx.subscribe();
            let first_error = Arc::clone(&first_error);
            workers.spawn(async move {
                let _permit = permit;
                // A cancellation sent before this worker subscribed
                // would be missed by the broadcast; the recorded error
                // covers that window.
                if first_error.lock().await.is_some() {
                    return;
                }
                let result = tokio::select! {
                    result = process_resource(resource, &refiners, &registry, &out) => result,
                    _ = worker_cancel.recv() => Ok(()),
                };
                if let Err(error) = result {
                    ExporterMetrics::new().inc_refinement_errors();
                    warn!(error = %error, "resource processing failed, cancelling run");
                    record_error(&first_error, error).await;
                    let _ = cancel_tx.send(());
                }
            });
        }

        // Let in-flight workers finish; new work is no longer accepted.
        drop(resource_rx);
        let _ = discovery.await;
        while workers.join_next().await.is_some() {}

        let elapsed = started.elapsed();
        metrics.observe_collection_duration(elapsed.as_secs_f64());

        let error = first_error.lock().await.take();
        match error {
            Some(error) => Err(error),
            None => {
                info!(
                    resources = discovered,
                    elapsed_ms = elapsed.as_millis(),
                    "collection run complete"
                );
                Ok(())
            }
        }
    }
}

/// Refine one resource and emit its metrics, watts before emissions.
async fn process_resource(
    mut resource: Resource,
    refiners: &[Arc<dyn Refiner>],
    registry: &ModelRegistry,
    out: &mpsc::Sender<Metric>,
) -> Result<()> {
    for refiner in refiners {
        if !refiner.supports(&resource) {
            continue;
        }
        if let Err(source) = refiner.refine(&mut resource).await {
            return Err(PipelineError::Refinement {
                kind: resource.kind.clone(),
                id: resource.id.clone(),
                source,
            }
            .into());
        }
    }

    // Discovery already filters by supported kind, so this path only
    // fires when discovery and registry tables disagree.
    let Some(computed) = registry.compute_metrics(&resource) else {
        debug!(
            kind = %resource.kind,
            id = %resource.id,
            "no calculation registered for kind, dropping resource"
        );
        return Ok(());
    };

    let count = computed.len() as u64;
    for metric in computed {
        if out.send(metric).await.is_err() {
            return Err(PipelineError::StreamClosed.into());
        }
    }
    ExporterMetrics::new().add_metrics_emitted(count);
    Ok(())
}

async fn record_error(slot: &Mutex<Option<anyhow::Error>>, error: anyhow::Error) {
    let mut guard = slot.lock().await;
    if guard.is_none() {
        *guard = Some(error);
    }
}
