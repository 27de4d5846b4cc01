//! HTTP API for the estimation metrics and health checks
//!
//! `/metrics` performs one fresh, independent collection per scrape
//! and serializes the result in a line-oriented text exposition
//! format; nothing is aggregated across scrapes.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use exporter_lib::models::Metric;
use exporter_lib::pipeline::Pipeline;
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    timestamp: String,
}

impl HealthResponse {
    fn now(status: &'static str) -> Self {
        Self {
            status,
            version: env!("CARGO_PKG_VERSION"),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Liveness check
async fn healthz() -> impl IntoResponse {
    Json(HealthResponse::now("ok"))
}

/// Readiness check: the exporter is ready as soon as it serves.
async fn readyz() -> impl IntoResponse {
    Json(HealthResponse::now("ready"))
}

/// Run one collection and expose every metric as a text line.
///
/// The whole run is buffered before responding so a failed collection
/// returns an error status instead of a truncated body.
async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (tx, mut rx) = mpsc::channel::<Metric>(1024);
    let pipeline = Arc::clone(&state.pipeline);
    let run = tokio::spawn(async move { pipeline.collect(tx).await });

    let mut collected = Vec::new();
    while let Some(metric) = rx.recv().await {
        collected.push(metric);
    }

    match run.await {
        Ok(Ok(())) => {
            let mut body = String::new();
            for metric in &collected {
                let _ = writeln!(body, "{}", format_metric_line(metric));
            }
            (
                StatusCode::OK,
                [("content-type", "text/plain; charset=utf-8")],
                body,
            )
                .into_response()
        }
        Ok(Err(error)) => {
            error!(error = %error, "collection run failed");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{error:#}\n")).into_response()
        }
        Err(join_error) => {
            error!(error = %join_error, "collection task panicked");
            (StatusCode::INTERNAL_SERVER_ERROR, "collection task failed\n".to_string())
                .into_response()
        }
    }
}

/// One exposition line: `name{k1="v1",k2="v2"} 0.000000`, labels
/// sorted lexicographically by name.
pub fn format_metric_line(metric: &Metric) -> String {
    let mut line = metric.name.clone();
    if !metric.labels.is_empty() {
        line.push('{');
        // BTreeMap iteration is already lexicographic.
        let mut first = true;
        for (key, value) in &metric.labels {
            if !first {
                line.push(',');
            }
            let _ = write!(line, "{key}=\"{value}\"");
            first = false;
        }
        line.push('}');
    }
    let _ = write!(line, " {:.6}", metric.value);
    line
}

/// Exporter self-metrics: collection latency, discovery counters and
/// enrichment-cache effectiveness. Separate from `/metrics`, which
/// carries the estimation output.
async fn internal_metrics() -> impl IntoResponse {
    let encoder = prometheus::TextEncoder::new();
    match encoder.encode_to_string(&prometheus::gather()) {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(error) => {
            error!(error = %error, "failed to encode self-metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "encoding failed\n".to_string()).into_response()
        }
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/internal/metrics", get(internal_metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
