//! Exporter library for cloud energy and carbon estimation
//!
//! This crate provides the core functionality for:
//! - Concurrent resource collection (discover, refine, compute, stream)
//! - Energy estimation models (CPU power curve, storage/memory primitives)
//! - Regional carbon intensity lookup and emission derivation
//! - Time-bounded enrichment caching with dogpile prevention
//! - Self-observability

pub mod cache;
pub mod demo;
pub mod energy;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod refiner;
pub mod registry;

pub use cache::ExpiringCache;
pub use energy::CarbonIntensityMap;
pub use models::*;
pub use observability::ExporterMetrics;
pub use pipeline::{Discoverer, Pipeline, PipelineError};
pub use refiner::Refiner;
pub use registry::ModelRegistry;
