//! Energy and carbon estimation models
//!
//! `primitives` holds the pure power formulas, `cpu` the TDP-anchored
//! processor model with fuzzy name lookup, `intensity` the regional
//! carbon intensity map used to turn watts into emission rates.

pub mod cpu;
pub mod intensity;
pub mod primitives;

pub use cpu::{estimate_cpu_watts, lookup_processor, ProcessorSpec, PROCESSORS};
pub use intensity::CarbonIntensityMap;
