//! GPU hardware counter sampling
//!
//! Discovers the counters a device supports, builds and caches profile
//! configurations for arbitrary counter lists, drives the
//! start/sample/stop cycle over a timed window and decodes the raw records
//! that come back.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use gpuctr_profiler::backend::simulated::SimulatedBackend;
//! use gpuctr_profiler::{ReportDriver, SamplerRegistry};
//!
//! let backend = Arc::new(SimulatedBackend::from_path("devices.toml")?);
//! let mut registry = SamplerRegistry::discover(backend)?;
//! let outcome = ReportDriver::new(Duration::from_micros(10)).run(&mut registry, &[])?;
//! println!("{}", serde_json::to_string_pretty(&outcome.report)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backend;
pub mod cache;
mod error;
pub mod registry;
pub mod report;
pub mod sampler;

pub use backend::{CounterRecord, ProfilingBackend};
pub use cache::ReportCache;
pub use error::{Result, SamplerError};
pub use registry::SamplerRegistry;
pub use report::{aggregate, FailurePolicy, ReportDriver, ReportOutcome, DEFAULT_WINDOW};
pub use sampler::{CounterSampler, RecordView};
