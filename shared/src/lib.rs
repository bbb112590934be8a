//! Shared types and utilities for gpuctr
//!
//! This crate contains the report document produced by the counter sampler,
//! the built-in counter field list, and small parsing helpers used by the
//! sampler library and the command-line tool.

pub mod types;
pub mod utils;

// Re-export commonly used types
pub use types::fields::{default_fields, DEFAULT_FIELDS};
pub use types::report::{DeviceMetrics, FieldValue, GpuReport};
