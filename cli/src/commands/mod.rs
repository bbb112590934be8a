//! Command implementations

pub mod list;
pub mod records;
pub mod sample;

use anyhow::{Context, Result};
use gpuctr_shared::utils::parse_duration;
use std::time::Duration;

/// Window from the command line, falling back to the configured one
fn resolve_window(arg: Option<&str>, default: Duration) -> Result<Duration> {
    match arg {
        Some(s) => parse_duration(s).with_context(|| format!("Invalid window: {}", s)),
        None => Ok(default),
    }
}
