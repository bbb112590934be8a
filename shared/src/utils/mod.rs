//! Utility functions and helpers

use anyhow::{bail, Result};
use std::time::Duration;

/// Parse a duration string (e.g., "10us", "250ms", "30s", "5m", "1h")
///
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        bail!("empty duration");
    }

    if let Some(num_str) = s.strip_suffix("us") {
        let micros: u64 = num_str.trim().parse()?;
        Ok(Duration::from_micros(micros))
    } else if let Some(num_str) = s.strip_suffix("ms") {
        let millis: u64 = num_str.trim().parse()?;
        Ok(Duration::from_millis(millis))
    } else if let Some(num_str) = s.strip_suffix('s') {
        let secs: u64 = num_str.trim().parse()?;
        Ok(Duration::from_secs(secs))
    } else if let Some(num_str) = s.strip_suffix('m') {
        let mins: u64 = num_str.trim().parse()?;
        scaled_secs(mins, 60)
    } else if let Some(num_str) = s.strip_suffix('h') {
        let hours: u64 = num_str.trim().parse()?;
        scaled_secs(hours, 3600)
    } else {
        let secs: u64 = s.parse()?;
        Ok(Duration::from_secs(secs))
    }
}

fn scaled_secs(count: u64, unit: u64) -> Result<Duration> {
    match count.checked_mul(unit) {
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => bail!("duration too large"),
    }
}

/// Split a comma-separated list, dropping empty entries
pub fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(String::from)
        .collect()
}
