//! Configuration for the sampling commands
//!
//! Defaults come from the environment; command-line flags override them.

use gpuctr_profiler::{FailurePolicy, DEFAULT_WINDOW};
use gpuctr_shared::utils::{parse_duration, split_list};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Sampling window per counter
    pub window: Duration,

    /// Fields sampled when none are given (empty = built-in list)
    pub fields: Vec<String>,

    /// What to do when one device fails
    pub policy: FailurePolicy,

    /// Simulated device description used instead of hardware
    pub simulate: Option<PathBuf>,
}

impl SamplerConfig {
    /// Build a configuration from an environment lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let isolate = lookup("GPUCTR_ISOLATE_DEVICES")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Self {
            window: lookup("GPUCTR_WINDOW")
                .and_then(|s| parse_duration(&s).ok())
                .unwrap_or(DEFAULT_WINDOW),
            fields: lookup("GPUCTR_FIELDS")
                .map(|s| split_list(&s))
                .unwrap_or_default(),
            policy: if isolate {
                FailurePolicy::IsolateDevice
            } else {
                FailurePolicy::Abort
            },
            simulate: lookup("GPUCTR_SIMULATE").map(PathBuf::from),
        }
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> SamplerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SamplerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);
        assert_eq!(config.window, Duration::from_micros(10));
        assert!(config.fields.is_empty());
        assert_eq!(config.policy, FailurePolicy::Abort);
        assert!(config.simulate.is_none());
    }

    #[test]
    fn test_environment_overrides() {
        let config = config(&[
            ("GPUCTR_WINDOW", "5ms"),
            ("GPUCTR_FIELDS", "SQ_WAVES, GRBM_COUNT"),
            ("GPUCTR_ISOLATE_DEVICES", "true"),
            ("GPUCTR_SIMULATE", "/tmp/devices.toml"),
        ]);
        assert_eq!(config.window, Duration::from_millis(5));
        assert_eq!(config.fields, vec!["SQ_WAVES", "GRBM_COUNT"]);
        assert_eq!(config.policy, FailurePolicy::IsolateDevice);
        assert_eq!(config.simulate, Some(PathBuf::from("/tmp/devices.toml")));
    }

    #[test]
    fn test_bad_window_falls_back() {
        let config = config(&[("GPUCTR_WINDOW", "soon")]);
        assert_eq!(config.window, DEFAULT_WINDOW);
    }
}
