//! Report driver
//!
//! Samples each requested counter on its own, device by device, and sums the
//! records of a counter across all of its dimension instances into a single
//! value. Counters a device does not support produce no entry.

use crate::backend::CounterRecord;
use crate::error::{Result, SamplerError};
use crate::registry::SamplerRegistry;
use crate::sampler::CounterSampler;
use gpuctr_shared::{default_fields, DeviceMetrics, GpuReport};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

/// Sampling window used when none is configured
pub const DEFAULT_WINDOW: Duration = Duration::from_micros(10);

/// What to do when sampling fails on one device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Stop at the first failure and fail the whole run
    #[default]
    Abort,
    /// Leave the failing device out of the report and carry on
    IsolateDevice,
}

/// A device left out of the report
#[derive(Debug)]
pub struct DeviceFailure {
    pub device: usize,
    pub error: SamplerError,
}

/// Result of one report run
#[derive(Debug, Default)]
pub struct ReportOutcome {
    pub report: GpuReport,
    pub failures: Vec<DeviceFailure>,
}

impl ReportOutcome {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Builds counter reports from a sampler registry
#[derive(Debug, Clone)]
pub struct ReportDriver {
    window: Duration,
    policy: FailurePolicy,
}

impl Default for ReportDriver {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl ReportDriver {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            policy: FailurePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Sample `fields` on every device. An empty list samples [`DEFAULT_FIELDS`].
    ///
    /// [`DEFAULT_FIELDS`]: gpuctr_shared::DEFAULT_FIELDS
    pub fn run(&self, registry: &mut SamplerRegistry, fields: &[String]) -> Result<ReportOutcome> {
        let defaults;
        let fields = if fields.is_empty() {
            defaults = default_fields();
            &defaults[..]
        } else {
            fields
        };

        let mut outcome = ReportOutcome::default();
        for (index, sampler) in registry.iter_mut().enumerate() {
            match self.sample_device(index, sampler, fields) {
                Ok(metrics) => outcome.report.gpus.push(metrics),
                Err(e) => {
                    error!("Error while sampling counter values on device {}: {}", index, e);
                    match self.policy {
                        FailurePolicy::Abort => return Err(e),
                        FailurePolicy::IsolateDevice => outcome.failures.push(DeviceFailure {
                            device: index,
                            error: e,
                        }),
                    }
                }
            }
        }
        Ok(outcome)
    }

    /// Sample each field on one device
    pub fn sample_device(
        &self,
        index: usize,
        sampler: &mut CounterSampler,
        fields: &[String],
    ) -> Result<DeviceMetrics> {
        let mut metrics = DeviceMetrics::new(index);
        let mut records = Vec::new();

        for field in fields {
            sampler.sample_counter_values(std::slice::from_ref(field), &mut records, self.window)?;
            if records.is_empty() {
                debug!("Skipping {} on device {}: no records", field, index);
                continue;
            }
            metrics.push(field.as_str(), aggregate(&records));
        }
        Ok(metrics)
    }
}

/// Sum record values across dimension instances
pub fn aggregate(records: &[CounterRecord]) -> f64 {
    records.iter().map(|r| r.value).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::simulated::{CounterSpec, DeviceSpec, SimOp, SimulatedBackend};
    use crate::backend::{DeviceId, RecordId};
    use std::sync::Arc;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn two_devices() -> Arc<SimulatedBackend> {
        Arc::new(SimulatedBackend::new(vec![
            DeviceSpec::gpu("gfx942")
                .counter(CounterSpec::new("A").dimension("SE", 3).values(vec![1.5, 2.5, 3.0]))
                .counter(CounterSpec::new("B").value(4.0)),
            DeviceSpec::gpu("gfx90a").counter(CounterSpec::new("A").value(2.0)),
        ]))
    }

    #[test]
    fn test_aggregate_sums_values() {
        let records: Vec<_> = [1.5, 2.5, 3.0]
            .iter()
            .enumerate()
            .map(|(i, &value)| CounterRecord {
                id: RecordId(i as u64),
                value,
            })
            .collect();
        assert_eq!(aggregate(&records), 7.0);
        assert_eq!(aggregate(&[]), 0.0);
    }

    #[test]
    fn test_two_device_report() {
        let mut registry = SamplerRegistry::discover(two_devices()).unwrap();
        let outcome = ReportDriver::new(Duration::ZERO)
            .run(&mut registry, &fields(&["A", "B"]))
            .unwrap();

        assert!(outcome.is_success());
        let report = outcome.report;
        assert_eq!(report.gpus.len(), 2);

        let gpu0 = report.device(0).unwrap();
        assert_eq!(gpu0.metrics.len(), 2);
        assert_eq!(gpu0.value_of("A"), Some(7.0));
        assert_eq!(gpu0.value_of("B"), Some(4.0));

        let gpu1 = report.device(1).unwrap();
        assert_eq!(gpu1.metrics.len(), 1);
        assert_eq!(gpu1.metrics[0].field, "A");
        assert_eq!(gpu1.value_of("B"), None);
    }

    #[test]
    fn test_empty_request_uses_default_fields() {
        let backend = Arc::new(SimulatedBackend::new(vec![DeviceSpec::gpu("gfx942")
            .counter(CounterSpec::new("SQ_WAVES").value(8.0))
            .counter(CounterSpec::new("NOT_IN_DEFAULTS").value(1.0))]));
        let mut registry = SamplerRegistry::discover(backend.clone()).unwrap();

        let outcome = ReportDriver::new(Duration::ZERO).run(&mut registry, &[]).unwrap();
        let gpu0 = outcome.report.device(0).unwrap();
        assert_eq!(gpu0.metrics.len(), 1);
        assert_eq!(gpu0.value_of("SQ_WAVES"), Some(8.0));
        // One singleton profile per default field
        assert_eq!(backend.profile_creations(), gpuctr_shared::DEFAULT_FIELDS.len());
    }

    #[test]
    fn test_abort_policy_fails_run() {
        let backend = two_devices();
        let mut registry = SamplerRegistry::discover(backend.clone()).unwrap();
        backend.fail_on(SimOp::Sample, Some(DeviceId(1)));

        let err = ReportDriver::new(Duration::ZERO)
            .run(&mut registry, &fields(&["A"]))
            .unwrap_err();
        assert!(matches!(err, SamplerError::Backend { .. }));
    }

    #[test]
    fn test_isolate_policy_keeps_healthy_devices() {
        let backend = two_devices();
        let mut registry = SamplerRegistry::discover(backend.clone()).unwrap();
        backend.fail_on(SimOp::CreateProfile, Some(DeviceId(0)));

        let outcome = ReportDriver::new(Duration::ZERO)
            .with_policy(FailurePolicy::IsolateDevice)
            .run(&mut registry, &fields(&["A"]))
            .unwrap();

        assert!(!outcome.is_success());
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].device, 0);
        assert_eq!(outcome.report.gpus.len(), 1);
        assert_eq!(outcome.report.device(1).unwrap().value_of("A"), Some(2.0));
    }

    #[test]
    fn test_repeated_reports_reuse_profiles() {
        let backend = two_devices();
        let mut registry = SamplerRegistry::discover(backend.clone()).unwrap();
        let driver = ReportDriver::new(Duration::ZERO);
        for _ in 0..3 {
            driver.run(&mut registry, &fields(&["A", "B"])).unwrap();
        }
        // Two fields on each of two devices
        assert_eq!(backend.profile_creations(), 4);
    }
}
