//! Sample command implementation

use anyhow::{Context, Result};
use clap::Args;
use gpuctr_profiler::{FailurePolicy, ReportDriver, ReportOutcome, SamplerRegistry};
use std::path::PathBuf;
use tracing::info;

use crate::backend::open_registry;
use crate::config::SamplerConfig;
use crate::output;

#[derive(Args, Debug)]
pub struct SampleArgs {
    /// Counter names to sample (default: built-in field list)
    pub fields: Vec<String>,

    /// Sampling window per counter (e.g. "10us", "5ms")
    #[arg(short, long)]
    pub window: Option<String>,

    /// Keep sampling the remaining devices when one fails
    #[arg(long)]
    pub isolate_devices: bool,

    /// Write the report to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: SampleArgs, config: &SamplerConfig) -> Result<()> {
    let mut registry = open_registry(config.simulate.as_deref())?;
    let outcome = sample(&args, config, &mut registry)?;

    output::write_report(&outcome.report, args.output.as_deref())?;
    if let Some(path) = &args.output {
        info!("Report written to {}", path.display());
    }

    if !outcome.is_success() {
        for failure in &outcome.failures {
            output::warning(&format!("device {}: {:#}", failure.device, failure.error));
        }
        anyhow::bail!("Sampling failed on {} device(s)", outcome.failures.len());
    }
    Ok(())
}

fn sample(
    args: &SampleArgs,
    config: &SamplerConfig,
    registry: &mut SamplerRegistry,
) -> Result<ReportOutcome> {
    let window = super::resolve_window(args.window.as_deref(), config.window)?;
    let policy = if args.isolate_devices {
        FailurePolicy::IsolateDevice
    } else {
        config.policy
    };
    let fields = if args.fields.is_empty() {
        &config.fields
    } else {
        &args.fields
    };

    info!(
        "Sampling {} on {} device(s), window {:?}",
        if fields.is_empty() {
            "default fields".to_string()
        } else {
            format!("{} field(s)", fields.len())
        },
        registry.len(),
        window
    );

    ReportDriver::new(window)
        .with_policy(policy)
        .run(registry, fields)
        .context("Error while sampling counter values")
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpuctr_profiler::backend::simulated::{CounterSpec, DeviceSpec, SimOp, SimulatedBackend};
    use gpuctr_profiler::backend::DeviceId;
    use std::sync::Arc;
    use std::time::Duration;

    fn args(fields: &[&str]) -> SampleArgs {
        SampleArgs {
            fields: fields.iter().map(|s| s.to_string()).collect(),
            window: Some("1us".to_string()),
            isolate_devices: false,
            output: None,
        }
    }

    fn config() -> SamplerConfig {
        SamplerConfig {
            window: Duration::from_micros(10),
            fields: vec!["GRBM_COUNT".to_string()],
            policy: FailurePolicy::Abort,
            simulate: None,
        }
    }

    fn backend() -> Arc<SimulatedBackend> {
        Arc::new(SimulatedBackend::new(vec![
            DeviceSpec::gpu("gfx942")
                .counter(CounterSpec::new("SQ_WAVES").dimension("SE", 4).value(2.0))
                .counter(CounterSpec::new("GRBM_COUNT").value(100.0)),
            DeviceSpec::gpu("gfx90a").counter(CounterSpec::new("SQ_WAVES").value(3.0)),
        ]))
    }

    #[test]
    fn test_explicit_fields() {
        let backend = backend();
        let mut registry = SamplerRegistry::discover(backend.clone()).unwrap();

        let outcome = sample(&args(&["SQ_WAVES"]), &config(), &mut registry).unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.report.gpus[0].value_of("SQ_WAVES"), Some(8.0));
        assert_eq!(outcome.report.gpus[1].value_of("SQ_WAVES"), Some(3.0));
    }

    #[test]
    fn test_configured_fields_used_when_none_given() {
        let backend = backend();
        let mut registry = SamplerRegistry::discover(backend.clone()).unwrap();

        let outcome = sample(&args(&[]), &config(), &mut registry).unwrap();
        assert_eq!(outcome.report.gpus[0].value_of("GRBM_COUNT"), Some(100.0));
        assert!(outcome.report.gpus[1].metrics.is_empty());
    }

    #[test]
    fn test_isolate_flag() {
        let backend = backend();
        let mut registry = SamplerRegistry::discover(backend.clone()).unwrap();
        backend.fail_on(SimOp::Sample, Some(DeviceId(0)));

        let mut isolated = args(&["SQ_WAVES"]);
        isolated.isolate_devices = true;
        let outcome = sample(&isolated, &config(), &mut registry).unwrap();
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.report.device(0).is_none());
        let survivor = outcome.report.device(1).unwrap();
        assert_eq!(survivor.value_of("SQ_WAVES"), Some(3.0));

        assert!(sample(&args(&["SQ_WAVES"]), &config(), &mut registry).is_err());
    }
}
