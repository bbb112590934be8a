//! Records command implementation
//!
//! Samples the requested counters together under one profile and prints
//! every raw record with its counter name and dimension positions.

use anyhow::{Context, Result};
use clap::Args;
use gpuctr_profiler::{RecordView, SamplerRegistry};
use serde::Serialize;
use std::io::Write;
use std::time::Duration;

use crate::backend::open_registry;
use crate::config::SamplerConfig;

#[derive(Args, Debug)]
pub struct RecordsArgs {
    /// Counter names to sample
    #[arg(required = true)]
    pub fields: Vec<String>,

    /// Sampling window (e.g. "10us", "5ms")
    #[arg(short, long)]
    pub window: Option<String>,

    /// Only sample this device index
    #[arg(short, long)]
    pub device: Option<usize>,
}

#[derive(Debug, Serialize)]
struct RecordLine<'a> {
    device: usize,
    #[serde(flatten)]
    record: &'a RecordView,
}

pub fn run(args: RecordsArgs, config: &SamplerConfig) -> Result<()> {
    let window = super::resolve_window(args.window.as_deref(), config.window)?;
    let mut registry = open_registry(config.simulate.as_deref())?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for (device, views) in collect_records(&mut registry, &args.fields, args.device, window)? {
        for record in &views {
            serde_json::to_writer(&mut out, &RecordLine { device, record })?;
            writeln!(out)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn collect_records(
    registry: &mut SamplerRegistry,
    fields: &[String],
    only: Option<usize>,
    window: Duration,
) -> Result<Vec<(usize, Vec<RecordView>)>> {
    if let Some(index) = only {
        if index >= registry.len() {
            anyhow::bail!("No device with index {}", index);
        }
    }

    let mut records = Vec::new();
    let mut collected = Vec::new();
    for (index, sampler) in registry.iter_mut().enumerate() {
        if only.is_some_and(|d| d != index) {
            continue;
        }
        sampler
            .sample_counter_values(fields, &mut records, window)
            .with_context(|| format!("Error while sampling counter values on device {}", index))?;
        let views = sampler
            .describe_records(&records)
            .with_context(|| format!("Failed to decode records on device {}", index))?;
        collected.push((index, views));
    }
    Ok(collected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpuctr_profiler::backend::simulated::{CounterSpec, DeviceSpec, SimulatedBackend};
    use std::sync::Arc;

    fn registry() -> SamplerRegistry {
        let backend = SimulatedBackend::new(vec![
            DeviceSpec::gpu("gfx942")
                .counter(
                    CounterSpec::new("SQ_WAVES")
                        .dimension("SE", 2)
                        .values(vec![1.0, 2.0]),
                )
                .counter(CounterSpec::new("GRBM_COUNT").value(9.0)),
            DeviceSpec::gpu("gfx90a").counter(CounterSpec::new("SQ_WAVES").dimension("SE", 4)),
        ]);
        SamplerRegistry::discover(Arc::new(backend)).unwrap()
    }

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_records_in_profile_order() {
        let mut registry = registry();
        let collected = collect_records(
            &mut registry,
            &fields(&["SQ_WAVES", "GRBM_COUNT"]),
            Some(0),
            Duration::from_micros(1),
        )
        .unwrap();

        assert_eq!(collected.len(), 1);
        let (device, views) = &collected[0];
        assert_eq!(*device, 0);
        assert_eq!(views.len(), 3);
        assert_eq!(views[1].counter, "SQ_WAVES");
        assert_eq!(views[1].value, 2.0);
        assert_eq!(views[1].dimensions.get("SE"), Some(&1));
        assert_eq!(views[2].counter, "GRBM_COUNT");
    }

    #[test]
    fn test_record_line_json() {
        let mut registry = registry();
        let collected = collect_records(
            &mut registry,
            &fields(&["GRBM_COUNT"]),
            None,
            Duration::from_micros(1),
        )
        .unwrap();

        assert_eq!(collected.len(), 2);
        assert!(collected[1].1.is_empty());

        let line = serde_json::to_value(RecordLine {
            device: 0,
            record: &collected[0].1[0],
        })
        .unwrap();
        assert_eq!(line["device"], 0);
        assert_eq!(line["counter"], "GRBM_COUNT");
        assert_eq!(line["value"], 9.0);
    }

    #[test]
    fn test_unknown_device() {
        let mut registry = registry();
        let result = collect_records(
            &mut registry,
            &fields(&["SQ_WAVES"]),
            Some(3),
            Duration::from_micros(1),
        );
        assert!(result.is_err());
    }
}
