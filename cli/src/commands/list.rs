//! List command implementation

use anyhow::{Context, Result};
use clap::Args;
use gpuctr_profiler::{CounterSampler, SamplerRegistry};
use serde::Serialize;

use crate::backend::open_registry;
use crate::config::SamplerConfig;
use crate::output;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only list counters of this device index
    #[arg(short, long)]
    pub device: Option<usize>,

    /// Include each counter's dimensions
    #[arg(long)]
    pub dimensions: bool,
}

#[derive(Debug, Serialize)]
struct DeviceCounters {
    device: usize,
    name: String,
    counters: Vec<CounterEntry>,
}

#[derive(Debug, Serialize)]
struct CounterEntry {
    name: String,
    /// Records one sample of this counter produces
    records: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    dimensions: Vec<DimensionEntry>,
}

#[derive(Debug, Serialize)]
struct DimensionEntry {
    name: String,
    size: usize,
}

pub fn run(args: ListArgs, config: &SamplerConfig) -> Result<()> {
    let registry = open_registry(config.simulate.as_deref())?;
    let listing = list_counters(&registry, &args)?;
    output::write_json(&listing, std::io::stdout().lock())
}

fn list_counters(registry: &SamplerRegistry, args: &ListArgs) -> Result<Vec<DeviceCounters>> {
    let indices: Vec<usize> = match args.device {
        Some(index) if index < registry.len() => vec![index],
        Some(index) => anyhow::bail!(
            "No device with index {} ({} device(s) found)",
            index,
            registry.len()
        ),
        None => (0..registry.len()).collect(),
    };

    let mut listing = Vec::with_capacity(indices.len());
    for index in indices {
        let Some(sampler) = registry.get(index) else {
            continue;
        };
        let counters = describe_counters(sampler, args.dimensions)
            .with_context(|| format!("Failed to list counters on device {}", index))?;
        listing.push(DeviceCounters {
            device: index,
            name: registry.devices()[index].name.clone(),
            counters,
        });
    }
    Ok(listing)
}

fn describe_counters(sampler: &CounterSampler, with_dimensions: bool) -> Result<Vec<CounterEntry>> {
    let mut supported: Vec<_> = sampler.supported_counters()?.into_iter().collect();
    supported.sort();

    let mut entries = Vec::with_capacity(supported.len());
    for (name, id) in supported {
        let dimensions = sampler.counter_dimensions(id)?;
        entries.push(CounterEntry {
            name,
            records: dimensions.iter().map(|d| d.instance_size).product(),
            dimensions: if with_dimensions {
                dimensions
                    .into_iter()
                    .map(|d| DimensionEntry {
                        name: d.name,
                        size: d.instance_size,
                    })
                    .collect()
            } else {
                Vec::new()
            },
        });
    }
    Ok(entries)
}
