//! CLI for gpuctr
//!
//! Samples GPU hardware counters and prints an aggregated report:
//! - sample: Sample counters on every device and print the JSON report
//! - list: List the counters each device supports
//! - records: Dump decoded raw records for a set of counters

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod backend;
mod commands;
mod config;
mod output;

use config::SamplerConfig;

#[derive(Parser)]
#[command(name = "gpuctr")]
#[command(about = "gpuctr - GPU hardware counter sampler", long_about = None)]
#[command(version)]
struct Cli {
    /// Sample a simulated device description (TOML) instead of hardware
    #[arg(long, global = true)]
    simulate: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample counters on every device and print the aggregated report
    Sample(commands::sample::SampleArgs),

    /// List the counters each device supports
    List(commands::list::ListArgs),

    /// Dump decoded raw records, one JSON object per line
    Records(commands::records::RecordsArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = SamplerConfig::default();
    if cli.simulate.is_some() {
        config.simulate = cli.simulate;
    }

    let result = match cli.command {
        Commands::Sample(args) => commands::sample::run(args, &config),
        Commands::List(args) => commands::list::run(args, &config),
        Commands::Records(args) => commands::records::run(args, &config),
    };
    if let Err(e) = &result {
        output::error(&format!("{:#}", e));
    }
    result
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
