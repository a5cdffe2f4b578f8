use std::io;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use qoe_cli::memory::MemoryWatchdog;
use qoe_cli::{Cli, Config, analyze};
use qoe_core::ExperimentTable;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests).
    // Diagnostics go to stderr; stdout carries the report.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    let experiments = ExperimentTable::load(&cli.experiment_dump).with_context(|| {
        format!(
            "failed to load experiment dump {}",
            cli.experiment_dump.display()
        )
    })?;

    let watchdog = MemoryWatchdog::new(config.memory_ceiling_kib, config.memcheck_interval_lines);

    let stdin = io::stdin().lock();
    let stdout = io::stdout().lock();
    analyze::run(&experiments, stdin, stdout, watchdog)?;

    Ok(())
}
