//! Command-line argument definitions.

use std::path::PathBuf;

use clap::Parser;

/// Batch QoE analyzer for video-playback telemetry.
///
/// Reads the telemetry stream from stdin, reconstructs per-client viewing
/// sessions, and reports a validity verdict plus quality-of-experience
/// metrics for each, followed by global totals.
#[derive(Debug, Parser)]
#[command(name = "qoe", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the experiment settings dump (one `<id> <json>` per line).
    pub experiment_dump: PathBuf,
}
