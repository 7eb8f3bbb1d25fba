use std::path::PathBuf;

use clap::Parser;

/// Tails configured log files, extracts metrics from each matching line, and
/// exposes the aggregated result over Prometheus.
#[derive(Parser, Debug)]
#[command(name = "log2metrics-agent", version, about)]
pub struct CliArgs {
    /// Path to the YAML configuration file.
    #[arg(short = 'c', long = "config.file", default_value = "log2metrics-agent.yaml")]
    pub config_file: PathBuf,
}
