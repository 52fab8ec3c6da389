//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// airq-ingest - Air-quality sensor ingestion pipeline
#[derive(Parser, Debug)]
#[command(
    name = "airq-ingest",
    author,
    version,
    about = "Air-quality sensor ingestion pipeline",
    long_about = "Polls manufacturer sensor APIs on per-source schedules, normalizes \n\
                  readings to one canonical shape, validates and scores them, and \n\
                  publishes micro-batches to a message bus and a time-series store."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "AIRQ_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "AIRQ_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the ingestion pipeline until interrupted
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "config.toml", env = "AIRQ_CONFIG")]
    pub config: PathBuf,

    /// Stop after this many seconds (0 = run until signalled)
    #[arg(long, default_value = "0", env = "AIRQ_MAX_RUNTIME")]
    pub max_runtime: u64,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "9000", env = "AIRQ_METRICS_PORT")]
    pub metrics_port: u16,

    /// Log per-source status every N seconds (0 = never)
    #[arg(long, default_value = "60", env = "AIRQ_STATUS_INTERVAL")]
    pub status_interval: u64,

    /// Do not re-read sources from the config file while running
    #[arg(long)]
    pub no_refresh: bool,

    /// Validate configuration and build adapters, then exit
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "config.toml", env = "AIRQ_CONFIG")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", env = "AIRQ_CONFIG")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show detailed source information
    #[arg(long)]
    pub sources: bool,

    /// Show sink configuration
    #[arg(long)]
    pub sinks: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
