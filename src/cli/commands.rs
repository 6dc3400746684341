//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// IoT time-series preload CLI
#[derive(Parser, Debug)]
#[command(name = "iot-preload")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Job definition file (YAML)
    #[arg(short, long, global = true)]
    pub job: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one preload cycle
    Run {
        /// Write to memory and leave the cursor alone
        #[arg(long)]
        dry_run: bool,
    },

    /// Check that the source can be reached
    Check,

    /// List OSI-Pi points or elements
    List {
        /// Include element attributes
        #[arg(long)]
        attributes: bool,

        /// Only elements whose path starts with this prefix
        #[arg(long)]
        path_prefix: Option<String>,
    },

    /// Show, set or reset the job's cursor
    Cursor {
        /// New cursor value (sequence number or timestamp)
        #[arg(long, conflicts_with = "reset")]
        set: Option<String>,

        /// Remove the cursor; the next cycle starts from the lookback window
        #[arg(long)]
        reset: bool,

        /// List every stored cursor
        #[arg(long, conflicts_with_all = ["set", "reset"])]
        all: bool,
    },

    /// Validate the job definition
    Validate,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one message per line)
    Json,
    /// Human-readable output
    Pretty,
}
