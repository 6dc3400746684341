//! CLI module
//!
//! Command-line interface for running preload jobs.
//!
//! # Commands
//!
//! - `run` - Run one preload cycle
//! - `check` - Test connection to the source
//! - `list` - List OSI-Pi points or elements
//! - `cursor` - Show, set or reset cursors
//! - `validate` - Validate the job file

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat};
pub use runner::Runner;
