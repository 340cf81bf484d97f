//! Command-line interface for agenteval.
//!
//! Provides commands for running benchmarks, listing adapters, metrics and
//! benchmarks, and validating task files.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli};
