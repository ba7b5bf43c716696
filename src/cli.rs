// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `rebuildd`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "rebuildd",
    version,
    about = "Plan dependency-ordered rebuilds from upstream change messages.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value = crate::config::DEFAULT_CONFIG_PATH)]
    pub config: String,

    /// JSON snapshot of the external systems (advisories, images, modules,
    /// composes) served from memory.
    #[arg(long, value_name = "PATH")]
    pub inventory: Option<String>,

    /// Read newline-delimited JSON messages from this file instead of stdin.
    #[arg(long, value_name = "PATH")]
    pub messages: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `REBUILDD_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate config, print subscriptions and rules, then exit.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
