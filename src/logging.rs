// src/logging.rs

//! Process-wide `tracing` subscriber.
//!
//! `REBUILDD_LOG` takes full `EnvFilter` directives, so one component can be
//! turned up without flooding the rest:
//!
//! ```text
//! REBUILDD_LOG=info,rebuildd::graph=debug,rebuildd::compose=trace
//! ```
//!
//! `--log-level` replaces the base level and keeps any per-module
//! directives from the environment. Output goes to stderr; stdout carries the
//! `--dry-run` report.

use anyhow::{Result, anyhow};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

pub const LOG_ENV: &str = "REBUILDD_LOG";

pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let directives = std::env::var(LOG_ENV).unwrap_or_default();
    let filter = build_filter(cli_level, &directives);

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}

/// Filter from the CLI level and the raw env directives. Unparseable
/// directives are skipped.
fn build_filter(cli_level: Option<LogLevel>, directives: &str) -> EnvFilter {
    let base = cli_level.map(LevelFilter::from).unwrap_or(LevelFilter::INFO);
    let filter = EnvFilter::builder()
        .with_default_directive(base.into())
        .parse_lossy(directives);

    match cli_level {
        Some(level) => filter.add_directive(LevelFilter::from(level).into()),
        None => filter,
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_info() {
        let filter = build_filter(None, "");
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::INFO));
    }

    #[test]
    fn env_directives_can_raise_one_module() {
        let filter = build_filter(None, "warn,rebuildd::graph=trace");
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
        assert!(filter.to_string().contains("rebuildd::graph=trace"));
    }

    #[test]
    fn cli_level_overrides_env_base_level() {
        let filter = build_filter(Some(LogLevel::Debug), "error");
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
    }
}
