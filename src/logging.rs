//! Structured logging setup
//!
//! All crate logging goes through `tracing` with key/value fields
//! (`template = %path`, `method = %id`, `interaction_id = %id`). Binaries
//! install a subscriber once at startup:
//!
//! ```rust,no_run
//! use phasekit::logging::{init_logging_with_config, LogConfig};
//!
//! init_logging_with_config(&LogConfig::from_env()).ok();
//! ```
//!
//! ## Environment Variables
//!
//! | Variable                        | Default | Meaning                          |
//! |---------------------------------|---------|----------------------------------|
//! | `PHASEKIT_LOG_LEVEL`            | `info`  | trace/debug/info/warn/error      |
//! | `PHASEKIT_LOG_FORMAT`           | `json`  | `json` or `pretty`               |
//! | `PHASEKIT_LOG_TARGET_FILTER`    | unset   | comma separated filter directives|
//! | `PHASEKIT_LOG_INCLUDE_LOCATION` | `false` | add file:line to each event      |
//!
//! `RUST_LOG`, when set, takes precedence over `PHASEKIT_LOG_LEVEL`.
//! Events go to stderr; stdout stays free for command output.

use anyhow::{Context, Result};
use std::env;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Log format: JSON for production, pretty-print for development
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// trace/debug/info/warn/error
    pub log_level: String,
    pub format: LogFormat,
    /// Extra filter directives, comma separated
    pub target_filter: Option<String>,
    /// Include file:line location
    pub include_location: bool,
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

impl LogConfig {
    /// Read the configuration from `PHASEKIT_LOG_*` variables
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            log_level: env::var("PHASEKIT_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: LogFormat::parse(
                &env::var("PHASEKIT_LOG_FORMAT").unwrap_or_else(|_| "json".to_string()),
            ),
            target_filter: env::var("PHASEKIT_LOG_TARGET_FILTER")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            include_location: env::var("PHASEKIT_LOG_INCLUDE_LOCATION")
                .map(|v| parse_bool(&v))
                .unwrap_or(false),
        }
    }

    /// Verbose, human-readable output
    #[must_use]
    pub fn default_dev() -> Self {
        Self {
            log_level: "debug".to_string(),
            format: LogFormat::Pretty,
            target_filter: None,
            include_location: true,
        }
    }

    #[must_use]
    pub fn default_prod() -> Self {
        Self {
            log_level: "info".to_string(),
            format: LogFormat::Json,
            target_filter: None,
            include_location: false,
        }
    }

    /// Filter built from `RUST_LOG`, or the level plus target directives
    #[must_use]
    pub fn env_filter(&self) -> EnvFilter {
        let level = parse_level(&self.log_level);
        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
        if let Some(target_filter) = &self.target_filter {
            for directive in target_filter.split(',').map(str::trim).filter(|d| !d.is_empty()) {
                match directive.parse() {
                    Ok(directive) => filter = filter.add_directive(directive),
                    Err(_) => eprintln!("Warning: Invalid log filter directive: {directive}"),
                }
            }
        }
        filter
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::default_prod()
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// A global subscriber is already installed.
pub fn init_logging_with_config(config: &LogConfig) -> Result<()> {
    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    tracing::debug!(
        log_level = %config.log_level,
        format = ?config.format,
        include_location = config.include_location,
        "Logging initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_format_falls_back_to_json() {
        assert_eq!(LogFormat::parse("PRETTY"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("xml"), LogFormat::Json);
    }

    #[test]
    fn presets_differ_in_format_and_level() {
        let dev = LogConfig::default_dev();
        let prod = LogConfig::default_prod();
        assert_eq!(dev.format, LogFormat::Pretty);
        assert!(dev.include_location);
        assert_eq!(prod.log_level, "info");
        assert_eq!(prod.format, LogFormat::Json);
    }

    #[test]
    fn level_parsing_defaults_to_info() {
        assert_eq!(parse_level("WARN"), Level::WARN);
        assert_eq!(parse_level("verbose"), Level::INFO);
        assert!(parse_bool("On"));
        assert!(!parse_bool("0"));
    }

    #[test]
    fn second_init_is_an_error() {
        let config = LogConfig::default_prod();
        init_logging_with_config(&config).ok();
        assert!(init_logging_with_config(&config).is_err());
    }
}
