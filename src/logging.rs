//! Tracing subscriber set-up.
//!
//! Diagnostics go to stderr so that command output on stdout stays clean.

use std::env;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line, human-readable
    #[default]
    Pretty,
    /// Single line per event
    Compact,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Filter used when `RUST_LOG` is not set
    pub default_level: String,
    pub timestamps: bool,
    pub include_target: bool,
    pub include_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            default_level: "info".to_string(),
            timestamps: true,
            include_target: true,
            include_location: false,
        }
    }
}

impl LogConfig {
    /// Reads:
    /// - `LOG_FORMAT`: pretty, compact, or json
    /// - `LOG_LEVEL`: default filter (fallback if RUST_LOG not set)
    /// - `LOG_TIMESTAMPS`: `none`/`off` disables timestamps
    /// - `LOG_LOCATION`: true/false for file:line info
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            format: env::var("LOG_FORMAT")
                .map(|s| LogFormat::parse(&s))
                .unwrap_or_default(),
            default_level: env::var("LOG_LEVEL").unwrap_or(defaults.default_level),
            timestamps: env::var("LOG_TIMESTAMPS")
                .map(|s| !matches!(s.to_lowercase().as_str(), "none" | "off"))
                .unwrap_or(defaults.timestamps),
            include_target: defaults.include_target,
            include_location: env::var("LOG_LOCATION")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(defaults.include_location),
        }
    }

    pub fn with_default_level(mut self, level: impl Into<String>) -> Self {
        self.default_level = level.into();
        self
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns an error if a global subscriber is already set.
pub fn init_logging(config: LogConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_level));
    let registry = tracing_subscriber::registry().with(env_filter);

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(config.include_target)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    match (config.format, config.timestamps) {
        (LogFormat::Json, true) => registry.with(layer.json()).try_init()?,
        (LogFormat::Json, false) => registry.with(layer.json().without_time()).try_init()?,
        (LogFormat::Compact, true) => registry.with(layer.compact()).try_init()?,
        (LogFormat::Compact, false) => registry.with(layer.compact().without_time()).try_init()?,
        (LogFormat::Pretty, true) => registry.with(layer.pretty()).try_init()?,
        (LogFormat::Pretty, false) => registry.with(layer.pretty().without_time()).try_init()?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("compact"), LogFormat::Compact);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("unknown"), LogFormat::Pretty);
    }

    #[test]
    fn log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.default_level, "info");
        assert!(config.timestamps);
        assert!(!config.include_location);
    }

    #[test]
    fn with_default_level_overrides() {
        let config = LogConfig::default().with_default_level("barreplay=debug");
        assert_eq!(config.default_level, "barreplay=debug");
    }
}
