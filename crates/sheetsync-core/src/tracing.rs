//! Log setup for the `sheetsync` binary.
//!
//! Everything goes to stderr; stdout carries only the run report. A run
//! started by a scheduler usually passes `--log-format json` so that each
//! event is one line with its fields flattened next to the message.

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Errors that can occur during tracing initialization
#[derive(Debug, Error)]
pub enum TracingError {
    /// A global subscriber is already installed
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    /// `RUST_LOG` holds a directive that does not parse
    #[error("failed to parse env filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),
}

/// Output format for log lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    /// Multi-line human-readable format
    #[default]
    Pretty,
    /// Single-line format
    Compact,
    /// One JSON object per line
    Json,
}

/// Configuration for tracing initialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Level for the sheetsync crates when `RUST_LOG` is unset
    pub level: Level,
    /// Output format
    pub format: TracingOutputFormat,
    /// Whether to include file and line of each event
    pub include_location: bool,
    /// Whether to prefix text lines with a timestamp
    pub include_timestamp: bool,
}

impl TracingConfig {
    /// Config for the command line.
    ///
    /// Text output is bare (a terminal or a journal adds its own time). JSON
    /// always carries a timestamp. `debug` lowers the level to DEBUG and adds
    /// source locations.
    #[must_use]
    pub fn for_cli(debug: bool, format: TracingOutputFormat) -> Self {
        Self {
            level: if debug { Level::DEBUG } else { Level::INFO },
            format,
            include_location: debug,
            include_timestamp: format == TracingOutputFormat::Json,
        }
    }

    /// The filter used when `RUST_LOG` is unset: our crates at the configured
    /// level, dependencies (reqwest, hyper, calamine) at warnings only.
    pub fn default_directive(&self) -> String {
        format!("warn,sheetsync={}", self.level)
    }

    fn env_filter(&self) -> Result<EnvFilter, TracingError> {
        match std::env::var(EnvFilter::DEFAULT_ENV) {
            Ok(directive) if !directive.trim().is_empty() => Ok(EnvFilter::try_new(directive)?),
            _ => Ok(EnvFilter::try_new(self.default_directive())?),
        }
    }
}

/// Install the global subscriber. Call once at startup.
///
/// # Errors
///
/// Returns an error if a subscriber is already installed or if `RUST_LOG`
/// does not parse.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let env_filter = config.env_filter()?;

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_target(config.include_location);

    let layer = match config.format {
        TracingOutputFormat::Pretty => layer.pretty().boxed(),
        TracingOutputFormat::Compact if config.include_timestamp => layer.compact().boxed(),
        TracingOutputFormat::Compact => layer.compact().without_time().boxed(),
        TracingOutputFormat::Json => layer.json().flatten_event(true).boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(env_filter).with(layer);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
