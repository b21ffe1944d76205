//! Command-line interface definition.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};

use sheetsync_core::TracingOutputFormat;

/// sheetsync - Mirror a chat channel into a spreadsheet on a cloud drive
#[derive(Debug, Parser)]
#[command(name = "sheetsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "SHEETSYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    /// Log line format (logs go to stderr)
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Compact single-line text
    Text,
    /// Multi-line human-readable text
    Pretty,
    /// One JSON object per line, for schedulers
    Json,
}

impl From<LogFormat> for TracingOutputFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Text => TracingOutputFormat::Compact,
            LogFormat::Pretty => TracingOutputFormat::Pretty,
            LogFormat::Json => TracingOutputFormat::Json,
        }
    }
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch new messages and append them to the spreadsheet
    Run {
        /// Only fetch messages posted at or after this RFC 3339 instant
        #[arg(long)]
        since: Option<DateTime<Utc>>,

        /// Only fetch messages posted before this RFC 3339 instant
        #[arg(long)]
        until: Option<DateTime<Utc>>,

        /// Merge and report without uploading anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Authentication commands
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Authentication actions.
#[derive(Debug, Subcommand)]
pub enum AuthAction {
    /// Authorize with the device-code flow and store the refresh token
    Login {
        /// Authorize again even if a refresh token is stored
        #[arg(long, short)]
        force: bool,
    },

    /// Store an existing refresh token (plain, `env::VAR` or `pass::path`)
    Import {
        /// The refresh token or a secret reference to it
        secret_ref: String,
    },

    /// Show whether a refresh token is stored
    Status,

    /// Remove the stored refresh token
    Logout,
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}
