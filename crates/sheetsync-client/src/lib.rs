//! CLI, configuration and the sync run orchestrator
//!
//! This crate provides the `sheetsync` command-line interface.

pub mod backup;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod runner;
pub mod secret;

pub use cli::Cli;
pub use error::{ClientError, ClientResult};
pub use runner::{RunOutcome, RunReport, SyncSettings};
