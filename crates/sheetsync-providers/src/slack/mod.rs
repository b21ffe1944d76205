//! Slack channel history as a record source.
//!
//! [`SlackSource`] pages through `conversations.history` for a fetch
//! window, skips messages without an author (joins, bot events), tags each
//! message internal or external by its author's member id, and attaches a
//! permalink when the workspace domain is known.

mod client;
mod config;

pub use client::{AUTHOR_ID_FIELD, SlackSource, parse_ts, permalink};
pub use config::{DEFAULT_PAGE_SIZE, DEFAULT_SLACK_API_BASE, MAX_RETRY_WAIT, SlackConfig};
