//! Normalized chat records.
//!
//! A [`Record`] is one inbound message after the record source has resolved
//! who sent it and where it lives. Records are immutable once built; the
//! merge engine only ever reads them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Which sender group a message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// The author is a member of the configured internal group.
    Internal,
    /// Anyone else.
    External,
}

impl Origin {
    /// Returns a stable machine-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::External => "external",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message, normalized for the spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// When the message was posted.
    pub timestamp: DateTime<Utc>,

    /// Sender group.
    pub origin: Origin,

    /// Message body as posted.
    pub source_text: String,

    /// Stable link to the message, when the source can build one.
    pub source_ref: Option<Url>,

    /// Additional named values, in insertion order.
    pub extra_fields: Vec<(String, String)>,
}

impl Record {
    /// Creates a record without a reference link or extra fields.
    pub fn new(timestamp: DateTime<Utc>, origin: Origin, source_text: impl Into<String>) -> Self {
        Self {
            timestamp,
            origin,
            source_text: source_text.into(),
            source_ref: None,
            extra_fields: Vec::new(),
        }
    }

    /// Builder method to set the reference link.
    pub fn with_source_ref(mut self, source_ref: Url) -> Self {
        self.source_ref = Some(source_ref);
        self
    }

    /// Builder method to set an extra field.
    ///
    /// Setting a name twice replaces the earlier value in place.
    pub fn with_extra_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.extra_fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = value,
            None => self.extra_fields.push((name, value)),
        }
        self
    }

    /// Returns the value of an extra field, if present.
    pub fn extra_field(&self, name: &str) -> Option<&str> {
        self.extra_fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}
