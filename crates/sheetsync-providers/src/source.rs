//! RecordSource trait definition.
//!
//! A record source turns an external message stream (a chat channel) into
//! [`Record`]s for a time window. Sources return records in the provider's
//! native order, which for chat histories is newest first; callers reorder
//! before merging.

use std::future::Future;
use std::pin::Pin;

use sheetsync_core::{FetchWindow, Record};

use crate::error::{ProviderError, ProviderResult};

/// A boxed future for async trait methods.
///
/// Boxed futures keep the traits object-safe so that the orchestrator can
/// hold `&dyn RecordSource` and `&dyn FileHost`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Produces records for a time window.
///
/// Implementations handle pagination and rate limiting internally and return
/// every record in the window.
pub trait RecordSource: Send + Sync {
    /// Returns the name of this source (e.g. "slack").
    fn name(&self) -> &str;

    /// Fetches all records whose timestamp falls inside `window`.
    fn fetch_records(&self, window: FetchWindow) -> BoxFuture<'_, ProviderResult<Vec<Record>>>;
}

/// A source that serves a fixed list of records.
///
/// Records are returned in the order given, filtered by window. Used by
/// tests and dry runs against canned data.
#[derive(Debug, Default)]
pub struct StaticRecordSource {
    name: String,
    records: Vec<Record>,
    error: Option<ProviderError>,
}

impl StaticRecordSource {
    /// Creates a source serving `records`.
    pub fn new(name: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            name: name.into(),
            records,
            error: None,
        }
    }

    /// Creates a source that always fails with `error`.
    pub fn failing(name: impl Into<String>, error: ProviderError) -> Self {
        Self {
            name: name.into(),
            records: Vec::new(),
            error: Some(error),
        }
    }
}

impl RecordSource for StaticRecordSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_records(&self, window: FetchWindow) -> BoxFuture<'_, ProviderResult<Vec<Record>>> {
        // ProviderError is not Clone; rebuild it from its parts
        let result = match self.error {
            Some(ref error) => Err(ProviderError::new(error.code(), error.message())
                .with_provider(&self.name)),
            None => Ok(self
                .records
                .iter()
                .filter(|r| window.contains(r.timestamp))
                .cloned()
                .collect()),
        };
        Box::pin(async move { result })
    }
}
