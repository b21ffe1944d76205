//! The path-addressable file host seam and an in-memory implementation.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{ExchangeDiagnostics, HostError};
use crate::source::BoxFuture;

/// Metadata returned by a probe or a write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    /// Item id assigned by the host.
    #[serde(default)]
    pub id: Option<String>,
    /// File name.
    #[serde(default)]
    pub name: Option<String>,
    /// Size in bytes.
    #[serde(default)]
    pub size: Option<u64>,
    /// Entity tag of the current version.
    #[serde(default, rename = "eTag")]
    pub etag: Option<String>,
    /// Last modification time.
    #[serde(default, rename = "lastModifiedDateTime")]
    pub last_modified: Option<DateTime<Utc>>,
}

/// A remote file host addressed by absolute paths (`/Documents/a.xlsx`).
///
/// Implementations classify failures into [`HostError`] variants; in
/// particular a missing path is always [`HostError::NotFound`] and a
/// locked or conflicting write is always [`HostError::Locked`].
pub trait FileHost: Send + Sync {
    /// Probes `path`.
    fn metadata<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<FileMetadata, HostError>>;

    /// Reads the bytes at `path`.
    fn get_content<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, HostError>>;

    /// Creates or replaces the file at `path`.
    fn put_content<'a>(
        &'a self,
        path: &'a str,
        bytes: &'a [u8],
        content_type: &'a str,
    ) -> BoxFuture<'a, Result<FileMetadata, HostError>>;
}

/// A file host kept in memory, with switches to simulate failures.
#[derive(Debug, Default)]
pub struct MemoryFileHost {
    inner: Mutex<MemoryHostState>,
}

#[derive(Debug, Default)]
struct MemoryHostState {
    files: BTreeMap<String, Vec<u8>>,
    locked: HashSet<String>,
    failing_puts: Option<u16>,
    failing_gets: Option<u16>,
    puts: Vec<String>,
}

impl MemoryFileHost {
    /// Creates an empty host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `bytes` at `path` without counting it as a write.
    pub fn insert(&self, path: impl Into<String>, bytes: Vec<u8>) {
        self.state().files.insert(path.into(), bytes);
    }

    /// Returns the bytes at `path`.
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state().files.get(path).cloned()
    }

    /// Returns every stored path, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.state().files.keys().cloned().collect()
    }

    /// Paths written through `put_content`, in order.
    pub fn writes(&self) -> Vec<String> {
        self.state().puts.clone()
    }

    /// Makes writes to `path` answer as locked.
    pub fn lock(&self, path: impl Into<String>) {
        self.state().locked.insert(path.into());
    }

    /// Makes every write fail with `status`.
    pub fn fail_puts(&self, status: u16) {
        self.state().failing_puts = Some(status);
    }

    /// Makes every read and probe fail with `status`.
    pub fn fail_gets(&self, status: u16) {
        self.state().failing_gets = Some(status);
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryHostState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, HostError> {
        let state = self.state();
        if let Some(status) = state.failing_gets {
            return Err(HostError::Status(ExchangeDiagnostics::with_status(status)));
        }
        state.files.get(path).cloned().ok_or_else(|| {
            HostError::NotFound(
                ExchangeDiagnostics::with_status(404).with_error_code("itemNotFound"),
            )
        })
    }

    fn write(&self, path: &str, bytes: &[u8]) -> Result<FileMetadata, HostError> {
        let mut state = self.state();
        if state.locked.contains(path) {
            return Err(HostError::Locked(
                ExchangeDiagnostics::with_status(423).with_error_code("resourceLocked"),
            ));
        }
        if let Some(status) = state.failing_puts {
            return Err(HostError::Status(ExchangeDiagnostics::with_status(status)));
        }
        state.files.insert(path.to_string(), bytes.to_vec());
        state.puts.push(path.to_string());
        Ok(metadata_for(path, bytes.len()))
    }
}

fn metadata_for(path: &str, len: usize) -> FileMetadata {
    FileMetadata {
        name: path.rsplit('/').next().map(String::from),
        size: Some(len as u64),
        ..FileMetadata::default()
    }
}

impl FileHost for MemoryFileHost {
    fn metadata<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<FileMetadata, HostError>> {
        let result = self.read(path).map(|bytes| metadata_for(path, bytes.len()));
        Box::pin(async move { result })
    }

    fn get_content<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, HostError>> {
        let result = self.read(path);
        Box::pin(async move { result })
    }

    fn put_content<'a>(
        &'a self,
        path: &'a str,
        bytes: &'a [u8],
        _content_type: &'a str,
    ) -> BoxFuture<'a, Result<FileMetadata, HostError>> {
        let result = self.write(path, bytes);
        Box::pin(async move { result })
    }
}
