//! The remote workbook: probe, download, and upload with conflict handling.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use sheetsync_core::{PLACEHOLDER_SHEET, SheetDocument, XLSX_CONTENT_TYPE, encode_xlsx};

use crate::error::{HostError, RemoteError};

use super::host::{FileHost, FileMetadata};

/// Result of [`RemoteStore::ensure_exists`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The document was already there.
    Existing(FileMetadata),
    /// The document was missing and a placeholder workbook was uploaded.
    Created(FileMetadata),
}

/// Result of a successful [`RemoteStore::upload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The document was replaced.
    Committed(FileMetadata),
    /// The document was locked; the bytes were written next to it instead.
    Deferred {
        /// Where the bytes went.
        path: String,
    },
}

/// Client for one workbook on a [`FileHost`].
pub struct RemoteStore<'a> {
    host: &'a dyn FileHost,
    path: String,
    placeholder_sheet: String,
}

impl<'a> RemoteStore<'a> {
    /// Creates a store for the document at `path`.
    pub fn new(host: &'a dyn FileHost, path: impl Into<String>) -> Self {
        Self {
            host,
            path: path.into(),
            placeholder_sheet: PLACEHOLDER_SHEET.to_string(),
        }
    }

    /// Sets the name of the sheet a freshly created workbook holds.
    pub fn with_placeholder_sheet(mut self, name: impl Into<String>) -> Self {
        self.placeholder_sheet = name.into();
        self
    }

    /// Returns the document path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Probes the document and creates it if it is missing.
    pub async fn ensure_exists(&self) -> Result<EnsureOutcome, RemoteError> {
        match self.host.metadata(&self.path).await {
            Ok(meta) => {
                debug!(path = %self.path, size = ?meta.size, "remote document exists");
                Ok(EnsureOutcome::Existing(meta))
            }
            Err(HostError::NotFound(_)) => {
                info!(path = %self.path, "remote document missing, creating it");
                let bytes = encode_xlsx(&SheetDocument::with_placeholder(
                    self.placeholder_sheet.as_str(),
                ))?;
                let meta = self
                    .host
                    .put_content(&self.path, &bytes, XLSX_CONTENT_TYPE)
                    .await
                    .map_err(|source| RemoteError::Upload {
                        path: self.path.clone(),
                        source,
                    })?;
                Ok(EnsureOutcome::Created(meta))
            }
            Err(source) => Err(RemoteError::Metadata {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Fetches the document bytes.
    pub async fn download(&self) -> Result<Vec<u8>, RemoteError> {
        self.host
            .get_content(&self.path)
            .await
            .map_err(|source| RemoteError::Fetch {
                path: self.path.clone(),
                source,
            })
    }

    /// Replaces the document with `bytes`.
    pub async fn upload(&self, bytes: &[u8]) -> Result<UploadOutcome, RemoteError> {
        self.upload_at(bytes, Utc::now()).await
    }

    /// Like [`upload`](Self::upload), with `now` naming the conflict copy.
    pub async fn upload_at(
        &self,
        bytes: &[u8],
        now: DateTime<Utc>,
    ) -> Result<UploadOutcome, RemoteError> {
        let diagnostics = match self
            .host
            .put_content(&self.path, bytes, XLSX_CONTENT_TYPE)
            .await
        {
            Ok(meta) => {
                info!(path = %self.path, len = bytes.len(), "uploaded document");
                return Ok(UploadOutcome::Committed(meta));
            }
            Err(HostError::Locked(diagnostics)) => diagnostics,
            Err(source) => {
                return Err(RemoteError::Upload {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let sibling = conflict_path(&self.path, now);
        warn!(path = %self.path, %sibling, %diagnostics, "document is locked, writing a conflict copy");
        self.host
            .put_content(&sibling, bytes, XLSX_CONTENT_TYPE)
            .await
            .map_err(|source| RemoteError::Upload {
                path: sibling.clone(),
                source,
            })?;
        Ok(UploadOutcome::Deferred { path: sibling })
    }
}

/// Returns the sibling path used when `path` is locked:
/// `/dir/name.xlsx` becomes `/dir/name.conflict-20250301T120000Z.xlsx`.
pub fn conflict_path(path: &str, now: DateTime<Utc>) -> String {
    let stamp = now.format("%Y%m%dT%H%M%SZ");
    let (dir, file) = match path.rfind('/') {
        Some(idx) => path.split_at(idx + 1),
        None => ("", path),
    };
    match file.rfind('.') {
        Some(idx) if idx > 0 => {
            let (stem, ext) = file.split_at(idx);
            format!("{}{}.conflict-{}{}", dir, stem, stamp, ext)
        }
        _ => format!("{}{}.conflict-{}", dir, file, stamp),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::MemoryFileHost;
    use chrono::TimeZone;
    use sheetsync_core::decode_xlsx;

    const PATH: &str = "/Documents/tickets.xlsx";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn conflict_path_naming() {
        assert_eq!(
            conflict_path(PATH, now()),
            "/Documents/tickets.conflict-20250301T120000Z.xlsx"
        );
        assert_eq!(
            conflict_path("tickets", now()),
            "tickets.conflict-20250301T120000Z"
        );
        assert_eq!(
            conflict_path("/a.b/.hidden", now()),
            "/a.b/.hidden.conflict-20250301T120000Z"
        );
    }

    #[tokio::test]
    async fn ensure_exists_creates_placeholder() {
        let host = MemoryFileHost::new();
        let store = RemoteStore::new(&host, PATH);

        let outcome = store.ensure_exists().await.unwrap();
        assert!(matches!(outcome, EnsureOutcome::Created(_)));

        let doc = decode_xlsx(&host.file(PATH).unwrap()).unwrap();
        assert_eq!(doc.sheet_names(), vec!["TMP"]);

        let outcome = store.ensure_exists().await.unwrap();
        assert!(matches!(outcome, EnsureOutcome::Existing(_)));
        assert_eq!(host.writes().len(), 1);
    }

    #[tokio::test]
    async fn ensure_exists_propagates_other_failures() {
        let host = MemoryFileHost::new();
        host.fail_gets(403);
        let err = RemoteStore::new(&host, PATH)
            .ensure_exists()
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Metadata { .. }));
        assert_eq!(err.diagnostics().unwrap().status, Some(403));
        assert!(host.writes().is_empty());
    }

    #[tokio::test]
    async fn download_missing_document_is_fetch_error() {
        let host = MemoryFileHost::new();
        let err = RemoteStore::new(&host, PATH).download().await.unwrap_err();
        assert!(matches!(
            err,
            RemoteError::Fetch {
                source: HostError::NotFound(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn upload_commits() {
        let host = MemoryFileHost::new();
        let store = RemoteStore::new(&host, PATH);
        let outcome = store.upload_at(b"bytes", now()).await.unwrap();
        assert!(matches!(outcome, UploadOutcome::Committed(_)));
        assert_eq!(host.file(PATH).unwrap(), b"bytes");
    }

    #[tokio::test]
    async fn locked_upload_is_deferred_to_sibling() {
        let host = MemoryFileHost::new();
        host.insert(PATH, b"original".to_vec());
        host.lock(PATH);

        let outcome = RemoteStore::new(&host, PATH)
            .upload_at(b"merged", now())
            .await
            .unwrap();

        let sibling = "/Documents/tickets.conflict-20250301T120000Z.xlsx";
        assert_eq!(
            outcome,
            UploadOutcome::Deferred {
                path: sibling.to_string()
            }
        );
        assert_eq!(host.file(PATH).unwrap(), b"original");
        assert_eq!(host.file(sibling).unwrap(), b"merged");
    }

    #[tokio::test]
    async fn other_upload_failures_propagate() {
        let host = MemoryFileHost::new();
        host.fail_puts(507);
        let err = RemoteStore::new(&host, PATH)
            .upload_at(b"merged", now())
            .await
            .unwrap_err();
        match err {
            RemoteError::Upload { path, source } => {
                assert_eq!(path, PATH);
                assert_eq!(source.diagnostics().status, Some(507));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
