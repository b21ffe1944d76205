//! The sync pipeline, once authenticated.
//!
//! ```text
//! ensure_exists ─▶ download ─▶ decode ─▶ fetch_records ─▶ merge ─▶ encode ─▶ upload
//!                                                            │                  │ locked
//!                                                            ▼ nothing new      ▼
//!                                                       (no upload)      conflict copy
//! ```
//!
//! A non-lock upload failure writes the encoded document to the local backup
//! directory and is reported as [`RunOutcome::BackupWritten`].

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use sheetsync_core::{FetchWindow, MergeEngine, MergeReport, decode_xlsx, encode_xlsx};
use sheetsync_providers::drive::{EnsureOutcome, FileHost, RemoteStore, UploadOutcome};
use sheetsync_providers::{HostError, RecordSource, RemoteError};

use crate::backup;
use crate::error::{ClientError, ClientResult};

/// Inputs of one pipeline run.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Remote document path.
    pub file_path: String,
    /// Sheet a newly created document starts with.
    pub placeholder_sheet: String,
    /// Which records to fetch.
    pub window: FetchWindow,
    /// Merge and report without writing anything.
    pub dry_run: bool,
    /// Where documents that could not be uploaded are kept.
    pub backup_dir: PathBuf,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing to append; nothing was uploaded.
    NothingNew,
    /// The document was replaced.
    Committed,
    /// The document was locked; the merge went to a conflict copy.
    Deferred { path: String },
    /// Upload failed; the merge was saved locally.
    BackupWritten { path: PathBuf, error: String },
    /// Dry run; nothing was written.
    DryRun,
}

impl RunOutcome {
    /// Returns true unless the merge only reached the local backup.
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::BackupWritten { .. })
    }
}

/// Summary of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Record source name.
    pub source: String,
    /// Requested window.
    pub window: FetchWindow,
    /// Remote document path.
    pub document: String,
    /// Whether the document had to be created.
    pub created: bool,
    /// Records the source returned.
    pub fetched: usize,
    /// Merge counts and structural changes.
    pub merge: MergeReport,
    /// How the run ended.
    pub outcome: RunOutcome,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let created = if self.created { " (created)" } else { "" };
        writeln!(f, "document:  {}{}", self.document, created)?;
        writeln!(f, "window:    {}", self.window)?;
        writeln!(f, "fetched:   {} from {}", self.fetched, self.source)?;
        writeln!(
            f,
            "appended:  {} (skipped {} already present)",
            self.merge.appended, self.merge.skipped
        )?;
        let changes = [
            ("created", &self.merge.created_sheets),
            ("rebuilt", &self.merge.rebuilt_sheets),
            ("archived", &self.merge.archived_sheets),
            ("removed", &self.merge.removed_placeholders),
        ];
        for (label, sheets) in changes {
            if !sheets.is_empty() {
                writeln!(f, "{:<10} {}", format!("{}:", label), sheets.join(", "))?;
            }
        }
        let outcome = match self.outcome {
            RunOutcome::NothingNew => "nothing new, upload skipped".to_string(),
            RunOutcome::Committed => "uploaded".to_string(),
            RunOutcome::Deferred { ref path } => format!("document locked, wrote {}", path),
            RunOutcome::BackupWritten { ref path, ref error } => {
                format!("upload failed ({}), saved {}", error, path.display())
            }
            RunOutcome::DryRun => "dry run, nothing written".to_string(),
        };
        write!(f, "result:    {}", outcome)
    }
}

/// Runs the pipeline against an authorized file host.
pub async fn sync(
    host: &dyn FileHost,
    source: &dyn RecordSource,
    engine: &MergeEngine,
    settings: &SyncSettings,
) -> ClientResult<RunReport> {
    sync_at(host, source, engine, settings, Utc::now()).await
}

/// Like [`sync`], with `now` naming conflict copies and backups.
pub async fn sync_at(
    host: &dyn FileHost,
    source: &dyn RecordSource,
    engine: &MergeEngine,
    settings: &SyncSettings,
    now: DateTime<Utc>,
) -> ClientResult<RunReport> {
    let store = RemoteStore::new(host, settings.file_path.as_str())
        .with_placeholder_sheet(settings.placeholder_sheet.as_str());

    let (created, bytes) = if settings.dry_run {
        (false, download_if_present(&store).await?)
    } else {
        let created = matches!(store.ensure_exists().await?, EnsureOutcome::Created(_));
        (created, store.download().await?)
    };
    let existing = decode_xlsx(&bytes)?;

    let records = source.fetch_records(settings.window).await?;
    info!(
        source = source.name(),
        count = records.len(),
        window = %settings.window,
        "fetched records"
    );

    let merged = engine.merge(existing, &records)?;
    let mut report = RunReport {
        source: source.name().to_string(),
        window: settings.window,
        document: settings.file_path.clone(),
        created,
        fetched: records.len(),
        merge: merged.report.clone(),
        outcome: RunOutcome::NothingNew,
    };

    if merged.report.is_noop() {
        info!("nothing new to write");
        return Ok(report);
    }
    if settings.dry_run {
        report.outcome = RunOutcome::DryRun;
        return Ok(report);
    }

    let encoded = encode_xlsx(&merged.document)?;
    report.outcome = match store.upload_at(&encoded, now).await {
        Ok(UploadOutcome::Committed(_)) => RunOutcome::Committed,
        Ok(UploadOutcome::Deferred { path }) => RunOutcome::Deferred { path },
        Err(upload) => {
            if let Some(diagnostics) = upload.diagnostics() {
                error!(%diagnostics, "upload failed, writing local backup");
            }
            let upload = upload.to_string();
            let path =
                backup::write_backup(&settings.backup_dir, &settings.file_path, &encoded, now)
                    .map_err(|source| ClientError::Backup {
                        path: settings.backup_dir.clone(),
                        upload: upload.clone(),
                        source,
                    })?;
            RunOutcome::BackupWritten {
                path,
                error: upload,
            }
        }
    };
    Ok(report)
}

/// Reads the document without creating it; a missing one reads as empty.
async fn download_if_present(store: &RemoteStore<'_>) -> Result<Vec<u8>, RemoteError> {
    match store.download().await {
        Ok(bytes) => Ok(bytes),
        Err(RemoteError::Fetch {
            source: HostError::NotFound(_),
            ..
        }) => {
            warn!(path = store.path(), "remote document does not exist yet");
            Ok(Vec::new())
        }
        Err(e) => Err(e),
    }
}
