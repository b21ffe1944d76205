//! Remote workbook storage on a cloud drive.
//!
//! # Layers
//!
//! - [`FileHost`] is the path-addressed read, write and probe surface.
//!   [`GraphDriveHost`] implements it over Microsoft Graph (simple `PUT` for
//!   small documents, upload sessions above 4 MiB); [`MemoryFileHost`] is
//!   the in-memory double.
//! - [`RemoteStore`] turns those calls into the workbook lifecycle: create
//!   on first use, download, and upload with a conflict copy when the
//!   document is locked.

mod config;
mod graph;
mod host;
mod store;

pub use config::{DEFAULT_API_BASE, DriveConfig, SIMPLE_UPLOAD_LIMIT, UPLOAD_CHUNK_UNIT};
pub use graph::GraphDriveHost;
pub use host::{FileHost, FileMetadata, MemoryFileHost};
pub use store::{EnsureOutcome, RemoteStore, UploadOutcome, conflict_path};
