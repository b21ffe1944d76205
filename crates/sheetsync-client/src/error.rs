//! Client error types.

use std::path::PathBuf;

use thiserror::Error;

use sheetsync_core::{CodecError, MergeError, TracingError};
use sheetsync_providers::{AuthError, ProviderError, RemoteError, StoreError};

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that end a command with a non-zero exit code.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Token acquisition failed.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// The credential store failed outside of token acquisition.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Reading or creating the remote document failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The record source failed.
    #[error("record source error: {0}")]
    Source(#[from] ProviderError),

    /// The remote document could not be decoded or encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The merge could not be applied to the document.
    #[error("merge failed: {0}")]
    Merge(#[from] MergeError),

    /// Upload failed; the merged document was kept locally.
    #[error("upload failed, merged document saved to {}: {message}", path.display())]
    UploadFailed { path: PathBuf, message: String },

    /// Upload failed and the local backup could not be written either.
    #[error("upload failed ({upload}) and the backup {} could not be written: {source}", path.display())]
    Backup {
        path: PathBuf,
        upload: String,
        #[source]
        source: std::io::Error,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Logging could not be set up.
    #[error(transparent)]
    Tracing(#[from] TracingError),
}

impl ClientError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
