//! Remote collaborators of a sync run.
//!
//! This crate provides everything a run talks to over the network:
//!
//! - [`auth`] - Refresh token storage and the [`TokenBroker`] that turns it
//!   into an access token (silent refresh, scope fallback, device-code
//!   bootstrap)
//! - [`drive`] - The [`FileHost`] seam and the [`RemoteStore`] workbook
//!   client with lock handling
//! - [`slack`] - The Slack channel [`RecordSource`]
//! - [`ProviderError`], [`AuthError`], [`RemoteError`] - Error types, each
//!   carrying [`ExchangeDiagnostics`] where a server was involved
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐
//! │ Identity provider│   │   Graph drive    │   │    Slack API     │
//! └────────┬─────────┘   └────────┬─────────┘   └────────┬─────────┘
//!          │                      │                      │
//!          ▼                      ▼                      ▼
//! ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐
//! │ HttpTokenEndpoint│   │  GraphDriveHost  │   │   SlackSource    │
//! └────────┬─────────┘   └────────┬─────────┘   └────────┬─────────┘
//!          │ TokenEndpoint        │ FileHost             │ RecordSource
//!          ▼                      ▼                      ▼
//! ┌──────────────────┐   ┌──────────────────┐      Vec<Record>
//! │   TokenBroker    │──▶│   RemoteStore    │
//! └────────┬─────────┘   └──────────────────┘
//!          │ CredentialStore
//!          ▼
//!    file / keyring
//! ```
//!
//! # Example
//!
//! ```ignore
//! use sheetsync_providers::auth::{FileCredentialStore, HttpTokenEndpoint, TerminalPrompt, TokenBroker};
//!
//! let endpoint = HttpTokenEndpoint::new(oauth_config)?;
//! let store = FileCredentialStore::new(path);
//! let prompt = TerminalPrompt::new(true);
//! let mut broker = TokenBroker::new(&endpoint, &store, &prompt, "offline_access Files.ReadWrite");
//! let session = broker.acquire_access_token().await?;
//! ```

pub mod auth;
pub mod drive;
pub mod error;
mod http;
pub mod slack;
pub mod source;

// Re-export main types at crate root
pub use auth::{AccessSession, CredentialStore, TokenBroker};
pub use drive::{FileHost, RemoteStore, UploadOutcome};
pub use error::{
    AuthError, ExchangeDiagnostics, HostError, ProviderError, ProviderErrorCode, ProviderResult,
    RemoteError, StoreError,
};
pub use slack::SlackSource;
pub use source::{BoxFuture, RecordSource, StaticRecordSource};
