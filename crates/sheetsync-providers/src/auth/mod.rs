//! Delegated OAuth session management.
//!
//! - [`CredentialStore`] keeps the refresh token between runs.
//! - [`TokenEndpoint`] speaks the refresh and device-code grants.
//! - [`TokenBroker`] sequences them into one access token per run.

mod broker;
mod config;
mod endpoint;
mod store;

pub use broker::{
    AccessSession, BrokerState, DevicePrompt, TerminalPrompt, TokenBroker, render_prompt,
};
pub use config::{DEFAULT_AUTHORITY, DEFAULT_DEVICE_WAIT, DEFAULT_SCOPES, DEFAULT_TENANT, OAuthConfig};
pub use endpoint::{
    DEFAULT_DEVICE_CODE_LIFETIME, DEFAULT_POLL_INTERVAL, DeviceAuthorization, EndpointError,
    EndpointErrorKind, HttpTokenEndpoint, OAuthErrorKind, TokenEndpoint, TokenGrant,
};
#[cfg(feature = "keyring")]
pub use store::KeyringCredentialStore;
pub use store::{Credential, CredentialStore, FileCredentialStore, MemoryCredentialStore};
