//! Error types for the credential, drive and record source layers.
//!
//! [`ProviderError`] covers record sources (chat history adapters).
//! [`AuthError`] and [`RemoteError`] are the fatal outcomes of token
//! acquisition and remote document I/O. Both carry an
//! [`ExchangeDiagnostics`] so that a failed run can be debugged offline.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use sheetsync_core::CodecError;

/// The category of a provider error.
///
/// This enum provides a high-level classification of errors for use in
/// run reports and retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorCode {
    /// Authentication failed or credentials are invalid/expired.
    AuthenticationFailed,
    /// Authorization failed - the token lacks access to the resource.
    AuthorizationFailed,
    /// Network error - connection failed, timeout, DNS resolution, etc.
    NetworkError,
    /// Rate limit exceeded - too many requests.
    RateLimited,
    /// Server returned an error (5xx status codes).
    ServerError,
    /// Invalid response from the server - parse error, unexpected format.
    InvalidResponse,
    /// Resource not found (channel, conversation).
    NotFound,
    /// Request was invalid - bad parameters, malformed request.
    BadRequest,
    /// Configuration error - missing or invalid config.
    ConfigurationError,
}

impl ProviderErrorCode {
    /// Returns true if this error is transient and the operation may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError | Self::RateLimited | Self::ServerError
        )
    }

    /// Returns a machine-readable name for this error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "authentication_failed",
            Self::AuthorizationFailed => "authorization_failed",
            Self::NetworkError => "network_error",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::InvalidResponse => "invalid_response",
            Self::NotFound => "not_found",
            Self::BadRequest => "bad_request",
            Self::ConfigurationError => "configuration_error",
        }
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error raised by a record source.
#[derive(Debug, Error)]
pub struct ProviderError {
    code: ProviderErrorCode,
    message: String,
    /// The source that generated this error (e.g. "slack").
    provider: Option<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProviderError {
    /// Creates a new provider error with the given code and message.
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider: None,
            source: None,
        }
    }

    /// Creates an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthenticationFailed, message)
    }

    /// Creates an authorization error.
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthorizationFailed, message)
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NetworkError, message)
    }

    /// Creates a rate limit error.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::RateLimited, message)
    }

    /// Creates a server error.
    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ServerError, message)
    }

    /// Creates an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InvalidResponse, message)
    }

    /// Creates a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NotFound, message)
    }

    /// Creates a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::BadRequest, message)
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ConfigurationError, message)
    }

    /// Sets the provider name for this error.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the source error for this error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error code.
    pub fn code(&self) -> ProviderErrorCode {
        self.code
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the provider name, if set.
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// Returns true if this error is transient and may be retried.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref provider) = self.provider {
            write!(f, "[{}] ", provider)?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A specialized Result type for record source operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Longest error description kept in diagnostics.
const MAX_DESCRIPTION_CHARS: usize = 300;

/// What the remote side told us about a failed exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeDiagnostics {
    /// HTTP status, if a response was received.
    pub status: Option<u16>,
    /// Provider error code (`invalid_grant`, `itemNotFound`, ...).
    pub error_code: Option<String>,
    /// Provider error description, shortened.
    pub error_description: Option<String>,
    /// Correlation id returned by the server.
    pub request_id: Option<String>,
}

impl ExchangeDiagnostics {
    /// Diagnostics for a response with the given status.
    pub fn with_status(status: u16) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Builder method to set the provider error code.
    pub fn with_error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    /// Builder method to set the description, truncated.
    pub fn with_description(mut self, description: impl AsRef<str>) -> Self {
        let description = description.as_ref().trim();
        if !description.is_empty() {
            let mut short: String = description.chars().take(MAX_DESCRIPTION_CHARS).collect();
            if short.len() < description.len() {
                short.push('…');
            }
            self.error_description = Some(short);
        }
        self
    }

    /// Builder method to set the request id.
    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }
}

impl fmt::Display for ExchangeDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(status) = self.status {
            parts.push(format!("status {}", status));
        }
        if let Some(ref code) = self.error_code {
            parts.push(format!("error {}", code));
        }
        if let Some(ref desc) = self.error_description {
            parts.push(format!("description {:?}", desc));
        }
        if let Some(ref id) = self.request_id {
            parts.push(format!("request-id {}", id));
        }
        if parts.is_empty() {
            f.write_str("no response details")
        } else {
            f.write_str(&parts.join(", "))
        }
    }
}

/// Errors raised by a credential store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The credential file could not be read or written.
    #[error("credential file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The stored credential is not valid JSON.
    #[error("credential file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The OS secret store refused the operation.
    #[error("keyring: {0}")]
    Keyring(String),
}

/// Fatal token acquisition failures.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Nobody completed the device authorization in time.
    #[error("device authorization was not completed within {}s", waited.as_secs())]
    BootstrapTimeout { waited: Duration },

    /// The user or the provider refused the device authorization.
    #[error("device authorization was refused ({diagnostics})")]
    BootstrapDenied { diagnostics: ExchangeDiagnostics },

    /// A token request failed for a reason other than the ones above.
    #[error("token exchange failed: {message} ({diagnostics})")]
    TokenExchangeFailed {
        message: String,
        diagnostics: ExchangeDiagnostics,
    },

    /// The refresh token was rejected and interactive bootstrap is disabled.
    #[error(
        "refresh token was rejected and interactive bootstrap is disabled ({diagnostics}); run `sheetsync auth login`"
    )]
    InvalidGrant { diagnostics: ExchangeDiagnostics },

    /// The credential store failed.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl AuthError {
    /// Creates a token exchange failure.
    pub fn exchange_failed(message: impl Into<String>, diagnostics: ExchangeDiagnostics) -> Self {
        Self::TokenExchangeFailed {
            message: message.into(),
            diagnostics,
        }
    }
}

/// Failure of a single file host request.
///
/// Not-found and locked are distinct variants so that callers can absorb
/// them without matching on status codes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// The path does not exist.
    #[error("not found ({0})")]
    NotFound(ExchangeDiagnostics),

    /// The document is locked or another writer won.
    #[error("locked or in conflict ({0})")]
    Locked(ExchangeDiagnostics),

    /// Any other non-success status.
    #[error("request rejected ({0})")]
    Status(ExchangeDiagnostics),

    /// No usable response was received.
    #[error("transport error: {0}")]
    Transport(String),
}

impl HostError {
    /// Returns the diagnostics carried by this error.
    pub fn diagnostics(&self) -> ExchangeDiagnostics {
        match self {
            Self::NotFound(d) | Self::Locked(d) | Self::Status(d) => d.clone(),
            Self::Transport(msg) => ExchangeDiagnostics::default().with_description(msg),
        }
    }
}

/// Fatal remote document failures.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Reading the document failed.
    #[error("failed to download {path}: {source}")]
    Fetch {
        path: String,
        #[source]
        source: HostError,
    },

    /// Writing the document failed (and was not a lock conflict).
    #[error("failed to upload {path}: {source}")]
    Upload {
        path: String,
        #[source]
        source: HostError,
    },

    /// Probing the document failed with something other than not-found.
    #[error("failed to inspect {path}: {source}")]
    Metadata {
        path: String,
        #[source]
        source: HostError,
    },

    /// The placeholder workbook could not be built.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl RemoteError {
    /// Returns the diagnostics of the failed request, if any.
    pub fn diagnostics(&self) -> Option<ExchangeDiagnostics> {
        match self {
            Self::Fetch { source, .. }
            | Self::Upload { source, .. }
            | Self::Metadata { source, .. } => Some(source.diagnostics()),
            Self::Codec(_) => None,
        }
    }
}
