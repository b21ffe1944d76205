//! OAuth 2.0 token and device-authorization endpoints.
//!
//! [`TokenEndpoint`] is the seam between the token broker's state machine
//! and the wire. [`HttpTokenEndpoint`] talks to a real identity provider;
//! tests script the trait directly.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::ExchangeDiagnostics;
use crate::http;
use crate::source::BoxFuture;

use super::config::OAuthConfig;

const REFRESH_GRANT: &str = "refresh_token";
const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Poll interval used when the provider does not announce one.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Device code lifetime used when the provider does not announce one.
pub const DEFAULT_DEVICE_CODE_LIFETIME: Duration = Duration::from_secs(900);

/// A successful token response.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    /// Short-lived bearer token.
    pub access_token: String,
    /// Newly issued refresh token, if the provider rotated it.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Scopes actually granted.
    #[serde(default)]
    pub scope: Option<String>,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish()
    }
}

/// A pending device authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAuthorization {
    /// Opaque code used when polling.
    pub device_code: String,
    /// Code the user types at the verification page.
    pub user_code: String,
    /// Where the user goes to authorize.
    pub verification_uri: String,
    /// Ready-made instructions, when the provider supplies them.
    pub message: Option<String>,
    /// Minimum time between polls.
    pub interval: Duration,
    /// How long the device code stays valid.
    pub expires_in: Duration,
}

#[derive(Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    #[serde(default)]
    verification_uri: Option<String>,
    // Older endpoints spell it this way.
    #[serde(default)]
    verification_url: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    interval: Option<u64>,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl DeviceCodeResponse {
    fn into_authorization(self) -> Option<DeviceAuthorization> {
        let verification_uri = self.verification_uri.or(self.verification_url)?;
        Some(DeviceAuthorization {
            device_code: self.device_code,
            user_code: self.user_code,
            verification_uri,
            message: self.message.filter(|m| !m.trim().is_empty()),
            interval: self
                .interval
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_POLL_INTERVAL),
            expires_in: self
                .expires_in
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_DEVICE_CODE_LIFETIME),
        })
    }
}

/// The OAuth error kinds the broker reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthErrorKind {
    /// The refresh token (or device code) is revoked, expired or unknown.
    InvalidGrant,
    /// The requested scope was rejected.
    InvalidScope,
    /// The user has not finished authorizing yet.
    AuthorizationPending,
    /// Poll less often.
    SlowDown,
    /// The user declined.
    AccessDenied,
    /// The device code expired.
    ExpiredToken,
    /// Any other error code.
    Other,
}

impl OAuthErrorKind {
    /// Classifies an error code and its description.
    ///
    /// Some providers report a rejected scope as `invalid_request` with an
    /// explanation in the description, so both are inspected.
    pub fn classify(code: &str, description: Option<&str>) -> Self {
        match code {
            "invalid_grant" => Self::InvalidGrant,
            "invalid_scope" => Self::InvalidScope,
            "authorization_pending" => Self::AuthorizationPending,
            "slow_down" => Self::SlowDown,
            "access_denied" | "authorization_declined" => Self::AccessDenied,
            "expired_token" | "code_expired" => Self::ExpiredToken,
            "invalid_request"
                if description.is_some_and(|d| d.to_ascii_lowercase().contains("scope")) =>
            {
                Self::InvalidScope
            }
            _ => Self::Other,
        }
    }
}

/// Why a token endpoint call failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointErrorKind {
    /// The provider answered with an OAuth error body.
    OAuth(OAuthErrorKind),
    /// No response, or a response that is not a valid OAuth body.
    Transport,
}

/// A failed token endpoint call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointError {
    /// The classification.
    pub kind: EndpointErrorKind,
    /// Status, error code and request id, for reporting.
    pub diagnostics: ExchangeDiagnostics,
}

impl EndpointError {
    /// An OAuth error with the given code, classified.
    pub fn oauth(diagnostics: ExchangeDiagnostics) -> Self {
        let kind = match diagnostics.error_code {
            Some(ref code) => EndpointErrorKind::OAuth(OAuthErrorKind::classify(
                code,
                diagnostics.error_description.as_deref(),
            )),
            None => EndpointErrorKind::Transport,
        };
        Self { kind, diagnostics }
    }

    /// A transport failure.
    pub fn transport(diagnostics: ExchangeDiagnostics) -> Self {
        Self {
            kind: EndpointErrorKind::Transport,
            diagnostics,
        }
    }

    /// Returns the OAuth error kind, if the provider sent one.
    pub fn oauth_kind(&self) -> Option<OAuthErrorKind> {
        match self.kind {
            EndpointErrorKind::OAuth(kind) => Some(kind),
            EndpointErrorKind::Transport => None,
        }
    }

    /// Returns true for a revoked or expired grant.
    pub fn is_invalid_grant(&self) -> bool {
        self.oauth_kind() == Some(OAuthErrorKind::InvalidGrant)
    }

    /// Returns true for a scope rejection.
    pub fn is_scope_error(&self) -> bool {
        self.oauth_kind() == Some(OAuthErrorKind::InvalidScope)
    }
}

impl fmt::Display for EndpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EndpointErrorKind::OAuth(kind) => write!(f, "{:?}: {}", kind, self.diagnostics),
            EndpointErrorKind::Transport => write!(f, "transport: {}", self.diagnostics),
        }
    }
}

/// The OAuth endpoints the token broker needs.
pub trait TokenEndpoint: Send + Sync {
    /// Exchanges a refresh token. `scope` of `None` omits the parameter.
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
        scope: Option<&'a str>,
    ) -> BoxFuture<'a, Result<TokenGrant, EndpointError>>;

    /// Starts a device authorization for `scope`.
    fn request_device_code<'a>(
        &'a self,
        scope: &'a str,
    ) -> BoxFuture<'a, Result<DeviceAuthorization, EndpointError>>;

    /// Polls once for the outcome of a device authorization.
    fn poll_device_token<'a>(
        &'a self,
        device_code: &'a str,
    ) -> BoxFuture<'a, Result<TokenGrant, EndpointError>>;
}

/// Token endpoint client over HTTP (form-encoded POSTs).
#[derive(Debug)]
pub struct HttpTokenEndpoint {
    config: OAuthConfig,
    http_client: reqwest::Client,
}

impl HttpTokenEndpoint {
    /// Creates a client for the endpoints described by `config`.
    pub fn new(config: OAuthConfig) -> Result<Self, EndpointError> {
        let http_client = http::build_client(config.timeout).map_err(|e| {
            EndpointError::transport(
                ExchangeDiagnostics::default().with_description(http::transport_message(&e)),
            )
        })?;
        Ok(Self {
            config,
            http_client,
        })
    }

    /// Returns the config.
    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    fn with_client_auth<'a>(&'a self, form: &mut Vec<(&'static str, &'a str)>) {
        form.push(("client_id", &self.config.client_id));
        if let Some(ref secret) = self.config.client_secret {
            form.push(("client_secret", secret));
        }
    }

    /// POSTs a form and returns the body of a 2xx response.
    async fn post_form(
        &self,
        url: &str,
        form: &[(&'static str, &str)],
    ) -> Result<String, EndpointError> {
        let response = self
            .http_client
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| {
                EndpointError::transport(
                    ExchangeDiagnostics::default().with_description(http::transport_message(&e)),
                )
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(|e| {
            EndpointError::transport(
                ExchangeDiagnostics::with_status(status.as_u16())
                    .with_request_id(http::request_id(&headers))
                    .with_description(format!("failed to read response: {}", e)),
            )
        })?;

        if status.is_success() {
            debug!(%url, status = status.as_u16(), "token endpoint call succeeded");
            return Ok(body);
        }

        let diagnostics = http::diagnostics(status.as_u16(), &headers, &body);
        debug!(%url, %diagnostics, "token endpoint call failed");
        Err(EndpointError::oauth(diagnostics))
    }

    fn parse<T: for<'de> Deserialize<'de>>(body: &str) -> Result<T, EndpointError> {
        serde_json::from_str(body).map_err(|e| {
            EndpointError::transport(
                ExchangeDiagnostics::with_status(200)
                    .with_description(format!("unexpected response body: {}", e)),
            )
        })
    }
}

impl TokenEndpoint for HttpTokenEndpoint {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
        scope: Option<&'a str>,
    ) -> BoxFuture<'a, Result<TokenGrant, EndpointError>> {
        Box::pin(async move {
            let mut form = vec![
                ("grant_type", REFRESH_GRANT),
                ("refresh_token", refresh_token),
            ];
            self.with_client_auth(&mut form);
            if let Some(scope) = scope {
                form.push(("scope", scope));
            }
            let body = self.post_form(&self.config.token_url(), &form).await?;
            Self::parse(&body)
        })
    }

    fn request_device_code<'a>(
        &'a self,
        scope: &'a str,
    ) -> BoxFuture<'a, Result<DeviceAuthorization, EndpointError>> {
        Box::pin(async move {
            let form = [("client_id", self.config.client_id.as_str()), ("scope", scope)];
            let body = self.post_form(&self.config.device_code_url(), &form).await?;
            let response: DeviceCodeResponse = Self::parse(&body)?;
            response.into_authorization().ok_or_else(|| {
                EndpointError::transport(
                    ExchangeDiagnostics::with_status(200)
                        .with_description("device code response has no verification URI"),
                )
            })
        })
    }

    fn poll_device_token<'a>(
        &'a self,
        device_code: &'a str,
    ) -> BoxFuture<'a, Result<TokenGrant, EndpointError>> {
        Box::pin(async move {
            let mut form = vec![("grant_type", DEVICE_CODE_GRANT), ("device_code", device_code)];
            self.with_client_auth(&mut form);
            let body = self.post_form(&self.config.token_url(), &form).await?;
            Self::parse(&body)
        })
    }
}
