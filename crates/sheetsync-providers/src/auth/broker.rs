//! Token broker: turns a stored (or absent) refresh token into an access
//! token.
//!
//! # States
//!
//! ```text
//! NoToken ──(stored token)──▶ SilentRefresh ──ok──────────────────▶ Authorized
//!    │                             │ failed (not invalid_grant)
//!    │                             ▼
//!    │                        ScopeFallback ──ok──────────────────▶ Authorized
//!    │                             │ invalid_grant        │ other
//!    │ (no token)                  ▼                      ▼
//!    └────────────────────▶ DeviceBootstrap ──ok──▶ Authorized     Failed
//!                                  │ denied / timeout / error
//!                                  ▼
//!                                Failed
//! ```
//!
//! A first refresh failing with `invalid_grant` goes straight to
//! `DeviceBootstrap`. Every transition into `Authorized` persists the refresh
//! token the provider just issued before returning, so the next run starts
//! from the newest token. The stored token is only replaced once its
//! successor has been received.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use sheetsync_core::Redacted;

use crate::error::{AuthError, ExchangeDiagnostics};

use super::endpoint::{DeviceAuthorization, EndpointError, OAuthErrorKind, TokenEndpoint, TokenGrant};
use super::store::{Credential, CredentialStore};

/// Extra delay added to the poll interval on `slow_down`.
const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

/// Where the broker is in its acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerState {
    /// Nothing loaded yet.
    NoToken,
    /// Exchanging the stored refresh token with the configured scopes.
    SilentRefresh,
    /// Retrying the exchange without the scope parameter.
    ScopeFallback,
    /// Interactive device-code authorization.
    DeviceBootstrap,
    /// An access token was obtained.
    Authorized,
    /// Acquisition failed.
    Failed,
}

/// A short-lived access token, held for one run and never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessSession {
    access_token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl AccessSession {
    /// Creates a session.
    pub fn new(access_token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    fn from_grant(grant: &TokenGrant, now: DateTime<Utc>) -> Self {
        let expires_at = grant
            .expires_in
            .and_then(|secs| i64::try_from(secs).ok())
            .map(|secs| now + chrono::Duration::seconds(secs));
        Self::new(grant.access_token.clone(), expires_at)
    }

    /// The bearer token.
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// When the token expires, if the provider said.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Returns true if the token is known to be expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

impl fmt::Debug for AccessSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessSession")
            .field("access_token", &Redacted(&self.access_token))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Shows device-code instructions to a human.
pub trait DevicePrompt: Send + Sync {
    /// Called once per bootstrap, before polling starts.
    fn show(&self, authorization: &DeviceAuthorization);
}

/// Renders the instructions for a device authorization.
///
/// The provider's own message is used verbatim when it sends one.
pub fn render_prompt(authorization: &DeviceAuthorization) -> String {
    let instructions = match authorization.message {
        Some(ref message) => message.clone(),
        None => format!(
            "1) Open {}\n2) Enter the code {}",
            authorization.verification_uri, authorization.user_code
        ),
    };
    format!(
        "=== AUTHORIZATION REQUIRED ===\n{}\n\nWaiting for authorization (code valid for {} minutes)...",
        instructions,
        authorization.expires_in.as_secs().div_ceil(60)
    )
}

/// Prints device-code instructions to stderr, optionally opening a browser.
#[derive(Debug, Clone, Default)]
pub struct TerminalPrompt {
    open_browser: bool,
}

impl TerminalPrompt {
    /// Creates a prompt.
    pub fn new(open_browser: bool) -> Self {
        Self { open_browser }
    }
}

impl DevicePrompt for TerminalPrompt {
    fn show(&self, authorization: &DeviceAuthorization) {
        eprintln!("\n{}\n", render_prompt(authorization));
        if self.open_browser
            && let Err(e) = open::that(&authorization.verification_uri)
        {
            warn!("failed to open browser: {}", e);
        }
    }
}

/// Acquires access tokens, persisting refresh token rotations.
pub struct TokenBroker<'a> {
    endpoint: &'a dyn TokenEndpoint,
    store: &'a dyn CredentialStore,
    prompt: &'a dyn DevicePrompt,
    scope: String,
    device_wait: Duration,
    allow_bootstrap: bool,
    path: Vec<BrokerState>,
}

impl<'a> TokenBroker<'a> {
    /// Creates a broker requesting `scope` (space separated).
    pub fn new(
        endpoint: &'a dyn TokenEndpoint,
        store: &'a dyn CredentialStore,
        prompt: &'a dyn DevicePrompt,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            endpoint,
            store,
            prompt,
            scope: scope.into(),
            device_wait: super::config::DEFAULT_DEVICE_WAIT,
            allow_bootstrap: true,
            path: Vec::new(),
        }
    }

    /// Builder method to cap how long bootstrap waits for the user.
    pub fn with_device_wait(mut self, wait: Duration) -> Self {
        self.device_wait = wait;
        self
    }

    /// Builder method to allow or forbid interactive bootstrap.
    pub fn with_bootstrap(mut self, allow: bool) -> Self {
        self.allow_bootstrap = allow;
        self
    }

    /// States visited by the last acquisition, in order.
    pub fn path(&self) -> &[BrokerState] {
        &self.path
    }

    /// The state the last acquisition ended in.
    pub fn state(&self) -> BrokerState {
        self.path.last().copied().unwrap_or(BrokerState::NoToken)
    }

    fn enter(&mut self, state: BrokerState) {
        debug!(?state, "token broker transition");
        self.path.push(state);
    }

    fn fail(&mut self, err: AuthError) -> AuthError {
        self.enter(BrokerState::Failed);
        err
    }

    /// Returns a valid access token, refreshing or bootstrapping as needed.
    pub async fn acquire_access_token(&mut self) -> Result<AccessSession, AuthError> {
        self.path.clear();
        self.enter(BrokerState::NoToken);

        let stored = match self.store.load() {
            Ok(stored) => stored,
            Err(e) => return Err(self.fail(e.into())),
        };
        let Some(credential) = stored else {
            info!(store = %self.store.describe(), "no refresh token stored");
            return self.escalate(None).await;
        };

        self.enter(BrokerState::SilentRefresh);
        let first = match self
            .endpoint
            .refresh(&credential.refresh_token, Some(self.scope.as_str()))
            .await
        {
            Ok(grant) => return self.authorize(grant, Some(&credential)),
            Err(e) if e.is_invalid_grant() => {
                warn!(diagnostics = %e.diagnostics, "refresh token rejected");
                return self.escalate(Some(e.diagnostics)).await;
            }
            Err(e) => e,
        };

        if first.is_scope_error() {
            info!(diagnostics = %first.diagnostics, "refresh rejected the scope, retrying without it");
        } else {
            warn!(diagnostics = %first.diagnostics, "refresh failed, retrying without scope");
        }
        self.enter(BrokerState::ScopeFallback);
        match self.endpoint.refresh(&credential.refresh_token, None).await {
            Ok(grant) => self.authorize(grant, Some(&credential)),
            Err(e) if e.is_invalid_grant() => {
                warn!(diagnostics = %e.diagnostics, "refresh token rejected");
                self.escalate(Some(e.diagnostics)).await
            }
            Err(e) => Err(self.fail(AuthError::exchange_failed(
                format!("refresh failed with and without scope (first attempt: {})", first),
                e.diagnostics,
            ))),
        }
    }

    /// Runs device-code bootstrap regardless of the stored token.
    pub async fn bootstrap(&mut self) -> Result<AccessSession, AuthError> {
        self.path.clear();
        self.enter(BrokerState::NoToken);
        self.enter(BrokerState::DeviceBootstrap);
        match self.device_flow().await {
            Ok(grant) => self.authorize_bootstrap(grant),
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn escalate(
        &mut self,
        rejection: Option<ExchangeDiagnostics>,
    ) -> Result<AccessSession, AuthError> {
        if !self.allow_bootstrap {
            let diagnostics = rejection.unwrap_or_default();
            return Err(self.fail(AuthError::InvalidGrant { diagnostics }));
        }
        self.enter(BrokerState::DeviceBootstrap);
        match self.device_flow().await {
            Ok(grant) => self.authorize_bootstrap(grant),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn authorize_bootstrap(&mut self, grant: TokenGrant) -> Result<AccessSession, AuthError> {
        if grant.refresh_token.as_deref().is_none_or(str::is_empty) {
            return Err(self.fail(AuthError::exchange_failed(
                "device authorization succeeded but no refresh token was issued; \
                 request the offline_access scope and allow public client flows",
                ExchangeDiagnostics::with_status(200),
            )));
        }
        self.authorize(grant, None)
    }

    /// Persists a rotated refresh token, then returns the session.
    fn authorize(
        &mut self,
        grant: TokenGrant,
        previous: Option<&Credential>,
    ) -> Result<AccessSession, AuthError> {
        let now = Utc::now();
        match grant.refresh_token.as_deref() {
            Some(new) if !new.is_empty() => {
                if previous.is_some_and(|p| p.refresh_token == new) {
                    debug!("refresh token unchanged");
                } else {
                    if let Err(e) = self.store.save(&Credential::new(new, now)) {
                        return Err(self.fail(e.into()));
                    }
                    info!(token = %Redacted(new), "stored rotated refresh token");
                }
            }
            _ => debug!("provider did not rotate the refresh token"),
        }
        self.enter(BrokerState::Authorized);
        Ok(AccessSession::from_grant(&grant, now))
    }

    /// Requests a device code, shows it and polls until a terminal answer.
    async fn device_flow(&mut self) -> Result<TokenGrant, AuthError> {
        let authorization = self
            .endpoint
            .request_device_code(&self.scope)
            .await
            .map_err(|e| {
                AuthError::exchange_failed("device code request failed", e.diagnostics)
            })?;

        self.prompt.show(&authorization);

        let budget = self.device_wait.min(authorization.expires_in);
        let started = Instant::now();
        let deadline = started + budget;
        let mut interval = authorization.interval;
        info!(
            interval_secs = interval.as_secs(),
            budget_secs = budget.as_secs(),
            "waiting for device authorization"
        );

        loop {
            if Instant::now() + interval > deadline {
                return Err(AuthError::BootstrapTimeout {
                    waited: started.elapsed(),
                });
            }
            tokio::time::sleep(interval).await;

            let err = match self
                .endpoint
                .poll_device_token(&authorization.device_code)
                .await
            {
                Ok(grant) => {
                    info!("device authorization completed");
                    return Ok(grant);
                }
                Err(e) => e,
            };

            match err.oauth_kind() {
                Some(OAuthErrorKind::AuthorizationPending) => continue,
                Some(OAuthErrorKind::SlowDown) => {
                    interval += SLOW_DOWN_STEP;
                    debug!(interval_secs = interval.as_secs(), "provider asked to slow down");
                }
                Some(OAuthErrorKind::AccessDenied | OAuthErrorKind::ExpiredToken) => {
                    return Err(AuthError::BootstrapDenied {
                        diagnostics: err.diagnostics,
                    });
                }
                _ => return Err(poll_failed(err)),
            }
        }
    }
}

fn poll_failed(err: EndpointError) -> AuthError {
    AuthError::exchange_failed("device token poll failed", err.diagnostics)
}

impl fmt::Debug for TokenBroker<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBroker")
            .field("store", &self.store.describe())
            .field("scope", &self.scope)
            .field("device_wait", &self.device_wait)
            .field("allow_bootstrap", &self.allow_bootstrap)
            .field("path", &self.path)
            .finish()
    }
}
