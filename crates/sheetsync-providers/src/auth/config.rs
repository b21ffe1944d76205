//! OAuth client settings for the identity provider.

use std::time::Duration;

/// Identity provider host.
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Tenant used when none is configured (personal Microsoft accounts).
pub const DEFAULT_TENANT: &str = "consumers";

/// Scopes requested when none are configured.
///
/// `offline_access` is required for the provider to issue a refresh token.
pub const DEFAULT_SCOPES: [&str; 2] = ["offline_access", "Files.ReadWrite"];

/// Upper bound on how long the device-code bootstrap waits for the user.
pub const DEFAULT_DEVICE_WAIT: Duration = Duration::from_secs(900);

/// Settings for talking to the OAuth token and device-authorization endpoints.
#[derive(Clone)]
pub struct OAuthConfig {
    /// Identity provider host, without trailing slash.
    pub authority: String,
    /// Tenant segment (`consumers`, `common`, `organizations` or a tenant id).
    pub tenant: String,
    /// Application (client) id.
    pub client_id: String,
    /// Client secret, for confidential clients only.
    pub client_secret: Option<String>,
    /// Scopes to request.
    pub scopes: Vec<String>,
    /// Maximum time to wait for the user during device-code bootstrap.
    pub device_wait: Duration,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
    /// Whether to open the verification URL in a browser during bootstrap.
    pub open_browser: bool,
    /// Whether a rejected refresh token may escalate to device-code bootstrap.
    pub allow_bootstrap: bool,
}

impl OAuthConfig {
    /// Creates a config with defaults for everything but the client id.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            authority: DEFAULT_AUTHORITY.to_string(),
            tenant: DEFAULT_TENANT.to_string(),
            client_id: client_id.into(),
            client_secret: None,
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            device_wait: DEFAULT_DEVICE_WAIT,
            timeout: Duration::from_secs(30),
            open_browser: false,
            allow_bootstrap: true,
        }
    }

    /// Builder method to set the tenant.
    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = tenant.into();
        self
    }

    /// Builder method to set the client secret.
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Builder method to set the scopes.
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// The scopes as a space separated `scope` parameter.
    pub fn scope_param(&self) -> String {
        self.scopes.join(" ")
    }

    /// Token endpoint URL.
    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority.trim_end_matches('/'),
            self.tenant
        )
    }

    /// Device authorization endpoint URL.
    pub fn device_code_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/devicecode",
            self.authority.trim_end_matches('/'),
            self.tenant
        )
    }

    /// Returns true if the scopes include `offline_access`.
    pub fn requests_offline_access(&self) -> bool {
        self.scopes
            .iter()
            .any(|s| s.eq_ignore_ascii_case("offline_access"))
    }
}

impl std::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("authority", &self.authority)
            .field("tenant", &self.tenant)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("scopes", &self.scopes)
            .field("device_wait", &self.device_wait)
            .field("timeout", &self.timeout)
            .field("open_browser", &self.open_browser)
            .field("allow_bootstrap", &self.allow_bootstrap)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = OAuthConfig::new("app-id");
        assert_eq!(config.scope_param(), "offline_access Files.ReadWrite");
        assert!(config.requests_offline_access());
        assert!(config.allow_bootstrap);
        assert_eq!(config.device_wait, Duration::from_secs(900));
    }

    #[test]
    fn endpoint_urls() {
        let config = OAuthConfig::new("app-id").with_tenant("contoso.onmicrosoft.com");
        assert_eq!(
            config.token_url(),
            "https://login.microsoftonline.com/contoso.onmicrosoft.com/oauth2/v2.0/token"
        );
        assert_eq!(
            config.device_code_url(),
            "https://login.microsoftonline.com/contoso.onmicrosoft.com/oauth2/v2.0/devicecode"
        );
    }

    #[test]
    fn trailing_slash_in_authority() {
        let mut config = OAuthConfig::new("app-id");
        config.authority = "https://login.example.test/".to_string();
        assert_eq!(
            config.token_url(),
            "https://login.example.test/consumers/oauth2/v2.0/token"
        );
    }

    #[test]
    fn debug_hides_secret() {
        let config = OAuthConfig::new("app-id").with_client_secret("hunter2");
        let dbg = format!("{:?}", config);
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn offline_access_detection() {
        let config = OAuthConfig::new("a").with_scopes(vec!["Files.ReadWrite".into()]);
        assert!(!config.requests_offline_access());
    }
}
