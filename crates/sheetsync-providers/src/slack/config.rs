//! Slack source configuration.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use sheetsync_core::Redacted;

/// Default Web API root.
pub const DEFAULT_SLACK_API_BASE: &str = "https://slack.com/api";

/// Default `conversations.history` page size.
pub const DEFAULT_PAGE_SIZE: u32 = 200;

/// Longest `Retry-After` honoured; a longer one fails the fetch.
pub const MAX_RETRY_WAIT: Duration = Duration::from_secs(60);

/// Configuration for [`SlackSource`](super::SlackSource).
#[derive(Clone)]
pub struct SlackConfig {
    /// Bot token (`xoxb-...`).
    pub bot_token: String,
    /// Channel to mirror.
    pub channel_id: String,
    /// Member ids whose messages are tagged internal.
    pub internal_member_ids: HashSet<String>,
    /// Workspace host (`acme.slack.com`) used to build permalinks.
    pub workspace_domain: Option<String>,
    /// Messages requested per page (Slack caps this at 999).
    pub page_size: u32,
    /// API root, without a trailing slash.
    pub api_base: String,
    /// Request timeout.
    pub timeout: Duration,
    /// First wait before retrying a network or server error; doubles per
    /// attempt.
    pub retry_backoff: Duration,
    /// Longest wait accepted from `Retry-After`.
    pub max_retry_wait: Duration,
}

impl SlackConfig {
    /// Creates a config for `channel_id` authorized with `bot_token`.
    pub fn new(bot_token: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            channel_id: channel_id.into(),
            internal_member_ids: HashSet::new(),
            workspace_domain: None,
            page_size: DEFAULT_PAGE_SIZE,
            api_base: DEFAULT_SLACK_API_BASE.to_string(),
            timeout: Duration::from_secs(30),
            retry_backoff: Duration::from_secs(1),
            max_retry_wait: MAX_RETRY_WAIT,
        }
    }

    /// Sets the internal member ids.
    pub fn with_internal_members<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.internal_member_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the workspace domain; a scheme or trailing slash is stripped.
    pub fn with_workspace_domain(mut self, domain: impl Into<String>) -> Self {
        let domain = domain.into();
        let domain = domain
            .trim()
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');
        self.workspace_domain = (!domain.is_empty()).then(|| domain.to_string());
        self
    }

    /// Sets the page size, clamped to Slack's accepted range.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, 999);
        self
    }

    /// Sets the API root.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the first retry backoff.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Sets the longest `Retry-After` wait, capped at [`MAX_RETRY_WAIT`].
    pub fn with_max_retry_wait(mut self, wait: Duration) -> Self {
        self.max_retry_wait = wait.min(MAX_RETRY_WAIT);
        self
    }
}

impl fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlackConfig")
            .field("bot_token", &Redacted(&self.bot_token))
            .field("channel_id", &self.channel_id)
            .field("internal_member_ids", &self.internal_member_ids.len())
            .field("workspace_domain", &self.workspace_domain)
            .field("page_size", &self.page_size)
            .field("api_base", &self.api_base)
            .field("retry_backoff", &self.retry_backoff)
            .field("max_retry_wait", &self.max_retry_wait)
            .finish()
    }
}
