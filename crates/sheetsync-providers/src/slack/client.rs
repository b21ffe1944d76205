//! `conversations.history` client and message normalization.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use sheetsync_core::{FetchWindow, Origin, Record};

use crate::error::{ProviderError, ProviderResult};
use crate::http;
use crate::source::{BoxFuture, RecordSource};

use super::config::SlackConfig;

/// How many times a failed page request is retried.
const MAX_RETRIES: u32 = 3;

/// Wait used when a 429 carries no `Retry-After`.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Name of the extra field carrying the author's member id.
pub const AUTHOR_ID_FIELD: &str = "author_id";

/// A failed page request.
#[derive(Debug)]
struct PageFailure {
    error: ProviderError,
    /// Wait requested by the server (HTTP 429).
    retry_after: Option<Duration>,
}

impl From<ProviderError> for PageFailure {
    fn from(error: ProviderError) -> Self {
        Self {
            error,
            retry_after: None,
        }
    }
}

/// One page of `conversations.history`.
#[derive(Debug, Deserialize)]
struct HistoryPage {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    messages: Vec<SlackMessage>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackMessage {
    ts: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    text: String,
}

/// A [`RecordSource`] over one Slack channel.
#[derive(Debug)]
pub struct SlackSource {
    config: SlackConfig,
    http_client: reqwest::Client,
}

impl SlackSource {
    /// Creates a source for the configured channel.
    pub fn new(config: SlackConfig) -> ProviderResult<Self> {
        let http_client = http::build_client(config.timeout).map_err(|e| {
            ProviderError::configuration(format!("failed to build HTTP client: {}", e))
                .with_provider("slack")
        })?;
        Ok(Self {
            config,
            http_client,
        })
    }

    /// Returns the config.
    pub fn config(&self) -> &SlackConfig {
        &self.config
    }

    /// Fetches one page, retrying transient failures.
    ///
    /// A 429 waits for its `Retry-After`; network and server errors back off
    /// exponentially from `retry_backoff`.
    async fn fetch_page(
        &self,
        window: FetchWindow,
        cursor: Option<&str>,
    ) -> ProviderResult<HistoryPage> {
        let url = format!("{}/conversations.history", self.config.api_base);
        let mut query = vec![
            ("channel", self.config.channel_id.clone()),
            ("limit", self.config.page_size.to_string()),
            ("inclusive", "true".to_string()),
        ];
        if let Some(start) = window.start {
            query.push(("oldest", format_ts(start)));
        }
        if let Some(end) = window.end {
            query.push(("latest", format_ts(end)));
        }
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }

        let mut attempt = 0;
        loop {
            let failure = match self.request_page(&url, &query).await {
                Ok(page) => return Ok(page),
                Err(failure) => failure,
            };
            if !failure.error.is_retryable() {
                return Err(failure.error);
            }
            if attempt >= MAX_RETRIES {
                return Err(ProviderError::new(
                    failure.error.code(),
                    format!("{} (gave up after {} retries)", failure.error.message(), attempt),
                ));
            }

            let wait = match failure.retry_after {
                Some(wait) if wait > self.config.max_retry_wait => {
                    return Err(ProviderError::rate_limited(format!(
                        "slack asked to wait {}s, longer than the {}s limit",
                        wait.as_secs(),
                        self.config.max_retry_wait.as_secs()
                    )));
                }
                Some(wait) => wait,
                None => self.config.retry_backoff * 2u32.pow(attempt),
            };
            attempt += 1;
            warn!(
                attempt,
                wait_ms = wait.as_millis() as u64,
                error = %failure.error,
                "slack request failed, retrying"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Sends one `conversations.history` request.
    async fn request_page(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<HistoryPage, PageFailure> {
        let response = self
            .http_client
            .get(url)
            .bearer_auth(&self.config.bot_token)
            .query(query)
            .send()
            .await
            .map_err(|e| ProviderError::network(http::transport_message(&e)).with_source(e))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_RETRY_AFTER);
            return Err(PageFailure {
                error: ProviderError::rate_limited(format!("slack returned {}", status)),
                retry_after: Some(retry_after),
            });
        }
        if status.is_server_error() {
            return Err(ProviderError::server(format!("slack returned {}", status)).into());
        }
        if !status.is_success() {
            return Err(ProviderError::bad_request(format!("slack returned {}", status)).into());
        }

        let body = response.text().await.map_err(|e| {
            ProviderError::network(format!("failed to read response: {}", e)).with_source(e)
        })?;
        Ok(parse_page(&body)?)
    }

    /// Converts a message to a record; messages without an author are skipped.
    fn to_record(&self, message: SlackMessage) -> Option<Record> {
        let user = message.user?;
        let Some(timestamp) = parse_ts(&message.ts) else {
            warn!(ts = %message.ts, "skipping message with unparseable timestamp");
            return None;
        };

        let origin = if self.config.internal_member_ids.contains(&user) {
            Origin::Internal
        } else {
            Origin::External
        };

        let mut record =
            Record::new(timestamp, origin, message.text).with_extra_field(AUTHOR_ID_FIELD, user);
        if let Some(ref domain) = self.config.workspace_domain {
            match permalink(domain, &self.config.channel_id, &message.ts) {
                Some(link) => record = record.with_source_ref(link),
                None => warn!(ts = %message.ts, "could not build permalink"),
            }
        }
        Some(record)
    }
}

/// Parses a page body, mapping `ok: false` to a provider error.
fn parse_page(body: &str) -> ProviderResult<HistoryPage> {
    let page: HistoryPage = serde_json::from_str(body).map_err(|e| {
        ProviderError::invalid_response(format!("unexpected response: {}", e)).with_source(e)
    })?;
    if page.ok {
        return Ok(page);
    }
    let code = page.error.unwrap_or_else(|| "unknown_error".to_string());
    Err(match code.as_str() {
        "invalid_auth" | "not_authed" | "account_inactive" | "token_revoked" | "token_expired" => {
            ProviderError::authentication(code)
        }
        "missing_scope" | "not_in_channel" => ProviderError::authorization(code),
        "channel_not_found" => ProviderError::not_found(code),
        "ratelimited" => ProviderError::rate_limited(code),
        _ => ProviderError::bad_request(code),
    })
}

/// Parses a Slack `ts` (`"1712345678.000200"`, seconds and microseconds).
pub fn parse_ts(ts: &str) -> Option<DateTime<Utc>> {
    let (secs, frac) = ts.split_once('.').unwrap_or((ts, ""));
    let secs: i64 = secs.parse().ok()?;
    let micros: u32 = if frac.is_empty() {
        0
    } else {
        let digits: String = frac.chars().chain(std::iter::repeat('0')).take(6).collect();
        digits.parse().ok()?
    };
    DateTime::from_timestamp(secs, micros * 1_000)
}

/// Formats a timestamp the way Slack expects `oldest` and `latest`.
fn format_ts(dt: DateTime<Utc>) -> String {
    format!("{}.{:06}", dt.timestamp(), dt.timestamp_subsec_micros())
}

/// Builds `https://{domain}/archives/{channel}/p{ts without dot}`.
pub fn permalink(domain: &str, channel_id: &str, ts: &str) -> Option<Url> {
    let id: String = ts.chars().filter(|c| *c != '.').collect();
    Url::parse(&format!("https://{}/archives/{}/p{}", domain, channel_id, id)).ok()
}

impl RecordSource for SlackSource {
    fn name(&self) -> &str {
        "slack"
    }

    fn fetch_records(&self, window: FetchWindow) -> BoxFuture<'_, ProviderResult<Vec<Record>>> {
        Box::pin(async move {
            let mut records = Vec::new();
            let mut cursor: Option<String> = None;
            let mut pages = 0usize;

            loop {
                let page = self
                    .fetch_page(window, cursor.as_deref())
                    .await
                    .map_err(|e| e.with_provider("slack"))?;
                pages += 1;

                records.extend(
                    page.messages
                        .into_iter()
                        .filter_map(|m| self.to_record(m))
                        .filter(|r| window.contains(r.timestamp)),
                );

                match page
                    .response_metadata
                    .and_then(|m| m.next_cursor)
                    .filter(|c| !c.is_empty())
                {
                    Some(next) => cursor = Some(next),
                    None => break,
                }
            }

            records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            debug!(
                channel = %self.config.channel_id,
                pages,
                records = records.len(),
                %window,
                "fetched slack history"
            );
            Ok(records)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;
    use chrono::TimeZone;

    fn source(domain: Option<&str>) -> SlackSource {
        let mut config = SlackConfig::new("xoxb-test", "C0123").with_internal_members(["UINT"]);
        if let Some(domain) = domain {
            config = config.with_workspace_domain(domain);
        }
        SlackSource::new(config).unwrap()
    }

    fn message(ts: &str, user: Option<&str>, text: &str) -> SlackMessage {
        SlackMessage {
            ts: ts.to_string(),
            user: user.map(String::from),
            text: text.to_string(),
        }
    }

    #[test]
    fn parse_ts_variants() {
        let dt = parse_ts("1712345678.000200").unwrap();
        assert_eq!(dt.timestamp(), 1712345678);
        assert_eq!(dt.timestamp_subsec_micros(), 200);
        assert_eq!(parse_ts("1712345678").unwrap().timestamp(), 1712345678);
        assert_eq!(
            parse_ts("1712345678.5").unwrap().timestamp_subsec_micros(),
            500_000
        );
        assert_eq!(parse_ts("abc.123"), None);
        assert_eq!(parse_ts(""), None);
    }

    #[test]
    fn format_ts_matches_slack() {
        let dt = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(format_ts(dt), "1740787200.000000");
        assert_eq!(parse_ts(&format_ts(dt)), Some(dt));
    }

    #[test]
    fn permalink_drops_dot() {
        let link = permalink("acme.slack.com", "C0123", "1712345678.000200").unwrap();
        assert_eq!(
            link.as_str(),
            "https://acme.slack.com/archives/C0123/p1712345678000200"
        );
    }

    #[test]
    fn records_are_classified_and_linked() {
        let src = source(Some("acme.slack.com"));
        let internal = src
            .to_record(message("1712345678.000200", Some("UINT"), "deploy done"))
            .unwrap();
        assert_eq!(internal.origin, Origin::Internal);
        assert_eq!(internal.source_text, "deploy done");
        assert_eq!(internal.extra_field(AUTHOR_ID_FIELD), Some("UINT"));
        assert!(internal.source_ref.is_some());

        let external = src
            .to_record(message("1712345679.000000", Some("UEXT"), "printer broken"))
            .unwrap();
        assert_eq!(external.origin, Origin::External);
    }

    #[test]
    fn messages_without_author_or_domain() {
        let src = source(None);
        assert!(src.to_record(message("1.0", None, "joined")).is_none());
        assert!(src.to_record(message("bogus", Some("U1"), "x")).is_none());
        let record = src.to_record(message("1.0", Some("U1"), "x")).unwrap();
        assert_eq!(record.source_ref, None);
    }

    #[test]
    fn parse_page_with_cursor() {
        let page = parse_page(
            r#"{"ok":true,"messages":[{"type":"message","user":"U1","text":"hi","ts":"1712345678.000200"},{"type":"message","subtype":"channel_join","ts":"1712345600.000100"}],"has_more":true,"response_metadata":{"next_cursor":"bmV4dA=="}}"#,
        )
        .unwrap();
        assert_eq!(page.messages.len(), 2);
        assert_eq!(
            page.response_metadata.unwrap().next_cursor.as_deref(),
            Some("bmV4dA==")
        );
    }

    #[test]
    fn parse_page_errors() {
        let cases = [
            ("invalid_auth", ProviderErrorCode::AuthenticationFailed),
            ("not_authed", ProviderErrorCode::AuthenticationFailed),
            ("not_in_channel", ProviderErrorCode::AuthorizationFailed),
            ("channel_not_found", ProviderErrorCode::NotFound),
            ("ratelimited", ProviderErrorCode::RateLimited),
            ("invalid_cursor", ProviderErrorCode::BadRequest),
        ];
        for (code, expected) in cases {
            let body = format!(r#"{{"ok":false,"error":"{}"}}"#, code);
            let err = parse_page(&body).unwrap_err();
            assert_eq!(err.code(), expected, "{}", code);
            assert_eq!(err.message(), code);
        }

        let err = parse_page("<html>").unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::InvalidResponse);
    }

    /// One canned HTTP response.
    struct Canned {
        status: u16,
        headers: &'static str,
        body: String,
    }

    impl Canned {
        fn json(body: &str) -> Self {
            Self {
                status: 200,
                headers: "",
                body: body.to_string(),
            }
        }

        fn status(status: u16, headers: &'static str) -> Self {
            Self {
                status,
                headers,
                body: "{}".to_string(),
            }
        }
    }

    /// Serves `responses` in order, one connection each, and returns the
    /// request lines it saw.
    async fn serve(responses: Vec<Canned>) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let mut seen = Vec::new();
            for canned in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                loop {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                    if request.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                let request = String::from_utf8_lossy(&request);
                seen.push(request.lines().next().unwrap_or_default().to_string());

                let response = format!(
                    "HTTP/1.1 {} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n{}\r\n{}",
                    canned.status,
                    canned.body.len(),
                    canned.headers,
                    canned.body
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
            seen
        });
        (base, handle)
    }

    fn source_at(base: &str) -> SlackSource {
        let config = SlackConfig::new("xoxb-test", "C0123")
            .with_internal_members(["UINT"])
            .with_api_base(base)
            .with_retry_backoff(Duration::ZERO);
        SlackSource::new(config).unwrap()
    }

    #[tokio::test]
    async fn follows_cursors_and_retries_rate_limit() {
        let (base, server) = serve(vec![
            Canned::json(
                r#"{"ok":true,"messages":[
                    {"ts":"1712345900.000100","user":"UINT","text":"newest"},
                    {"ts":"1712345800.000100","user":"UEXT","text":"middle"}
                ],"response_metadata":{"next_cursor":"c2"}}"#,
            ),
            Canned::status(429, "Retry-After: 0\r\n"),
            Canned::json(
                r#"{"ok":true,"messages":[
                    {"ts":"1712345700.000100","user":"UEXT","text":"oldest"},
                    {"ts":"1712345750.000100","subtype":"channel_join","text":"joined"}
                ],"response_metadata":{"next_cursor":""}}"#,
            ),
        ])
        .await;

        let records = source_at(&base)
            .fetch_records(FetchWindow::unbounded())
            .await
            .unwrap();

        let texts: Vec<_> = records.iter().map(|r| r.source_text.as_str()).collect();
        assert_eq!(texts, ["newest", "middle", "oldest"]);
        assert_eq!(records[0].origin, Origin::Internal);
        assert_eq!(records[2].origin, Origin::External);

        let requests = server.await.unwrap();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].starts_with("GET /conversations.history?channel=C0123"));
        assert!(!requests[0].contains("cursor="));
        assert!(requests[1].contains("cursor=c2"));
        assert!(requests[2].contains("cursor=c2"));
    }

    #[tokio::test]
    async fn window_bounds_are_sent_and_enforced() {
        let (base, server) = serve(vec![Canned::json(
            r#"{"ok":true,"messages":[
                {"ts":"1712345700.000000","user":"UEXT","text":"inside"},
                {"ts":"1712345500.000000","user":"UEXT","text":"before"}
            ]}"#,
        )])
        .await;
        let start = parse_ts("1712345600").unwrap();
        let window = FetchWindow::new(Some(start), None).unwrap();

        let records = source_at(&base).fetch_records(window).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source_text, "inside");
        let requests = server.await.unwrap();
        assert!(requests[0].contains("oldest=1712345600.000000"));
        assert!(!requests[0].contains("latest="));
    }

    #[tokio::test]
    async fn server_errors_give_up_after_max_retries() {
        let (base, server) = serve(
            (0..=MAX_RETRIES)
                .map(|_| Canned::status(503, ""))
                .collect(),
        )
        .await;

        let err = source_at(&base)
            .fetch_records(FetchWindow::unbounded())
            .await
            .unwrap_err();

        assert_eq!(err.code(), ProviderErrorCode::ServerError);
        assert_eq!(err.provider(), Some("slack"));
        assert!(err.message().contains("gave up after 3 retries"));
        assert_eq!(server.await.unwrap().len(), MAX_RETRIES as usize + 1);
    }

    #[tokio::test]
    async fn long_retry_after_is_not_waited_for() {
        let (base, server) = serve(vec![Canned::status(429, "Retry-After: 3600\r\n")]).await;

        let err = source_at(&base)
            .fetch_records(FetchWindow::unbounded())
            .await
            .unwrap_err();

        assert_eq!(err.code(), ProviderErrorCode::RateLimited);
        assert!(err.message().contains("3600s"));
        assert_eq!(server.await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let (base, server) = serve(vec![
            Canned::status(403, ""),
            Canned::json(r#"{"ok":true,"messages":[]}"#),
        ])
        .await;

        let err = source_at(&base)
            .fetch_records(FetchWindow::unbounded())
            .await
            .unwrap_err();

        assert_eq!(err.code(), ProviderErrorCode::BadRequest);
        server.abort();
    }
}
