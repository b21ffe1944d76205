//! Shared reqwest plumbing: client construction and error body parsing.

use std::time::Duration;

use reqwest::header::HeaderMap;
use serde::Deserialize;

use crate::error::ExchangeDiagnostics;

/// User agent sent with every request.
pub(crate) const USER_AGENT: &str = concat!("sheetsync/", env!("CARGO_PKG_VERSION"));

/// Builds an HTTP client with the given request timeout.
pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
}

/// Returns the server's correlation id for a response.
///
/// Microsoft identity and Graph endpoints use `request-id`; some gateways
/// only echo `client-request-id` or `x-ms-request-id`.
pub(crate) fn request_id(headers: &HeaderMap) -> Option<String> {
    ["request-id", "x-ms-request-id", "client-request-id"]
        .iter()
        .find_map(|name| headers.get(*name))
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

/// Describes a transport failure (no response received).
pub(crate) fn transport_message(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request timeout".to_string()
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        format!("request failed: {}", err)
    }
}

/// OAuth 2.0 error body (RFC 6749 section 5.2).
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Graph style error body: `{"error": {"code": ..., "message": ...}}`.
#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    error: GraphErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GraphErrorDetail {
    code: String,
    #[serde(default)]
    message: Option<String>,
}

/// Builds diagnostics from a failed response's status, headers and body.
///
/// Both OAuth and Graph error shapes are understood; anything else keeps the
/// raw body as the description.
pub(crate) fn diagnostics(status: u16, headers: &HeaderMap, body: &str) -> ExchangeDiagnostics {
    let base = ExchangeDiagnostics::with_status(status).with_request_id(request_id(headers));

    if let Ok(oauth) = serde_json::from_str::<OAuthErrorBody>(body) {
        let diag = base.with_error_code(oauth.error);
        return match oauth.error_description {
            Some(desc) => diag.with_description(desc),
            None => diag,
        };
    }
    if let Ok(graph) = serde_json::from_str::<GraphErrorBody>(body) {
        let diag = base.with_error_code(graph.error.code);
        return match graph.error.message {
            Some(msg) => diag.with_description(msg),
            None => diag,
        };
    }
    base.with_description(body)
}
