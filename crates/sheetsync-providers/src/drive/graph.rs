//! Microsoft Graph drive client.

use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{ExchangeDiagnostics, HostError};
use crate::http;
use crate::source::BoxFuture;

use super::config::{DriveConfig, SIMPLE_UPLOAD_LIMIT};
use super::host::{FileHost, FileMetadata};

/// Conflict behaviour requested for upload sessions.
const REPLACE_ON_CONFLICT: &str = r#"{"item":{"@microsoft.graph.conflictBehavior":"replace"}}"#;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadSession {
    upload_url: String,
}

/// A [`FileHost`] backed by a OneDrive or SharePoint drive.
#[derive(Debug)]
pub struct GraphDriveHost {
    config: DriveConfig,
    http_client: reqwest::Client,
    access_token: String,
}

impl GraphDriveHost {
    /// Creates a client authorized with `access_token`.
    pub fn new(config: DriveConfig, access_token: impl Into<String>) -> Result<Self, HostError> {
        let http_client = http::build_client(config.timeout)
            .map_err(|e| HostError::Transport(http::transport_message(&e)))?;
        Ok(Self {
            config,
            http_client,
            access_token: access_token.into(),
        })
    }

    /// Returns the config.
    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    /// Sends a request and returns the response if it succeeded.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, HostError> {
        let response = request
            .send()
            .await
            .map_err(|e| HostError::Transport(http::transport_message(&e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        let diagnostics = http::diagnostics(status.as_u16(), &headers, &body);
        debug!(%diagnostics, "drive request failed");
        Err(classify(status, diagnostics))
    }

    async fn json<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, HostError> {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| HostError::Transport(format!("failed to read response: {}", e)))?;
        serde_json::from_str(&body).map_err(|e| {
            HostError::Status(
                ExchangeDiagnostics::with_status(status)
                    .with_description(format!("unexpected response body: {}", e)),
            )
        })
    }

    async fn put_simple(
        &self,
        path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<FileMetadata, HostError> {
        let request = self
            .http_client
            .put(self.config.content_url(path))
            .bearer_auth(&self.access_token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes.to_vec());
        let response = self.send(request).await?;
        Self::json(response).await
    }

    async fn put_session(&self, path: &str, bytes: &[u8]) -> Result<FileMetadata, HostError> {
        let request = self
            .http_client
            .post(self.config.upload_session_url(path))
            .bearer_auth(&self.access_token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(REPLACE_ON_CONFLICT);
        let session: UploadSession = Self::json(self.send(request).await?).await?;

        let total = bytes.len();
        let mut last = None;
        for (start, end) in chunk_ranges(total, self.config.chunk_size) {
            let chunk = &bytes[start..=end];
            debug!(path, start, end, total, "uploading chunk");
            // The upload URL is pre-authorized; a bearer header is rejected.
            let request = self
                .http_client
                .put(&session.upload_url)
                .header(reqwest::header::CONTENT_RANGE, content_range(start, end, total))
                .body(chunk.to_vec());
            last = Some(self.send(request).await?);
        }

        match last {
            Some(response) if response.status() != StatusCode::ACCEPTED => {
                Self::json(response).await
            }
            _ => Err(HostError::Status(
                ExchangeDiagnostics::with_status(StatusCode::ACCEPTED.as_u16())
                    .with_description("upload session ended without a committed item"),
            )),
        }
    }
}

/// Maps a failed status to a host error.
fn classify(status: StatusCode, diagnostics: ExchangeDiagnostics) -> HostError {
    match status {
        StatusCode::NOT_FOUND => HostError::NotFound(diagnostics),
        StatusCode::CONFLICT | StatusCode::LOCKED => HostError::Locked(diagnostics),
        _ => HostError::Status(diagnostics),
    }
}

/// Splits `total` bytes into inclusive `(start, end)` ranges.
fn chunk_ranges(total: usize, chunk_size: usize) -> Vec<(usize, usize)> {
    let chunk_size = chunk_size.max(1);
    (0..total)
        .step_by(chunk_size)
        .map(|start| (start, (start + chunk_size).min(total) - 1))
        .collect()
}

fn content_range(start: usize, end: usize, total: usize) -> String {
    format!("bytes {}-{}/{}", start, end, total)
}

impl FileHost for GraphDriveHost {
    fn metadata<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<FileMetadata, HostError>> {
        Box::pin(async move {
            let request = self
                .http_client
                .get(self.config.item_url(path))
                .bearer_auth(&self.access_token);
            Self::json(self.send(request).await?).await
        })
    }

    fn get_content<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, HostError>> {
        Box::pin(async move {
            let request = self
                .http_client
                .get(self.config.content_url(path))
                .bearer_auth(&self.access_token);
            let response = self.send(request).await?;
            let bytes = response
                .bytes()
                .await
                .map_err(|e| HostError::Transport(format!("failed to read content: {}", e)))?;
            debug!(path, len = bytes.len(), "downloaded content");
            Ok(bytes.to_vec())
        })
    }

    fn put_content<'a>(
        &'a self,
        path: &'a str,
        bytes: &'a [u8],
        content_type: &'a str,
    ) -> BoxFuture<'a, Result<FileMetadata, HostError>> {
        Box::pin(async move {
            let meta = if bytes.len() > SIMPLE_UPLOAD_LIMIT {
                info!(path, len = bytes.len(), "uploading through an upload session");
                self.put_session(path, bytes).await?
            } else {
                self.put_simple(path, bytes, content_type).await?
            };
            debug!(path, etag = ?meta.etag, "upload committed");
            Ok(meta)
        })
    }
}
