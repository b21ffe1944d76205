//! Drive host configuration.

use std::time::Duration;

/// Default Graph API root.
pub const DEFAULT_API_BASE: &str = "https://graph.microsoft.com/v1.0";

/// Documents larger than this are sent through an upload session.
pub const SIMPLE_UPLOAD_LIMIT: usize = 4 * 1024 * 1024;

/// Upload session chunks must be a multiple of this size.
pub const UPLOAD_CHUNK_UNIT: usize = 320 * 1024;

/// Configuration for [`GraphDriveHost`](super::GraphDriveHost).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveConfig {
    /// API root, without a trailing slash.
    pub api_base: String,
    /// Drive owner (user principal name). `None` addresses the signed-in
    /// user's drive.
    pub owner: Option<String>,
    /// Request timeout.
    pub timeout: Duration,
    /// Upload session chunk size, a multiple of [`UPLOAD_CHUNK_UNIT`].
    pub chunk_size: usize,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            owner: None,
            timeout: Duration::from_secs(60),
            chunk_size: 10 * UPLOAD_CHUNK_UNIT,
        }
    }
}

impl DriveConfig {
    /// Sets the API root.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Addresses the drive of `owner` instead of the signed-in user.
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        let owner = owner.into();
        self.owner = (!owner.trim().is_empty()).then_some(owner);
        self
    }

    /// Sets the upload chunk size, rounded down to a multiple of
    /// [`UPLOAD_CHUNK_UNIT`] (at least one unit).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = (chunk_size / UPLOAD_CHUNK_UNIT).max(1) * UPLOAD_CHUNK_UNIT;
        self
    }

    /// Returns the drive root, e.g. `https://graph.microsoft.com/v1.0/me/drive`.
    pub fn drive_root(&self) -> String {
        match self.owner {
            Some(ref owner) => format!(
                "{}/users/{}/drive",
                self.api_base,
                urlencoding::encode(owner)
            ),
            None => format!("{}/me/drive", self.api_base),
        }
    }

    /// Returns the item address for an absolute path (`root:/a/b.xlsx`).
    ///
    /// Each path segment is percent-encoded; the separators are kept.
    pub fn item_url(&self, path: &str) -> String {
        let encoded: Vec<String> = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("{}/root:/{}", self.drive_root(), encoded.join("/"))
    }

    /// Returns the content address for an absolute path.
    pub fn content_url(&self, path: &str) -> String {
        format!("{}:/content", self.item_url(path))
    }

    /// Returns the upload session address for an absolute path.
    pub fn upload_session_url(&self, path: &str) -> String {
        format!("{}:/createUploadSession", self.item_url(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses_signed_in_user_drive() {
        let config = DriveConfig::default();
        assert_eq!(
            config.content_url("/Documents/Tickets 2025.xlsx"),
            "https://graph.microsoft.com/v1.0/me/drive/root:/Documents/Tickets%202025.xlsx:/content"
        );
    }

    #[test]
    fn addresses_owner_drive() {
        let config = DriveConfig::default()
            .with_api_base("http://localhost:8080/v1.0/")
            .with_owner("ops@example.com");
        assert_eq!(
            config.item_url("Shared/a.xlsx"),
            "http://localhost:8080/v1.0/users/ops%40example.com/drive/root:/Shared/a.xlsx"
        );
        assert_eq!(
            config.upload_session_url("/a.xlsx"),
            "http://localhost:8080/v1.0/users/ops%40example.com/drive/root:/a.xlsx:/createUploadSession"
        );
    }

    #[test]
    fn blank_owner_is_ignored() {
        assert_eq!(DriveConfig::default().with_owner("  ").owner, None);
    }

    #[test]
    fn chunk_size_is_rounded() {
        let config = DriveConfig::default().with_chunk_size(UPLOAD_CHUNK_UNIT * 3 + 17);
        assert_eq!(config.chunk_size, UPLOAD_CHUNK_UNIT * 3);
        let config = DriveConfig::default().with_chunk_size(1);
        assert_eq!(config.chunk_size, UPLOAD_CHUNK_UNIT);
    }
}
