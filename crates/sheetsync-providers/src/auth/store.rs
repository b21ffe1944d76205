//! Durable refresh token storage.
//!
//! The store holds exactly one [`Credential`]: the most recently issued
//! refresh token. Providers invalidate older tokens on rotation, so a store
//! must never be left holding a stale one. Writers replace the value whole.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use sheetsync_core::Redacted;

use crate::error::StoreError;

/// A persisted refresh token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// The refresh token.
    pub refresh_token: String,
    /// When the token was issued or imported.
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    /// Creates a credential stamped with `updated_at`.
    pub fn new(refresh_token: impl Into<String>, updated_at: DateTime<Utc>) -> Self {
        Self {
            refresh_token: refresh_token.into(),
            updated_at,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("refresh_token", &Redacted(&self.refresh_token))
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Storage backend for the refresh token.
///
/// Operations are synchronous: they touch a local file or the OS secret
/// store and complete quickly.
pub trait CredentialStore: Send + Sync {
    /// Returns the stored credential, or `None` if nothing is stored.
    fn load(&self) -> Result<Option<Credential>, StoreError>;

    /// Replaces the stored credential.
    fn save(&self, credential: &Credential) -> Result<(), StoreError>;

    /// Removes the stored credential. Clearing an empty store is not an error.
    fn clear(&self) -> Result<(), StoreError>;

    /// Human-readable location of the store, for status output.
    fn describe(&self) -> String;
}

/// Stores the credential as JSON in a file.
///
/// Writes go to a temporary sibling and are renamed into place, so a crash
/// mid-write leaves the previous token intact. On Unix the file is readable
/// by its owner only.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Creates a store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the credential file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<Credential>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no credential file at {:?}", self.path);
                return Ok(None);
            }
            Err(e) => return Err(self.io_error(e)),
        };

        let credential: Credential =
            serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        debug!("loaded credential from {:?}", self.path);
        Ok(Some(credential))
    }

    fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let content = serde_json::to_string_pretty(credential).map_err(|source| {
            StoreError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &content).map_err(|e| self.io_error(e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600))
                .map_err(|e| self.io_error(e))?;
        }

        fs::rename(&temp_path, &self.path).map_err(|e| self.io_error(e))?;
        info!("saved credential to {:?}", self.path);
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("removed credential file {:?}", self.path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

/// Keeps the credential in memory. Used by tests and for `--dry-run` style
/// flows that must not touch the real store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    credential: Option<Credential>,
    saves: usize,
    fail_saves: bool,
}

impl MemoryCredentialStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `credential`.
    pub fn with_credential(credential: Credential) -> Self {
        let store = Self::default();
        store.state().credential = Some(credential);
        store
    }

    /// Makes every later `save` fail.
    pub fn fail_saves(&self) {
        self.state().fail_saves = true;
    }

    /// Returns the stored credential.
    pub fn current(&self) -> Option<Credential> {
        self.state().credential.clone()
    }

    /// Returns how many times `save` succeeded.
    pub fn save_count(&self) -> usize {
        self.state().saves
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<Credential>, StoreError> {
        Ok(self.current())
    }

    fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.fail_saves {
            return Err(StoreError::Io {
                path: PathBuf::from("<memory>"),
                source: std::io::Error::other("save disabled"),
            });
        }
        state.credential = Some(credential.clone());
        state.saves += 1;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.state().credential = None;
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Stores the credential in the OS secret store (Keychain, Secret Service,
/// Windows Credential Manager).
#[cfg(feature = "keyring")]
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service: String,
    account: String,
}

#[cfg(feature = "keyring")]
impl KeyringCredentialStore {
    /// Service name used when none is configured.
    pub const DEFAULT_SERVICE: &'static str = "sheetsync";

    /// Creates a store for the given service and account.
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, StoreError> {
        keyring::Entry::new(&self.service, &self.account)
            .map_err(|err| StoreError::Keyring(err.to_string()))
    }
}

#[cfg(feature = "keyring")]
impl CredentialStore for KeyringCredentialStore {
    fn load(&self) -> Result<Option<Credential>, StoreError> {
        let secret = match self.entry()?.get_password() {
            Ok(secret) => secret,
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(err) => return Err(StoreError::Keyring(err.to_string())),
        };
        serde_json::from_str(&secret)
            .map(Some)
            .map_err(|err| StoreError::Keyring(format!("stored credential is corrupt: {}", err)))
    }

    fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        let secret = serde_json::to_string(credential)
            .map_err(|err| StoreError::Keyring(err.to_string()))?;
        self.entry()?
            .set_password(&secret)
            .map_err(|err| StoreError::Keyring(err.to_string()))?;
        info!(service = %self.service, account = %self.account, "saved credential to keyring");
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(StoreError::Keyring(err.to_string())),
        }
    }

    fn describe(&self) -> String {
        format!("keyring {}/{}", self.service, self.account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn credential(token: &str) -> Credential {
        Credential::new(token, Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap())
    }

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("nested/credential.json"));

        assert_eq!(store.load().unwrap(), None);
        store.save(&credential("rt-1")).unwrap();
        assert_eq!(store.load().unwrap(), Some(credential("rt-1")));

        store.save(&credential("rt-2")).unwrap();
        assert_eq!(store.load().unwrap().unwrap().refresh_token, "rt-2");
        assert!(!dir.path().join("nested/credential.json.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("credential.json"));
        store.save(&credential("rt")).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn file_store_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("credential.json"));
        store.clear().unwrap();
        store.save(&credential("rt")).unwrap();
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credential.json");
        fs::write(&path, "not json").unwrap();
        let err = FileCredentialStore::new(&path).load().unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn memory_store_counts_saves() {
        let store = MemoryCredentialStore::with_credential(credential("old"));
        assert_eq!(store.load().unwrap(), Some(credential("old")));
        store.save(&credential("new")).unwrap();
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.current(), Some(credential("new")));

        store.fail_saves();
        assert!(store.save(&credential("newer")).is_err());
        assert_eq!(store.current(), Some(credential("new")));
    }

    #[test]
    fn credential_debug_is_redacted() {
        let dbg = format!("{:?}", credential("0.ARoAv4j5cvGGr0GRqy180BHbR-secret"));
        assert!(!dbg.contains("secret"));
        assert!(dbg.contains("0.AR"));
    }
}
