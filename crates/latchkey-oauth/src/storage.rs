//! Secure key/value storage for session persistence.
//!
//! The broker only needs `get`/`set`/`remove` on string values. Backends:
//! - [`MemoryStorage`]: process-local, for tests and ephemeral sessions
//! - [`FileStorage`]: JSON map in a single owner-only file
//! - [`KeyringStorage`]: OS keyring (`keyring` feature)

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::StorageError;
use crate::token::TokenRecord;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const EXPIRES_AT_KEY: &str = "access_expires_at_utc";

// ============================================================================
// SecureStorage Trait
// ============================================================================

/// A secret store keyed by stable strings.
pub trait SecureStorage: Send + Sync + std::fmt::Debug {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> StorageResult<()>;
}

pub type SharedStorage = Arc<dyn SecureStorage>;

// ============================================================================
// MemoryStorage
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl SecureStorage for MemoryStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

// ============================================================================
// FileStorage
// ============================================================================

/// Default token file name within the latchkey config directory.
pub const TOKEN_FILE: &str = "tokens.json";

/// File-backed storage. The whole map is rewritten on every change and the
/// file is deleted once it holds nothing.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Storage at `<dir>/tokens.json`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(TOKEN_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    fn read_map(&self) -> StorageResult<BTreeMap<String, String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    /// Current map for a read-modify-write. Content that no longer parses
    /// is discarded so the write replaces it; the flag reports that case.
    fn read_map_for_update(&self) -> StorageResult<(BTreeMap<String, String>, bool)> {
        match self.read_map() {
            Ok(map) => Ok((map, false)),
            Err(StorageError::Serialization(e)) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Discarding unreadable token file");
                Ok((BTreeMap::new(), true))
            }
            Err(e) => Err(e),
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> StorageResult<()> {
        if map.is_empty() {
            return match std::fs::remove_file(&self.path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(self.io_error(e)),
                _ => Ok(()),
            };
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let json = serde_json::to_string_pretty(map)?;
        std::fs::write(&self.path, json).map_err(|e| self.io_error(e))?;
        restrict_permissions(&self.path).map_err(|e| self.io_error(e))?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

impl SecureStorage for FileStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let _guard = self.lock.lock();
        Ok(self.read_map()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let _guard = self.lock.lock();
        let (mut map, _) = self.read_map_for_update()?;
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let _guard = self.lock.lock();
        let (mut map, discarded) = self.read_map_for_update()?;
        if map.remove(key).is_some() || discarded {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

// ============================================================================
// KeyringStorage
// ============================================================================

/// OS keyring storage: one entry per key under a fixed service name.
#[cfg(feature = "keyring")]
#[derive(Debug)]
pub struct KeyringStorage {
    service: String,
}

#[cfg(feature = "keyring")]
impl KeyringStorage {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> StorageResult<keyring::Entry> {
        keyring::Entry::new(&self.service, key).map_err(|e| StorageError::Keyring(e.to_string()))
    }
}

#[cfg(feature = "keyring")]
impl SecureStorage for KeyringStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(StorageError::Keyring(e.to_string())),
        }
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.entry(key)?
            .set_password(value)
            .map_err(|e| StorageError::Keyring(e.to_string()))
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StorageError::Keyring(e.to_string())),
        }
    }
}

// ============================================================================
// TokenStore
// ============================================================================

/// Maps a [`TokenRecord`] onto stable storage keys.
#[derive(Debug, Clone)]
pub struct TokenStore {
    storage: SharedStorage,
}

impl TokenStore {
    pub fn new(storage: SharedStorage) -> Self {
        Self { storage }
    }

    /// Restore a persisted record. Missing keys yield an empty record; an
    /// unreadable expiry yields an already-expired one so a refresh is tried.
    pub fn load(&self) -> StorageResult<TokenRecord> {
        let access_token = self.storage.get(ACCESS_TOKEN_KEY)?.unwrap_or_default();
        let refresh_token = self
            .storage
            .get(REFRESH_TOKEN_KEY)?
            .filter(|r| !r.is_empty());
        let access_expires_at = self.storage.get(EXPIRES_AT_KEY)?.and_then(|raw| {
            match DateTime::parse_from_rfc3339(&raw) {
                Ok(at) => Some(at.with_timezone(&Utc)),
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring unreadable persisted token expiry");
                    None
                }
            }
        });

        Ok(TokenRecord {
            access_token,
            refresh_token,
            access_expires_at,
            scope: None,
            issued_at: None,
        })
    }

    pub fn save(&self, record: &TokenRecord) -> StorageResult<()> {
        self.storage.set(ACCESS_TOKEN_KEY, &record.access_token)?;
        match record.refresh_token.as_deref() {
            Some(refresh) => self.storage.set(REFRESH_TOKEN_KEY, refresh)?,
            None => self.storage.remove(REFRESH_TOKEN_KEY)?,
        }
        match record.access_expires_at {
            Some(at) => self.storage.set(EXPIRES_AT_KEY, &at.to_rfc3339())?,
            None => self.storage.remove(EXPIRES_AT_KEY)?,
        }
        Ok(())
    }

    /// Remove every persisted key, attempting all of them even if one fails.
    pub fn erase(&self) -> StorageResult<()> {
        let mut first_error = None;
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, EXPIRES_AT_KEY] {
            if let Err(e) = self.storage.remove(key) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_record() -> TokenRecord {
        TokenRecord {
            access_token: "test_access".to_string(),
            refresh_token: Some("test_refresh".to_string()),
            access_expires_at: Some(Utc::now() + chrono::Duration::seconds(3600)),
            scope: None,
            issued_at: None,
        }
    }

    #[test]
    fn test_memory_storage_roundtrip() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get("k").unwrap(), None);
        storage.set("k", "v").unwrap();
        assert_eq!(storage.get("k").unwrap().as_deref(), Some("v"));
        storage.remove("k").unwrap();
        storage.remove("k").unwrap();
        assert!(storage.is_empty());
    }

    #[test]
    fn test_file_storage_persists_across_instances() {
        let temp = tempdir().unwrap();
        FileStorage::in_dir(temp.path()).set("k", "v").unwrap();

        let reopened = FileStorage::in_dir(temp.path());
        assert_eq!(reopened.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_file_storage_deletes_file_when_empty() {
        let temp = tempdir().unwrap();
        let storage = FileStorage::in_dir(&temp.path().join("nested"));
        storage.set("a", "1").unwrap();
        assert!(storage.path().exists());

        storage.remove("a").unwrap();
        assert!(!storage.path().exists());
        assert_eq!(storage.get("a").unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_storage_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let temp = tempdir().unwrap();
        let storage = FileStorage::in_dir(temp.path());
        storage.set("a", "1").unwrap();
        let mode = std::fs::metadata(storage.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_file_storage_rejects_corrupt_file() {
        let temp = tempdir().unwrap();
        let storage = FileStorage::in_dir(temp.path());
        std::fs::write(storage.path(), "not json").unwrap();
        assert!(matches!(
            storage.get("a"),
            Err(StorageError::Serialization(_))
        ));
    }

    #[test]
    fn test_file_storage_writes_replace_corrupt_file() {
        let temp = tempdir().unwrap();
        let storage = FileStorage::in_dir(temp.path());

        std::fs::write(storage.path(), "{ truncated").unwrap();
        storage.set("a", "1").unwrap();
        assert_eq!(storage.get("a").unwrap().as_deref(), Some("1"));

        // Removing from a corrupt file clears it even though the key is absent.
        std::fs::write(storage.path(), "{ truncated").unwrap();
        storage.remove("a").unwrap();
        assert!(!storage.path().exists());
    }

    #[test]
    fn test_token_store_save_and_load() {
        let storage = Arc::new(MemoryStorage::new());
        let store = TokenStore::new(storage.clone());
        let record = sample_record();

        store.save(&record).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.access_token, "test_access");
        assert_eq!(loaded.refresh_token.as_deref(), Some("test_refresh"));
        assert_eq!(
            loaded.access_expires_at.map(|t| t.timestamp()),
            record.access_expires_at.map(|t| t.timestamp())
        );
    }

    #[test]
    fn test_token_store_erase_removes_every_key() {
        let storage = Arc::new(MemoryStorage::new());
        let store = TokenStore::new(storage.clone());
        store.save(&sample_record()).unwrap();
        assert_eq!(storage.len(), 3);

        store.erase().unwrap();
        assert!(storage.is_empty());
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_unreadable_expiry_loads_as_expired() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(ACCESS_TOKEN_KEY, "a").unwrap();
        storage.set(REFRESH_TOKEN_KEY, "r").unwrap();
        storage.set(EXPIRES_AT_KEY, "yesterday-ish").unwrap();

        let record = TokenStore::new(storage).load().unwrap();
        assert_eq!(record.access_token, "a");
        assert!(record.has_refresh_token());
        assert!(record.access_expires_at.is_none());
        assert!(!record.is_usable(Utc::now(), std::time::Duration::from_secs(60)));
    }
}
