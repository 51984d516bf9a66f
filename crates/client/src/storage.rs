//! Local persisted session state.
//!
//! Two keys are stored: `access_token` (opaque bearer string) and `user`
//! (JSON copy of the signed-in [`User`]). [`SessionVault`] only ever writes
//! or removes them together.
//!
//! The raw key/value backend is pluggable through [`SessionStorage`]:
//! [`MemoryStorage`] for tests and embedding, [`FileStorage`] for the CLI.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bazaar_core::User;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// Storage key for the bearer token.
pub const TOKEN_KEY: &str = "access_token";
/// Storage key for the cached user.
pub const USER_KEY: &str = "user";

/// Errors from the storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file exists but is not a JSON object of strings.
    #[error("storage file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Minimal async key/value store, modelled on mobile local storage.
///
/// `set_many` and `remove_many` must apply all entries or none.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Read one key.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write several keys in one step.
    async fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StorageError>;

    /// Remove several keys in one step.
    async fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError>;
}

// =============================================================================
// MemoryStorage
// =============================================================================

/// In-process storage. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStorage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StorageError> {
        let mut map = self.entries.write().await;
        for (key, value) in entries {
            map.insert((*key).to_string(), value.clone());
        }
        Ok(())
    }

    async fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError> {
        let mut map = self.entries.write().await;
        for key in keys {
            map.remove(*key);
        }
        Ok(())
    }
}

// =============================================================================
// FileStorage
// =============================================================================

/// JSON file storage.
///
/// Every write replaces the whole file through a temporary sibling and a
/// rename, so a crash mid-write leaves either the old or the new contents.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileStorage {
    /// Storage backed by the file at `path` (created on first write).
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// The backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_map(&self) -> Result<HashMap<String, String>, StorageError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(HashMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_map(&self, map: &HashMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(map)?;
        tokio::fs::write(&tmp, bytes).await?;
        restrict_permissions(&tmp).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), keys = map.len(), "Session file written");
        Ok(())
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
}

#[cfg(not(unix))]
#[allow(clippy::unused_async)]
async fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[async_trait]
impl SessionStorage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_map().await?.remove(key))
    }

    async fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map().await?;
        for (key, value) in entries {
            map.insert((*key).to_string(), value.clone());
        }
        self.write_map(&map).await
    }

    async fn remove_many(&self, keys: &[&str]) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut map = match self.read_map().await {
            Ok(map) => map,
            // A corrupt file is exactly what a purge should get rid of.
            Err(StorageError::Corrupt(e)) => {
                warn!(error = %e, "Discarding corrupt session file");
                HashMap::new()
            }
            Err(e) => return Err(e),
        };
        for key in keys {
            map.remove(*key);
        }
        self.write_map(&map).await
    }
}

// =============================================================================
// SessionVault
// =============================================================================

/// Typed access to the persisted token and cached user.
///
/// Writes go through [`SessionVault::persist`] and [`SessionVault::purge`],
/// which touch both keys in a single storage operation.
#[derive(Clone)]
pub struct SessionVault {
    storage: Arc<dyn SessionStorage>,
}

impl std::fmt::Debug for SessionVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionVault").finish_non_exhaustive()
    }
}

impl SessionVault {
    /// Wrap a storage backend.
    #[must_use]
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self { storage }
    }

    /// Vault over fresh in-memory storage.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// The persisted bearer token, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails.
    pub async fn token(&self) -> Result<Option<SecretString>, StorageError> {
        Ok(self
            .storage
            .get(TOKEN_KEY)
            .await?
            .filter(|t| !t.is_empty())
            .map(SecretString::from))
    }

    /// The cached user, if any.
    ///
    /// An unreadable cache entry is treated as absent: the cache is a
    /// convenience, never a source of truth.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails.
    pub async fn user(&self) -> Result<Option<User>, StorageError> {
        let Some(raw) = self.storage.get(USER_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable cached user");
                Ok(None)
            }
        }
    }

    /// Store token and user together.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails; nothing is written in
    /// that case.
    pub async fn persist(&self, token: &SecretString, user: &User) -> Result<(), StorageError> {
        let user_json = serde_json::to_string(user)?;
        self.storage
            .set_many(&[
                (TOKEN_KEY, token.expose_secret().to_string()),
                (USER_KEY, user_json),
            ])
            .await
    }

    /// Replace the cached user, keeping the token.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails.
    pub async fn update_user(&self, user: &User) -> Result<(), StorageError> {
        let user_json = serde_json::to_string(user)?;
        self.storage.set_many(&[(USER_KEY, user_json)]).await
    }

    /// Remove token and user together.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails.
    pub async fn purge(&self) -> Result<(), StorageError> {
        self.storage.remove_many(&[TOKEN_KEY, USER_KEY]).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn user() -> User {
        User::new(1, "a@b.com", "a")
    }

    #[tokio::test]
    async fn test_persist_and_purge_both_keys() {
        let vault = SessionVault::in_memory();
        vault
            .persist(&SecretString::from("tok1"), &user())
            .await
            .unwrap();

        assert_eq!(vault.token().await.unwrap().unwrap().expose_secret(), "tok1");
        assert_eq!(vault.user().await.unwrap(), Some(user()));

        vault.purge().await.unwrap();
        assert!(vault.token().await.unwrap().is_none());
        assert!(vault.user().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_cached_user_is_ignored() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .set_many(&[(USER_KEY, "{not json".to_string())])
            .await
            .unwrap();
        let vault = SessionVault::new(storage);
        assert!(vault.user().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_token_is_absent() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .set_many(&[(TOKEN_KEY, String::new())])
            .await
            .unwrap();
        let vault = SessionVault::new(storage);
        assert!(vault.token().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let vault = SessionVault::new(Arc::new(FileStorage::new(&path)));
        vault
            .persist(&SecretString::from("tok1"), &user())
            .await
            .unwrap();

        let reopened = SessionVault::new(Arc::new(FileStorage::new(&path)));
        assert_eq!(
            reopened.token().await.unwrap().unwrap().expose_secret(),
            "tok1"
        );
        assert_eq!(reopened.user().await.unwrap(), Some(user()));
    }

    #[tokio::test]
    async fn test_file_storage_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("absent.json"));
        assert!(storage.get(TOKEN_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_storage_purge_recovers_from_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        tokio::fs::write(&path, b"garbage").await.unwrap();

        let storage = FileStorage::new(&path);
        assert!(matches!(
            storage.get(TOKEN_KEY).await,
            Err(StorageError::Corrupt(_))
        ));

        let vault = SessionVault::new(Arc::new(storage));
        vault.purge().await.unwrap();
        assert!(vault.token().await.unwrap().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_storage_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let vault = SessionVault::new(Arc::new(FileStorage::new(&path)));
        vault
            .persist(&SecretString::from("tok1"), &user())
            .await
            .unwrap();

        let mode = tokio::fs::metadata(&path).await.unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
