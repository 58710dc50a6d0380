//! Session persistence: the external key-value store behind the session.
//!
//! The session is persisted as two keys, [`AUTH_TOKEN_KEY`] and
//! [`AUTH_USER_KEY`], written together on login/signup and removed together
//! on logout. Reads are infallible: a missing, unreadable, or corrupt value
//! is reported as absent so that session restoration can never fail hard.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

/// Key under which the opaque bearer token string is persisted.
pub const AUTH_TOKEN_KEY: &str = "authToken";

/// Key under which the JSON-serialized user identity is persisted.
pub const AUTH_USER_KEY: &str = "authUser";

/// External key-value store for session state.
///
/// Implementations must tolerate concurrent access from clones of the
/// session store. `get` never fails; storage problems on the read path are
/// logged and reported as "no value".
pub trait SessionStorage: Send + Sync {
    /// Read a value, or `None` when missing or unreadable.
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value durably.
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` when the value could not be persisted. The
    /// session store treats this as best-effort and keeps its in-memory
    /// state authoritative.
    fn set(&self, key: &str, value: &str) -> io::Result<()>;

    /// Remove a value. Removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` for filesystem-level failures other than the
    /// key being absent.
    fn remove(&self, key: &str) -> io::Result<()>;
}

/// File-backed [`SessionStorage`]: one file per key under a directory.
///
/// Writes go to a temp file first and are renamed into place, so a crash
/// mid-write can never leave a torn value. Layout:
///
/// ```text
/// <dir>/
///     authToken
///     authUser
/// ```
#[derive(Debug, Clone)]
pub struct FileSessionStorage {
    dir: PathBuf,
}

impl FileSessionStorage {
    /// Open (creating if needed) the storage directory.
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl SessionStorage for FileSessionStorage {
    fn get(&self, key: &str) -> Option<String> {
        let path = self.key_path(key);
        match fs::read_to_string(&path) {
            Ok(value) => Some(value),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(key, path = %path.display(), error = %e, "failed to read persisted session value; treating as absent");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        let path = self.key_path(key);
        let tmp = self.dir.join(format!("{key}.tmp"));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        match fs::remove_file(self.key_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// In-memory [`SessionStorage`].
///
/// The default when no session directory is configured: the session then
/// lives for the life of the process only. Also the storage used by tests.
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionStorage for MemorySessionStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}

/// Storage that fails every write. Test-only, for exercising the
/// best-effort write-through path.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct FailingSessionStorage;

#[cfg(test)]
impl SessionStorage for FailingSessionStorage {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }

    fn set(&self, _key: &str, _value: &str) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Other, "disk full"))
    }

    fn remove(&self, _key: &str) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Other, "disk full"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_creates_directory() {
        let tmp = TempDir::new().expect("failed to create temp dir");
        let nested = tmp.path().join("session/state");
        let storage = FileSessionStorage::open(&nested).expect("open should succeed");
        assert!(nested.is_dir());
        assert!(storage.get(AUTH_TOKEN_KEY).is_none());
    }

    #[test]
    fn set_then_get_roundtrip() {
        let tmp = TempDir::new().expect("failed to create temp dir");
        let storage = FileSessionStorage::open(tmp.path()).expect("open should succeed");

        storage
            .set(AUTH_TOKEN_KEY, "tok-123")
            .expect("set should succeed");
        assert_eq!(storage.get(AUTH_TOKEN_KEY).as_deref(), Some("tok-123"));
        assert!(tmp.path().join(AUTH_TOKEN_KEY).is_file());
    }

    #[test]
    fn set_replaces_existing_value() {
        let tmp = TempDir::new().expect("failed to create temp dir");
        let storage = FileSessionStorage::open(tmp.path()).expect("open should succeed");

        storage.set(AUTH_TOKEN_KEY, "old").expect("first set");
        storage.set(AUTH_TOKEN_KEY, "new").expect("second set");
        assert_eq!(storage.get(AUTH_TOKEN_KEY).as_deref(), Some("new"));

        // No leftover temp file after the rename.
        assert!(!tmp.path().join("authToken.tmp").exists());
    }

    #[test]
    fn remove_is_idempotent() {
        let tmp = TempDir::new().expect("failed to create temp dir");
        let storage = FileSessionStorage::open(tmp.path()).expect("open should succeed");

        storage.set(AUTH_USER_KEY, "{}").expect("set should succeed");
        storage.remove(AUTH_USER_KEY).expect("first remove");
        storage
            .remove(AUTH_USER_KEY)
            .expect("removing an absent key should succeed");
        assert!(storage.get(AUTH_USER_KEY).is_none());
    }

    #[test]
    fn memory_storage_roundtrip() {
        let storage = MemorySessionStorage::new();
        assert!(storage.get(AUTH_TOKEN_KEY).is_none());

        storage.set(AUTH_TOKEN_KEY, "t").expect("set");
        storage.set(AUTH_USER_KEY, "u").expect("set");
        assert_eq!(storage.get(AUTH_TOKEN_KEY).as_deref(), Some("t"));

        storage.remove(AUTH_TOKEN_KEY).expect("remove");
        assert!(storage.get(AUTH_TOKEN_KEY).is_none());
        assert_eq!(storage.get(AUTH_USER_KEY).as_deref(), Some("u"));
    }
}
