//! Local key storage.
//!
//! Layout under the base directory (default `~/.secret-stash`):
//!
//! ```text
//! user_key.json   password-wrapped X25519 private key (WrappedKey JSON)
//! keys.json       optional cache: environment id -> base64url DEK
//! config.toml     settings, see `config::Settings`
//! ```
//!
//! The directory is owner-only (0700) and every file is written through a
//! temp file with mode 0600 followed by a rename.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::crypto::{DataKey, WrappedKey};
use crate::errors::{Result, StashError};

const USER_KEY_FILE: &str = "user_key.json";
const PREVIOUS_USER_KEY_FILE: &str = "user_key.previous.json";
const KEYS_FILE: &str = "keys.json";

/// File-backed store rooted at an injected base directory.
#[derive(Debug, Clone)]
pub struct KeyStore {
    base_dir: PathBuf,
}

impl KeyStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path of the wrapped private key file.
    pub fn user_key_path(&self) -> PathBuf {
        self.base_dir.join(USER_KEY_FILE)
    }

    /// Where `backup_user_key` keeps the key being replaced.
    pub fn previous_user_key_path(&self) -> PathBuf {
        self.base_dir.join(PREVIOUS_USER_KEY_FILE)
    }

    pub fn keys_path(&self) -> PathBuf {
        self.base_dir.join(KEYS_FILE)
    }

    // ------------------------------------------------------------------
    // user_key.json
    // ------------------------------------------------------------------

    /// Load the wrapped private key, or `None` when it was never saved.
    pub fn load_user_key(&self) -> Result<Option<WrappedKey>> {
        let path = self.user_key_path();
        if !path.exists() {
            return Ok(None);
        }
        Self::load_user_key_from(&path).map(Some)
    }

    /// Load a wrapped private key from an arbitrary file (an old key kept
    /// around for a rewrap).
    pub fn load_user_key_from(path: &Path) -> Result<WrappedKey> {
        if !path.exists() {
            return Err(StashError::PrivateKeyNotFound(path.to_path_buf()));
        }
        let contents = fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(|e| {
            StashError::KeyStore(format!("{} is not a valid key file: {e}", path.display()))
        })
    }

    pub fn save_user_key(&self, key: &WrappedKey) -> Result<()> {
        let json = serde_json::to_string_pretty(key)
            .map_err(|e| StashError::Serialization(format!("user key: {e}")))?;
        self.write_private(&self.user_key_path(), json.as_bytes())?;
        tracing::debug!(path = %self.user_key_path().display(), "saved user key");
        Ok(())
    }

    /// Copy the current wrapped key aside before it is replaced, so existing
    /// envelopes can still be rewrapped from it.
    pub fn backup_user_key(&self) -> Result<Option<PathBuf>> {
        let Some(current) = self.load_user_key()? else {
            return Ok(None);
        };
        let json = serde_json::to_string_pretty(&current)
            .map_err(|e| StashError::Serialization(format!("user key: {e}")))?;
        let path = self.previous_user_key_path();
        self.write_private(&path, json.as_bytes())?;
        Ok(Some(path))
    }

    /// Save a key downloaded from the server.
    ///
    /// A different local key is backed up first and its backup path is
    /// returned. An identical key is left alone.
    pub fn replace_user_key(&self, key: &WrappedKey) -> Result<Option<PathBuf>> {
        let backup = match self.load_user_key()? {
            Some(current) if current == *key => return Ok(None),
            Some(_) => self.backup_user_key()?,
            None => None,
        };
        self.save_user_key(key)?;
        Ok(backup)
    }

    // ------------------------------------------------------------------
    // keys.json
    // ------------------------------------------------------------------

    /// Every cached DEK, keyed by environment id.
    pub fn environment_keys(&self) -> Result<BTreeMap<String, String>> {
        let path = self.keys_path();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = fs::read_to_string(&path)?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&contents)
            .map_err(|e| StashError::KeyStore(format!("{} is corrupted: {e}", path.display())))
    }

    /// The cached DEK for one environment.
    pub fn environment_key(&self, environment_id: &str) -> Result<Option<DataKey>> {
        match self.environment_keys()?.get(environment_id) {
            Some(encoded) => Ok(Some(DataKey::from_encoded(encoded)?)),
            None => Ok(None),
        }
    }

    pub fn set_environment_key(&self, environment_id: &str, key: &DataKey) -> Result<()> {
        let mut keys = self.environment_keys()?;
        keys.insert(environment_id.to_string(), key.to_encoded());
        self.write_keys(&keys)
    }

    /// Drop a cached DEK. Returns whether anything was removed.
    pub fn remove_environment_key(&self, environment_id: &str) -> Result<bool> {
        let mut keys = self.environment_keys()?;
        if keys.remove(environment_id).is_none() {
            return Ok(false);
        }
        self.write_keys(&keys)?;
        Ok(true)
    }

    fn write_keys(&self, keys: &BTreeMap<String, String>) -> Result<()> {
        let json = serde_json::to_string_pretty(keys)
            .map_err(|e| StashError::Serialization(format!("keys: {e}")))?;
        self.write_private(&self.keys_path(), json.as_bytes())
    }

    // ------------------------------------------------------------------
    // Filesystem helpers
    // ------------------------------------------------------------------

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.base_dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.base_dir, fs::Permissions::from_mode(0o700))?;
        }
        Ok(())
    }

    /// Atomic write: temp file in the same directory, then rename.
    fn write_private(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        self.ensure_dir()?;
        let file_name = path
            .file_name()
            .ok_or_else(|| StashError::KeyStore(format!("invalid path {}", path.display())))?;
        let tmp_path = self
            .base_dir
            .join(format!(".{}.tmp", file_name.to_string_lossy()));

        write_owner_only(&tmp_path, bytes)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn write_owner_only(path: &Path, bytes: &[u8]) -> Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn write_owner_only(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_user_key_is_none() {
        let tmp = TempDir::new().unwrap();
        let store = KeyStore::new(tmp.path().join("home"));
        assert!(store.load_user_key().unwrap().is_none());
    }

    #[test]
    fn load_from_missing_path_reports_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("old_key.json");
        match KeyStore::load_user_key_from(&path) {
            Err(StashError::PrivateKeyNotFound(p)) => assert_eq!(p, path),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn environment_keys_set_get_remove() {
        let tmp = TempDir::new().unwrap();
        let store = KeyStore::new(tmp.path());
        let key = DataKey::new([7u8; 32]);

        store.set_environment_key("env_1", &key).unwrap();
        assert_eq!(store.environment_key("env_1").unwrap(), Some(key));
        assert_eq!(store.environment_keys().unwrap().len(), 1);

        assert!(store.remove_environment_key("env_1").unwrap());
        assert!(!store.remove_environment_key("env_1").unwrap());
        assert!(store.environment_key("env_1").unwrap().is_none());
    }

    #[test]
    fn corrupted_keys_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let store = KeyStore::new(tmp.path());
        fs::write(store.keys_path(), "{not json").unwrap();
        assert!(matches!(
            store.environment_keys(),
            Err(StashError::KeyStore(_))
        ));
    }

    #[test]
    fn no_temp_file_left_behind() {
        let tmp = TempDir::new().unwrap();
        let store = KeyStore::new(tmp.path());
        store
            .set_environment_key("env_1", &DataKey::generate())
            .unwrap();
        assert!(!tmp.path().join(".keys.json.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let home = tmp.path().join("stash");
        let store = KeyStore::new(&home);
        store
            .set_environment_key("env_1", &DataKey::generate())
            .unwrap();

        let file_mode = fs::metadata(store.keys_path()).unwrap().permissions().mode();
        let dir_mode = fs::metadata(&home).unwrap().permissions().mode();
        assert_eq!(file_mode & 0o777, 0o600);
        assert_eq!(dir_mode & 0o777, 0o700);
    }
}
