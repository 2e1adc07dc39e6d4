//! Durable key-value storage for session state.
//!
//! The session manager persists three JSON values (credentials, sender id,
//! persistent ids) under a named namespace. Two implementations:
//!
//! - [`EncryptedFileStore`] - one AES-256-GCM envelope per namespace at
//!   `{dir}/{name}.enc`, rewritten on every mutation
//! - [`MemoryStore`] - shared in-process map, for tests and dry runs
//!
//! # Storage structure
//!
//! ```text
//! ~/.config/push-receiver/
//!     config.json        # Non-secret settings
//!     fcm.enc            # AES-GCM encrypted {"credentials": .., "senderId": .., "persistentIds": [..]}
//! ```

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::crypto::{Envelope, StoreKey};

/// Maximum namespace name length.
const MAX_NAME_LEN: usize = 64;

/// Get/set access to JSON values by key.
///
/// Setting a key to `Value::Null` is the same as removing it, so "cleared"
/// and "never written" read back identically as `None`.
pub trait KeyValueStore: Send {
    /// Read a value; `None` when absent.
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Write a value, replacing any previous one.
    fn set(&mut self, key: &str, value: Value) -> Result<()>;

    /// Remove a value. Removing an absent key is a no-op.
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// Validate a namespace name: alphanumeric, hyphens, underscores.
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        anyhow::bail!("Store name must be 1-{MAX_NAME_LEN} characters, got {}", name.len());
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        anyhow::bail!("Store name '{name}' may only contain letters, digits, '-' and '_'");
    }
    Ok(())
}

/// Encrypted, file-backed store for one namespace.
pub struct EncryptedFileStore {
    path: PathBuf,
    key: StoreKey,
    entries: Map<String, Value>,
}

impl std::fmt::Debug for EncryptedFileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedFileStore")
            .field("path", &self.path)
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl EncryptedFileStore {
    /// Open (or lazily create) the store `{dir}/{name}.enc`.
    ///
    /// A missing file is an empty store. A file that cannot be decrypted
    /// with `encryption_key` is an error.
    pub fn open(dir: &Path, name: &str, encryption_key: &str) -> Result<Self> {
        validate_name(name)?;
        if encryption_key.is_empty() {
            anyhow::bail!("Store encryption key must not be empty");
        }

        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create store directory {}", dir.display()))?;

        let path = dir.join(format!("{name}.enc"));
        let key = StoreKey::derive(encryption_key);

        let entries = if path.exists() {
            let content = fs::read_to_string(&path).context("Failed to read store file")?;
            let envelope: Envelope =
                serde_json::from_str(&content).context("Failed to parse store file")?;
            let plaintext = key
                .open(&envelope)
                .context("Failed to decrypt store (wrong encryption key?)")?;
            serde_json::from_slice(&plaintext).context("Failed to deserialize store")?
        } else {
            Map::new()
        };

        log::debug!("[Store] Opened {} ({} keys)", path.display(), entries.len());
        Ok(Self { path, key, entries })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `entries` to disk, then adopt it as the in-memory state.
    /// On failure the previous state is kept, matching the file.
    fn commit(&mut self, entries: Map<String, Value>) -> Result<()> {
        let plaintext = serde_json::to_vec(&entries).context("Failed to serialize store")?;
        let envelope = self.key.seal(&plaintext)?;
        let content =
            serde_json::to_string_pretty(&envelope).context("Failed to serialize envelope")?;

        let tmp_path = self.path.with_extension("enc.tmp");
        fs::write(&tmp_path, content).context("Failed to write store file")?;

        #[cfg(unix)]
        fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))
            .context("Failed to set store file permissions")?;

        fs::rename(&tmp_path, &self.path).context("Failed to replace store file")?;
        self.entries = entries;
        log::trace!("[Store] Flushed {:?}", self.path);
        Ok(())
    }
}

impl KeyValueStore for EncryptedFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        if value.is_null() {
            return self.remove(key);
        }
        let mut entries = self.entries.clone();
        entries.insert(key.to_string(), value);
        self.commit(entries)
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        if !self.entries.contains_key(key) {
            return Ok(());
        }
        let mut entries = self.entries.clone();
        entries.remove(key);
        self.commit(entries)
    }
}

/// In-memory store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<Map<String, Value>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Map<String, Value>>> {
        self.entries
            .lock()
            .map_err(|e| anyhow::anyhow!("Memory store lock poisoned: {e}"))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let mut entries = self.lock()?;
        if value.is_null() {
            entries.remove(key);
        } else {
            entries.insert(key.to_string(), value);
        }
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_file_store_persists_across_reopen() {
        let dir = TempDir::new().unwrap();

        let mut store = EncryptedFileStore::open(dir.path(), "fcm", "key-1").unwrap();
        store.set("senderId", json!("123")).unwrap();
        store.set("persistentIds", json!(["a", "b"])).unwrap();
        drop(store);

        let reopened = EncryptedFileStore::open(dir.path(), "fcm", "key-1").unwrap();
        assert_eq!(reopened.get("senderId").unwrap(), Some(json!("123")));
        assert_eq!(reopened.get("persistentIds").unwrap(), Some(json!(["a", "b"])));
    }

    #[test]
    fn test_file_store_is_not_plaintext() {
        let dir = TempDir::new().unwrap();
        let mut store = EncryptedFileStore::open(dir.path(), "fcm", "key-1").unwrap();
        store.set("senderId", json!("very-visible-sender")).unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(!raw.contains("very-visible-sender"));
    }

    #[test]
    fn test_file_store_wrong_key_fails_to_open() {
        let dir = TempDir::new().unwrap();
        let mut store = EncryptedFileStore::open(dir.path(), "fcm", "right").unwrap();
        store.set("senderId", json!("123")).unwrap();

        assert!(EncryptedFileStore::open(dir.path(), "fcm", "wrong").is_err());
    }

    #[test]
    fn test_null_clears_key() {
        let dir = TempDir::new().unwrap();
        let mut store = EncryptedFileStore::open(dir.path(), "fcm", "k").unwrap();
        store.set("senderId", json!("123")).unwrap();
        store.set("senderId", Value::Null).unwrap();
        assert_eq!(store.get("senderId").unwrap(), None);

        let mut memory = MemoryStore::new();
        memory.set("senderId", json!("123")).unwrap();
        memory.set("senderId", Value::Null).unwrap();
        assert_eq!(memory.get("senderId").unwrap(), None);
    }

    #[test]
    fn test_failed_write_leaves_memory_matching_disk() {
        let dir = TempDir::new().unwrap();
        let store_dir = dir.path().join("store");
        let mut store = EncryptedFileStore::open(&store_dir, "fcm", "k").unwrap();
        store.set("senderId", json!("123")).unwrap();

        // Removing the directory makes the next write fail.
        fs::remove_dir_all(&store_dir).unwrap();

        assert!(store.set("senderId", json!("456")).is_err());
        assert_eq!(store.get("senderId").unwrap(), Some(json!("123")));
        assert!(store.remove("senderId").is_err());
        assert_eq!(store.get("senderId").unwrap(), Some(json!("123")));
    }

    #[test]
    fn test_remove_absent_key_is_noop() {
        let dir = TempDir::new().unwrap();
        let mut store = EncryptedFileStore::open(dir.path(), "fcm", "k").unwrap();
        store.remove("credentials").unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    fn test_invalid_store_names_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(EncryptedFileStore::open(dir.path(), "", "k").is_err());
        assert!(EncryptedFileStore::open(dir.path(), "../escape", "k").is_err());
        assert!(EncryptedFileStore::open(dir.path(), "fcm", "").is_err());
    }

    #[test]
    fn test_memory_store_clones_share_state() {
        let mut writer = MemoryStore::new();
        let reader = writer.clone();
        writer.set("senderId", json!("abc")).unwrap();
        assert_eq!(reader.get("senderId").unwrap(), Some(json!("abc")));
    }
}
