//! Typed access to the three persisted session keys.
//!
//! Storage is best-effort: read failures are logged and treated as absent
//! values, write failures are logged and otherwise ignored. Nothing here
//! surfaces an error to the host.

use serde_json::Value;

use crate::constants::{CREDENTIALS_KEY, PERSISTENT_IDS_KEY, SENDER_ID_KEY};
use crate::credentials::Credentials;
use crate::store::KeyValueStore;

/// Session view over a [`KeyValueStore`].
pub struct SessionStore {
    inner: Box<dyn KeyValueStore>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore").finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Wrap a store.
    pub fn new(inner: Box<dyn KeyValueStore>) -> Self {
        Self { inner }
    }

    fn read(&self, key: &str) -> Option<Value> {
        match self.inner.get(key) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("[Store] Failed to read '{key}': {e:#}");
                None
            }
        }
    }

    fn write(&mut self, key: &str, value: Value) {
        if let Err(e) = self.inner.set(key, value) {
            log::warn!("[Store] Failed to write '{key}': {e:#}");
        }
    }

    fn clear_key(&mut self, key: &str) {
        if let Err(e) = self.inner.remove(key) {
            log::warn!("[Store] Failed to clear '{key}': {e:#}");
        }
    }

    /// Stored credentials. Unparseable credentials read as absent.
    pub fn credentials(&self) -> Option<Credentials> {
        let value = self.read(CREDENTIALS_KEY)?;
        match Credentials::from_value(value) {
            Ok(credentials) => Some(credentials),
            Err(e) => {
                log::warn!("[Store] Ignoring unreadable credentials: {e:#}");
                None
            }
        }
    }

    /// Sender id the stored credentials belong to.
    pub fn sender_id(&self) -> Option<String> {
        match self.read(SENDER_ID_KEY)? {
            Value::String(sender_id) => Some(sender_id),
            other => {
                log::warn!("[Store] Ignoring non-string sender id: {other}");
                None
            }
        }
    }

    /// Persistent ids in delivery order; empty when absent.
    pub fn persistent_ids(&self) -> Vec<String> {
        let Some(value) = self.read(PERSISTENT_IDS_KEY) else {
            return Vec::new();
        };
        serde_json::from_value(value).unwrap_or_else(|e| {
            log::warn!("[Store] Ignoring unreadable persistent ids: {e}");
            Vec::new()
        })
    }

    /// Persist a fresh registration.
    pub fn save_registration(&mut self, sender_id: &str, credentials: &Credentials) {
        match credentials.to_value() {
            Ok(value) => self.write(CREDENTIALS_KEY, value),
            Err(e) => log::warn!("[Store] Failed to serialize credentials: {e:#}"),
        }
        self.write(SENDER_ID_KEY, Value::String(sender_id.to_string()));
    }

    /// Append one id (read-modify-write). Returns the new list length.
    pub fn append_persistent_id(&mut self, persistent_id: &str) -> usize {
        let mut ids = self.persistent_ids();
        ids.push(persistent_id.to_string());
        let len = ids.len();
        self.write(PERSISTENT_IDS_KEY, Value::from(ids));
        len
    }

    /// Clear credentials, sender id and persistent ids.
    pub fn clear(&mut self) {
        self.clear_key(CREDENTIALS_KEY);
        self.clear_key(SENDER_ID_KEY);
        self.clear_key(PERSISTENT_IDS_KEY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[test]
    fn test_append_preserves_order_and_duplicates() {
        let mut store = SessionStore::new(Box::new(MemoryStore::new()));
        assert!(store.persistent_ids().is_empty());

        assert_eq!(store.append_persistent_id("a"), 1);
        assert_eq!(store.append_persistent_id("b"), 2);
        assert_eq!(store.append_persistent_id("a"), 3);
        assert_eq!(store.persistent_ids(), vec!["a", "b", "a"]);
    }

    #[test]
    fn test_clear_removes_all_keys() {
        let backing = MemoryStore::new();
        let mut store = SessionStore::new(Box::new(backing.clone()));
        store.append_persistent_id("a");
        let mut raw = backing.clone();
        raw.set(SENDER_ID_KEY, json!("123")).unwrap();
        raw.set(CREDENTIALS_KEY, json!({"anything": true})).unwrap();

        store.clear();

        assert_eq!(backing.get(CREDENTIALS_KEY).unwrap(), None);
        assert_eq!(backing.get(SENDER_ID_KEY).unwrap(), None);
        assert_eq!(backing.get(PERSISTENT_IDS_KEY).unwrap(), None);
    }

    #[test]
    fn test_malformed_values_read_as_absent() {
        let mut backing = MemoryStore::new();
        backing.set(CREDENTIALS_KEY, json!({"fcm": 1})).unwrap();
        backing.set(SENDER_ID_KEY, json!(42)).unwrap();
        backing.set(PERSISTENT_IDS_KEY, json!("nope")).unwrap();

        let store = SessionStore::new(Box::new(backing));
        assert!(store.credentials().is_none());
        assert!(store.sender_id().is_none());
        assert!(store.persistent_ids().is_empty());
    }
}
