//! Status command - print what the store currently holds.
//!
//! Never prints the full token.

use anyhow::Result;

use crate::config::Config;
use crate::credentials::redact;
use crate::session::SessionStore;
use crate::store::KeyValueStore;

/// Summary of the persisted session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    /// Whether credentials are stored.
    pub has_credentials: bool,
    /// Redacted token prefix, when credentials are stored.
    pub token_prefix: Option<String>,
    /// Stored sender id.
    pub sender_id: Option<String>,
    /// Number of recorded persistent ids.
    pub persistent_ids: usize,
}

/// Summarize a store.
pub fn summarize(store: Box<dyn KeyValueStore>) -> StoredSession {
    let store = SessionStore::new(store);
    let credentials = store.credentials();
    StoredSession {
        has_credentials: credentials.is_some(),
        token_prefix: credentials.map(|c| redact(c.token()).to_string()),
        sender_id: store.sender_id(),
        persistent_ids: store.persistent_ids().len(),
    }
}

/// Run the status command.
pub fn run(config: &Config) -> Result<()> {
    let store = super::open_store(config)?;
    println!("Store: {}", store.path().display());

    let summary = summarize(Box::new(store));
    match &summary.token_prefix {
        Some(prefix) => println!("Credentials: present (token {prefix}...)"),
        None => println!("Credentials: none"),
    }
    println!(
        "Sender id: {}",
        summary.sender_id.as_deref().unwrap_or("(none)")
    );
    println!("Persistent ids: {}", summary.persistent_ids);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[test]
    fn test_summarize_empty_store() {
        let summary = summarize(Box::new(MemoryStore::new()));
        assert!(!summary.has_credentials);
        assert_eq!(summary.token_prefix, None);
        assert_eq!(summary.sender_id, None);
        assert_eq!(summary.persistent_ids, 0);
    }

    #[test]
    fn test_summarize_redacts_token() {
        let mut store = MemoryStore::new();
        store
            .set(
                "credentials",
                json!({
                    "gcm": {"androidId": "1", "securityToken": "2"},
                    "fcm": {"token": "abcdefghijklmnop"}
                }),
            )
            .unwrap();
        store.set("senderId", json!("123")).unwrap();
        store.set("persistentIds", json!(["a", "b"])).unwrap();

        let summary = summarize(Box::new(store));
        assert!(summary.has_credentials);
        assert_eq!(summary.token_prefix.as_deref(), Some("abcdefgh"));
        assert_eq!(summary.sender_id.as_deref(), Some("123"));
        assert_eq!(summary.persistent_ids, 2);
    }
}
