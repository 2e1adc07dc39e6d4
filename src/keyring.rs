//! Store-key provisioning.
//!
//! When no encryption key is configured, a random 32-byte key is generated
//! on first use and kept base64-encoded in one of two places:
//!
//! - OS keyring entry `push-receiver/store-key` (default)
//! - `{config_dir}/store-key`, mode 0600, when `PUSH_RECEIVER_ENV=test`
//!
//! The key is cached for the life of the process so the keyring is asked
//! at most once.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::config::Config;

/// Keyring account (and file name) holding the store key.
const STORE_KEY_ENTRY: &str = "store-key";

/// Why the keyring could not produce the store key.
#[derive(Debug)]
pub enum StoreKeyError {
    /// No key saved yet.
    Missing,
    /// The secret store exists but cannot be reached (locked, no session bus).
    Unavailable(String),
    /// The platform refused or failed the request.
    Platform(String),
    /// The saved entry is unusable.
    Invalid(String),
}

impl std::fmt::Display for StoreKeyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => f.write_str("no store key in the keyring"),
            Self::Unavailable(detail) => write!(f, "keyring unavailable: {detail}"),
            Self::Platform(detail) => write!(f, "keyring request failed: {detail}"),
            Self::Invalid(detail) => write!(f, "keyring entry unusable: {detail}"),
        }
    }
}

impl std::error::Error for StoreKeyError {}

impl From<keyring::Error> for StoreKeyError {
    fn from(err: keyring::Error) -> Self {
        match err {
            keyring::Error::NoEntry => Self::Missing,
            keyring::Error::NoStorageAccess(source) => Self::Unavailable(source.to_string()),
            keyring::Error::PlatformFailure(source) => Self::Platform(source.to_string()),
            other => Self::Invalid(other.to_string()),
        }
    }
}

/// Where the store key lives.
#[derive(Debug, Clone, PartialEq, Eq)]
enum KeySource {
    Keyring,
    File(PathBuf),
}

impl KeySource {
    fn current() -> Result<Self> {
        if skip_keyring() {
            Ok(Self::File(Config::config_dir()?.join(STORE_KEY_ENTRY)))
        } else {
            Ok(Self::Keyring)
        }
    }

    /// Saved key, or `None` when nothing has been saved yet.
    fn load(&self) -> Result<Option<String>> {
        match self {
            Self::Keyring => match keyring_entry()?.get_password().map_err(StoreKeyError::from) {
                Ok(key) => Ok(Some(key)),
                Err(StoreKeyError::Missing) => Ok(None),
                Err(e @ StoreKeyError::Unavailable(_)) => {
                    log::warn!(
                        "[Keyring] {e}. Unlock the keyring or set PUSH_RECEIVER_ENCRYPTION_KEY."
                    );
                    Err(e.into())
                }
                Err(e) => Err(e.into()),
            },
            Self::File(path) => {
                if !path.exists() {
                    return Ok(None);
                }
                let key = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                Ok(Some(key.trim().to_string()))
            }
        }
    }

    fn save(&self, key: &str) -> Result<()> {
        match self {
            Self::Keyring => keyring_entry()?
                .set_password(key)
                .map_err(StoreKeyError::from)
                .context("Failed to save store key in the keyring"),
            Self::File(path) => {
                fs::write(path, key)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                #[cfg(unix)]
                fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
                Ok(())
            }
        }
    }
}

fn keyring_entry() -> Result<keyring::Entry> {
    keyring::Entry::new(crate::env::APP_NAME, STORE_KEY_ENTRY)
        .map_err(StoreKeyError::from)
        .context("Failed to open keyring entry")
}

fn skip_keyring() -> bool {
    #[cfg(test)]
    {
        true
    }

    #[cfg(not(test))]
    {
        crate::env::should_skip_keyring()
    }
}

fn generate_key() -> String {
    let mut key = [0u8; 32];
    rand::rng().fill_bytes(&mut key);
    BASE64.encode(key)
}

/// Load the store key, generating and saving one on first use.
pub fn load_or_create_store_key() -> Result<String> {
    static CACHE: OnceLock<String> = OnceLock::new();
    if let Some(key) = CACHE.get() {
        return Ok(key.clone());
    }

    let source = KeySource::current()?;
    let key = match source.load()? {
        Some(key) if !key.is_empty() => {
            log::debug!("[Keyring] Loaded store key from {source:?}");
            key
        }
        _ => {
            let key = generate_key();
            source.save(&key)?;
            log::info!("[Keyring] Generated new store key ({source:?})");
            key
        }
    };

    Ok(CACHE.get_or_init(|| key).clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_key_is_32_bytes() {
        let key = generate_key();
        assert_eq!(BASE64.decode(key).unwrap().len(), 32);
    }

    #[test]
    fn test_store_key_is_stable_across_calls() {
        let first = load_or_create_store_key().unwrap();
        let second = load_or_create_store_key().unwrap();
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn test_file_source_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = KeySource::File(dir.path().join(STORE_KEY_ENTRY));

        assert_eq!(source.load().unwrap(), None);
        source.save("abc\n").unwrap();
        assert_eq!(source.load().unwrap().as_deref(), Some("abc"));
    }

    #[test]
    fn test_keyring_error_mapping() {
        assert!(matches!(
            StoreKeyError::from(keyring::Error::NoEntry),
            StoreKeyError::Missing
        ));
        assert!(matches!(
            StoreKeyError::from(keyring::Error::BadEncoding(vec![0xff])),
            StoreKeyError::Invalid(_)
        ));
    }
}
