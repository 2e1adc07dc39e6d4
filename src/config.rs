//! Configuration loading and persistence.
//!
//! Reads `config.json` from the config directory and applies environment
//! overrides. The store encryption key is never written to disk; it comes
//! from `PUSH_RECEIVER_ENCRYPTION_KEY` or from the keyring module.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{fs, path::PathBuf, time::Duration};

use crate::constants::{DEFAULT_STORE_NAME, HTTP_REQUEST_TIMEOUT};

/// Configuration for the push-receiver worker.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Config {
    /// Store namespace; the encrypted file is `{store_name}.enc`.
    pub store_name: String,
    /// Base URL of the push relay gateway.
    pub relay_url: String,
    /// Registration request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Store encryption key - NOT serialized to disk.
    #[serde(skip)]
    pub encryption_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_name: DEFAULT_STORE_NAME.to_string(),
            relay_url: "https://push-relay.localhost".to_string(),
            request_timeout_secs: HTTP_REQUEST_TIMEOUT.as_secs(),
            encryption_key: None,
        }
    }
}

impl Config {
    /// Directory holding `config.json`, the store files and the log.
    /// Created on demand. First match wins:
    /// 1. `#[cfg(test)]` (unit tests): `tmp/push-receiver-test`
    /// 2. `PUSH_RECEIVER_CONFIG_DIR` env var: explicit override
    /// 3. `PUSH_RECEIVER_ENV=test`: `tmp/push-receiver-test`
    /// 4. Default: platform config dir (macOS: ~/Library/Application Support/push-receiver)
    pub fn config_dir() -> Result<PathBuf> {
        let dir = {
            #[cfg(test)]
            {
                PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tmp/push-receiver-test")
            }

            #[cfg(not(test))]
            {
                if let Ok(custom_dir) = std::env::var("PUSH_RECEIVER_CONFIG_DIR") {
                    PathBuf::from(custom_dir)
                } else if crate::env::Environment::current().is_test() {
                    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tmp/push-receiver-test")
                } else {
                    dirs::config_dir()
                        .context("Could not determine config directory")?
                        .join(crate::env::APP_NAME)
                }
            }
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        Ok(dir)
    }

    /// `config.json` (or defaults when missing or unreadable), then env overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file().unwrap_or_else(|e| {
            log::debug!("Using default config: {e:#}");
            Self::default()
        });
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_from_file() -> Result<Self> {
        let config_path = Self::config_dir()?.join("config.json");
        if !config_path.exists() {
            anyhow::bail!("Config file not found");
        }
        let content = fs::read_to_string(&config_path).context("Failed to read config file")?;
        serde_json::from_str(&content).context("Failed to parse config file")
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(store_name) = std::env::var("PUSH_RECEIVER_STORE_NAME") {
            self.store_name = store_name;
        }

        if let Ok(relay_url) = std::env::var("PUSH_RECEIVER_RELAY_URL") {
            self.relay_url = relay_url;
        }

        if let Ok(key) = std::env::var("PUSH_RECEIVER_ENCRYPTION_KEY") {
            if !key.is_empty() {
                self.encryption_key = Some(key);
            }
        }

        if let Ok(timeout) = std::env::var("PUSH_RECEIVER_REQUEST_TIMEOUT") {
            if let Ok(secs) = timeout.parse::<u64>() {
                self.request_timeout_secs = secs;
            }
        }
    }

    /// Write `config.json` (0600). The encryption key is never written.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_dir()?.join("config.json");
        fs::write(&config_path, serde_json::to_string_pretty(self)?)
            .context("Failed to write config file")?;

        #[cfg(unix)]
        fs::set_permissions(&config_path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Write a default `config.json` if there is none yet. Returns `true`
    /// when a file was written. Env overrides are not persisted.
    pub fn save_default_if_missing() -> Result<bool> {
        if Self::config_dir()?.join("config.json").exists() {
            return Ok(false);
        }
        Self::default().save()?;
        Ok(true)
    }

    /// Registration request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Resolve the store encryption key: configured value, else keyring-provisioned.
    pub fn resolve_encryption_key(&self) -> Result<String> {
        match &self.encryption_key {
            Some(key) => Ok(key.clone()),
            None => crate::keyring::load_or_create_store_key(),
        }
    }
}
