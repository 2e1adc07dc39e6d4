//! CLI subcommand implementations.
//!
//! - [`serve`] - run the session worker over stdin/stdout
//! - [`status`] - summarize the stored session
//! - [`reset`] - clear stored credentials and persistent ids

pub mod reset;
pub mod serve;
pub mod status;

use anyhow::Result;

use crate::config::Config;
use crate::store::EncryptedFileStore;

/// Open the configured encrypted store.
pub fn open_store(config: &Config) -> Result<EncryptedFileStore> {
    let key = config.resolve_encryption_key()?;
    EncryptedFileStore::open(&Config::config_dir()?, &config.store_name, &key)
}
