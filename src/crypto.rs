//! Encryption at rest for the session store.
//!
//! A store file is one sealed [`Envelope`]:
//! ```json
//! { "nonce": "<base64>", "ciphertext": "<base64>", "version": <u8> }
//! ```
//!
//! The cipher is AES-256-GCM. Its key is the SHA-256 digest of whatever
//! secret string the caller configured, so any non-empty secret works and
//! the same secret always opens the same files.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Current envelope format.
pub const ENVELOPE_VERSION: u8 = 1;

/// Sealed payload as written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Base64 nonce.
    pub nonce: String,
    /// Base64 ciphertext including the GCM tag.
    pub ciphertext: String,
    /// Format version.
    pub version: u8,
}

/// Cipher keyed from a configured secret.
#[derive(Clone)]
pub struct StoreKey {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StoreKey(..)")
    }
}

impl StoreKey {
    /// Derive the store key from a secret string.
    pub fn derive(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        Self {
            cipher: Aes256Gcm::new(&digest),
        }
    }

    /// Encrypt `plaintext` under a fresh random nonce.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Envelope> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| anyhow::anyhow!("Encryption failed: {e}"))?;

        Ok(Envelope {
            nonce: BASE64.encode(nonce),
            ciphertext: BASE64.encode(ciphertext),
            version: ENVELOPE_VERSION,
        })
    }

    /// Decrypt an envelope. Fails on a foreign version, a malformed
    /// envelope, or a key mismatch.
    pub fn open(&self, envelope: &Envelope) -> Result<Vec<u8>> {
        if envelope.version != ENVELOPE_VERSION {
            anyhow::bail!("Unsupported envelope version {}", envelope.version);
        }

        let nonce = BASE64
            .decode(&envelope.nonce)
            .context("Envelope nonce is not base64")?;
        if nonce.len() != NONCE_LEN {
            anyhow::bail!("Envelope nonce has {} bytes, expected {NONCE_LEN}", nonce.len());
        }
        let ciphertext = BASE64
            .decode(&envelope.ciphertext)
            .context("Envelope ciphertext is not base64")?;

        self.cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
            .map_err(|e| anyhow::anyhow!("Decryption failed: {e}"))
    }
}
