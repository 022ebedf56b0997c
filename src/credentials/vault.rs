//! AES-256-GCM credential vault.
//!
//! Every secret is sealed with a unique random nonce. The sealed blob is one
//! base64 string laid out as `nonce || ciphertext || tag`, so a record column
//! is self-contained and can be unsealed without side data.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::error::{Error, Result};

/// Size of the master key in bytes (256 bits)
const KEY_SIZE: usize = 32;

/// Size of the GCM nonce in bytes (96 bits)
const NONCE_SIZE: usize = 12;

/// Process-wide sealing key, validated once at startup.
///
/// A key of the wrong length fails construction, never an individual call.
pub struct Vault {
    key: Vec<u8>,
}

impl Vault {
    /// Creates a vault from a base64-encoded 32-byte master key.
    pub fn new(key_base64: &str) -> Result<Self> {
        let key = BASE64
            .decode(key_base64)
            .map_err(|_| Error::InvalidInput("master key is not valid base64".to_string()))?;

        if key.len() != KEY_SIZE {
            return Err(Error::InvalidInput(format!(
                "master key must be {} bytes (256 bits), got {}",
                KEY_SIZE,
                key.len()
            )));
        }

        Ok(Self { key })
    }

    /// Encrypts plaintext under a fresh random nonce.
    ///
    /// Returns a single base64 blob: `nonce || ciphertext || tag`.
    /// Empty plaintext is rejected — a sealed empty secret is always a bug
    /// upstream, not a value worth storing.
    pub fn seal(&self, plaintext: &str) -> Result<String> {
        if plaintext.is_empty() {
            return Err(Error::InvalidInput("cannot seal empty plaintext".to_string()));
        }

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|_| Error::InvalidInput("invalid cipher key".to_string()))?;

        // Never reuse a nonce
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| Error::Integrity)?;

        let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        blob.extend_from_slice(nonce.as_slice());
        blob.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(&blob))
    }

    /// Decrypts a sealed blob.
    ///
    /// Fails with [`Error::Integrity`] if the authentication tag does not
    /// verify (tampered blob or wrong key) — never returns garbage.
    pub fn unseal(&self, blob: &str) -> Result<String> {
        let bytes = BASE64
            .decode(blob)
            .map_err(|_| Error::InvalidInput("sealed blob is not valid base64".to_string()))?;

        if bytes.len() <= NONCE_SIZE {
            return Err(Error::InvalidInput(format!(
                "sealed blob too short: {} bytes",
                bytes.len()
            )));
        }

        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_SIZE);

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|_| Error::InvalidInput("invalid cipher key".to_string()))?;

        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| Error::Integrity)?;

        String::from_utf8(plaintext)
            .map_err(|_| Error::InvalidInput("unsealed data is not valid UTF-8".to_string()))
    }
}
