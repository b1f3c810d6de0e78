//! AES-256-GCM codec for OAuth tokens at rest.
//!
//! Stored form is base64 of `nonce || ciphertext || tag`, with a random
//! 12-byte nonce per encryption. The key is the SHA-256 digest of the
//! configured passphrase.

use std::fmt;

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

use super::CalendarError;

const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;
const TAG_SIZE: usize = 16;

/// Encrypts and decrypts board OAuth tokens.
#[derive(Clone)]
pub struct TokenCodec {
    key: [u8; KEY_SIZE],
}

impl TokenCodec {
    /// Build a codec whose key is derived from `passphrase`.
    pub fn new(passphrase: &str) -> Self {
        let digest = Sha256::digest(passphrase.as_bytes());
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&digest);
        Self { key }
    }

    fn cipher(&self) -> Result<Aes256Gcm, CalendarError> {
        Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| CalendarError::Encryption(format!("Key init failed: {e}")))
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CalendarError> {
        let cipher = self.cipher()?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce_bytes);

        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| CalendarError::Encryption(format!("Encryption failed: {e}")))?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + sealed.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&sealed);
        Ok(base64::engine::general_purpose::STANDARD.encode(&combined))
    }

    /// Fails on malformed input, a different key, or any modification of the stored bytes.
    pub fn decrypt(&self, encoded: &str) -> Result<String, CalendarError> {
        let combined = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| CalendarError::Encryption(format!("Base64 decode failed: {e}")))?;

        if combined.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CalendarError::Encryption("Ciphertext too short".into()));
        }

        let (nonce, sealed) = combined.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher()?
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CalendarError::Encryption("Token authentication failed".into()))?;

        String::from_utf8(plaintext)
            .map_err(|e| CalendarError::Encryption(format!("UTF-8 decode failed: {e}")))
    }
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}
