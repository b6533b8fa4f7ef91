//! Credential decryption for remote source authentication.
//!
//! Stored credentials are decrypted only while building a request; plaintext
//! values are never written back to the source record or logged.
//!
//! AES-256-GCM payload format (base64 encoded):
//! ```text
//! [Nonce: 12 bytes] [Ciphertext + Tag: N bytes]
//! ```

use aes_gcm::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};

use crate::{Error, Result};

const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;

/// Decrypts stored credential values at call time
pub trait CredentialProvider: Send + Sync {
    fn decrypt(&self, stored: &str) -> Result<String>;
}

/// Credentials stored as plaintext (development and tests)
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaintextCredentials;

impl CredentialProvider for PlaintextCredentials {
    fn decrypt(&self, stored: &str) -> Result<String> {
        Ok(stored.to_string())
    }
}

/// AES-256-GCM encrypted credentials
#[derive(Clone)]
pub struct AesGcmCredentials {
    cipher: Aes256Gcm,
    key_id: String,
}

impl std::fmt::Debug for AesGcmCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesGcmCredentials")
            .field("key_id", &self.key_id)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl AesGcmCredentials {
    pub fn from_key(key: [u8; KEY_SIZE], key_id: impl Into<String>) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
            key_id: key_id.into(),
        }
    }

    /// From a 64-character hex key
    pub fn from_hex(hex_key: &str, key_id: impl Into<String>) -> Result<Self> {
        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| Error::Credentials(format!("Invalid hex key: {}", e)))?;
        Ok(Self::from_key(key_bytes(&bytes)?, key_id))
    }

    pub fn from_base64(b64_key: &str, key_id: impl Into<String>) -> Result<Self> {
        let bytes = STANDARD
            .decode(b64_key.trim())
            .map_err(|e| Error::Credentials(format!("Invalid base64 key: {}", e)))?;
        Ok(Self::from_key(key_bytes(&bytes)?, key_id))
    }

    /// From an environment variable holding a hex key.
    pub fn from_env(env_var: &str) -> Result<Self> {
        let hex_key = std::env::var(env_var).map_err(|_| {
            Error::Credentials(format!("Environment variable '{}' not set", env_var))
        })?;
        Self::from_hex(&hex_key, format!("env:{}", env_var))
    }

    /// Generate a random key, returned with its hex export.
    pub fn generate(key_id: impl Into<String>) -> (Self, String) {
        let mut key = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        let exported = hex::encode(key);
        (Self::from_key(key, key_id), exported)
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Encrypt a plaintext value into the stored payload format.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| Error::Credentials(format!("Encryption failed: {}", e)))?;

        let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        output.extend_from_slice(&nonce_bytes);
        output.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(output))
    }
}

fn key_bytes(bytes: &[u8]) -> Result<[u8; KEY_SIZE]> {
    bytes.try_into().map_err(|_| {
        Error::Credentials(format!("Key must be {} bytes, got {}", KEY_SIZE, bytes.len()))
    })
}

impl CredentialProvider for AesGcmCredentials {
    fn decrypt(&self, stored: &str) -> Result<String> {
        let data = STANDARD
            .decode(stored.trim())
            .map_err(|e| Error::Credentials(format!("Invalid credential encoding: {}", e)))?;
        if data.len() <= NONCE_SIZE {
            return Err(Error::Credentials(
                "Credential payload too short".to_string(),
            ));
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| Error::Credentials("Credential decryption failed".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|_| Error::Credentials("Decrypted credential is not UTF-8".to_string()))
    }
}
