//! Credential Cipher
//!
//! Symmetric encryption of tenant secrets at rest. Blobs are
//! `base64(nonce || ciphertext)` sealed with ChaCha20-Poly1305, so a blob is
//! self-contained and can be stored as a plain string.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};

/// Required key length in bytes
pub const KEY_LEN: usize = 32;

/// ChaCha20-Poly1305 nonce length in bytes
const NONCE_LEN: usize = 12;

/// Errors raised by the credential cipher
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    /// Key has the wrong size; fatal at construction
    #[error("encryption key must be exactly 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// Key could not be decoded from its textual form
    #[error("encryption key is not valid base64: {0}")]
    KeyEncoding(String),

    /// Encryption failure
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Blob is not valid base64
    #[error("ciphertext is not valid base64: {0}")]
    Encoding(String),

    /// Blob shorter than a nonce
    #[error("ciphertext too short")]
    TooShort,

    /// Authentication tag mismatch or wrong key
    #[error("decryption failed")]
    Decryption,

    /// Decrypted bytes are not UTF-8
    #[error("decrypted value is not valid UTF-8")]
    NotUtf8,
}

/// Encrypts and decrypts tenant secrets with a fixed 32-byte key
#[derive(Clone)]
pub struct CredentialCipher {
    cipher: ChaCha20Poly1305,
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCipher").finish_non_exhaustive()
    }
}

impl CredentialCipher {
    /// Create a cipher from raw key bytes
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        if key.len() != KEY_LEN {
            return Err(CipherError::InvalidKeyLength(key.len()));
        }
        let cipher = ChaCha20Poly1305::new_from_slice(key)
            .map_err(|_| CipherError::InvalidKeyLength(key.len()))?;
        Ok(Self { cipher })
    }

    /// Create a cipher from a base64-encoded key
    pub fn from_base64_key(encoded: &str) -> Result<Self, CipherError> {
        let key = BASE64
            .decode(encoded.trim())
            .map_err(|e| CipherError::KeyEncoding(e.to_string()))?;
        Self::new(&key)
    }

    /// Generate a fresh random key, base64-encoded
    pub fn generate_key() -> String {
        let key: [u8; KEY_LEN] = rand::random();
        BASE64.encode(key)
    }

    /// Encrypt a plaintext secret into a self-contained blob
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let nonce: [u8; NONCE_LEN] = rand::random();
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| CipherError::Encryption(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(sealed))
    }

    /// Decrypt a blob produced by [`CredentialCipher::encrypt`]
    pub fn decrypt(&self, blob: &str) -> Result<String, CipherError> {
        let data = BASE64
            .decode(blob.trim())
            .map_err(|e| CipherError::Encoding(e.to_string()))?;
        if data.len() < NONCE_LEN {
            return Err(CipherError::TooShort);
        }

        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CipherError::Decryption)?;

        String::from_utf8(plaintext).map_err(|_| CipherError::NotUtf8)
    }
}
