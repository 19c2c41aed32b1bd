//! Symmetric authenticated encryption for envm.
//!
//! Provides AES-256-GCM sealing and a zeroize-on-drop key newtype. Every
//! sealed value is self-describing: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
//! A fresh 96-bit nonce is drawn from `OsRng` for every call to [`seal`].

use std::fmt;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{ConfigError, CryptoError};

/// Nonce length for AES-256-GCM (96 bits).
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length.
const TAG_LEN: usize = 16;

/// Minimum sealed length: nonce + tag around an empty plaintext.
const MIN_SEALED_LEN: usize = NONCE_LEN + TAG_LEN;

/// A 256-bit encryption key that is zeroized on drop.
///
/// The inner bytes are never exposed in `Debug` output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    /// Create a key from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a key from 64 hex characters.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEncryptionKey`] if the input is not
    /// valid hex or does not decode to exactly 32 bytes.
    pub fn from_hex(encoded: &str) -> Result<Self, ConfigError> {
        let mut decoded = hex::decode(encoded.trim()).map_err(|e| {
            ConfigError::InvalidEncryptionKey {
                reason: format!("not valid hex: {e}"),
            }
        })?;

        let result = <[u8; 32]>::try_from(decoded.as_slice())
            .map(Self)
            .map_err(|_| ConfigError::InvalidEncryptionKey {
                reason: format!("expected 32 bytes, got {}", decoded.len()),
            });
        decoded.zeroize();
        result
    }

    /// Derive a key as `SHA-256(material)`.
    #[must_use]
    pub fn derive_sha256(material: &[u8]) -> Self {
        let digest = Sha256::digest(material);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Generate a new random key using the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(OsRng);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&key);
        Self(bytes)
    }

    /// Borrow the raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Encrypt `plaintext` under `key` with a fresh random nonce.
///
/// Returns `nonce || ciphertext || tag`.
///
/// # Errors
///
/// Returns [`CryptoError::Encryption`] if the AEAD operation fails.
pub fn seal(key: &EncryptionKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::Encryption {
            reason: e.to_string(),
        })?;

    let mut combined = Vec::with_capacity(NONCE_LEN.saturating_add(ciphertext.len()));
    combined.extend_from_slice(&nonce);
    combined.extend_from_slice(&ciphertext);
    Ok(combined)
}

/// Decrypt a value produced by [`seal`].
///
/// # Errors
///
/// Returns [`CryptoError::CiphertextTooShort`] if the input cannot hold a
/// nonce and a tag, and [`CryptoError::Decryption`] if authentication fails
/// (wrong key, corrupted data, or tampered tag).
pub fn open(key: &EncryptionKey, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < MIN_SEALED_LEN {
        return Err(CryptoError::CiphertextTooShort {
            expected: MIN_SEALED_LEN,
            actual: sealed.len(),
        });
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| CryptoError::Decryption {
            reason: e.to_string(),
        })
}

/// Hex-encoded SHA-256 of an opaque token, used as its storage key.
#[must_use]
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Fill `len` bytes from the OS CSPRNG and hex-encode them.
#[must_use]
pub fn random_token(len: usize) -> String {
    use rand::RngCore;

    let mut bytes = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
