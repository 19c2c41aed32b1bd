//! Encryption of variable values at rest.
//!
//! Plaintext values go in, hex-encoded sealed blobs come out. A single static
//! key, loaded once at startup, protects every stored value.

use crate::crypto::{self, EncryptionKey};
use crate::error::{ConfigError, CryptoError};

/// Protects and reveals variable values with one AES-256-GCM key.
#[derive(Debug, Clone)]
pub struct ValueCipher {
    key: EncryptionKey,
}

impl ValueCipher {
    /// Wrap an existing key.
    #[must_use]
    pub fn new(key: EncryptionKey) -> Self {
        Self { key }
    }

    /// Build from the hex-encoded key in configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEncryptionKey`] unless the input is
    /// exactly 64 hex characters.
    pub fn from_hex(encoded: &str) -> Result<Self, ConfigError> {
        EncryptionKey::from_hex(encoded).map(Self::new)
    }

    /// Seal `plaintext` and hex-encode the result.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Encryption`] if sealing fails.
    pub fn protect(&self, plaintext: &str) -> Result<String, CryptoError> {
        crypto::seal(&self.key, plaintext.as_bytes()).map(hex::encode)
    }

    /// Reverse [`protect`](Self::protect).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Malformed`] for non-hex input or non-UTF-8
    /// plaintext, and the cipher's errors for short or unauthentic input.
    pub fn reveal(&self, stored: &str) -> Result<String, CryptoError> {
        let sealed = hex::decode(stored).map_err(|e| CryptoError::Malformed {
            reason: format!("not valid hex: {e}"),
        })?;
        let plaintext = crypto::open(&self.key, &sealed)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::Malformed {
            reason: "decrypted value is not UTF-8".to_owned(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn cipher() -> ValueCipher {
        ValueCipher::new(EncryptionKey::generate())
    }

    #[test]
    fn protect_produces_hex_that_reveals() {
        let values = cipher();
        let stored = values.protect("sk_live_123").unwrap();
        assert!(stored.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(!stored.contains("sk_live_123"));
        assert_eq!(values.reveal(&stored).unwrap(), "sk_live_123");
    }

    #[test]
    fn protecting_the_same_value_twice_differs() {
        let values = cipher();
        let first = values.protect("same").unwrap();
        let second = values.protect("same").unwrap();
        assert_ne!(first, second);
        assert_eq!(values.reveal(&first).unwrap(), values.reveal(&second).unwrap());
    }

    #[test]
    fn every_flipped_byte_is_detected() {
        let values = cipher();
        let sealed = hex::decode(values.protect("postgres://user:pw@db").unwrap()).unwrap();

        for i in 0..sealed.len() {
            let mut tampered = sealed.clone();
            tampered[i] ^= 0x01;
            assert!(
                values.reveal(&hex::encode(&tampered)).is_err(),
                "flip at byte {i} went unnoticed"
            );
        }
    }

    #[test]
    fn reveal_rejects_non_hex() {
        let err = cipher().reveal("not hex!").unwrap_err();
        assert!(matches!(err, CryptoError::Malformed { .. }));
    }

    #[test]
    fn reveal_with_other_key_fails() {
        let stored = cipher().protect("v").unwrap();
        let err = cipher().reveal(&stored).unwrap_err();
        assert!(matches!(err, CryptoError::Decryption { .. }));
    }

    #[test]
    fn from_hex_rejects_wrong_length() {
        assert!(ValueCipher::from_hex("abcd").is_err());
        assert!(ValueCipher::from_hex(&"0f".repeat(32)).is_ok());
    }
}
