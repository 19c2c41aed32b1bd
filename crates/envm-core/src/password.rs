//! Argon2id password hashing.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::error::PasswordError;

/// Shortest password accepted at registration and reset.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Reject passwords that do not meet the length policy.
///
/// # Errors
///
/// Returns [`PasswordError::TooShort`].
pub fn check_policy(password: &str) -> Result<(), PasswordError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(PasswordError::TooShort {
            min: MIN_PASSWORD_LEN,
        });
    }
    Ok(())
}

/// Hash `password` with a fresh random salt, returning a PHC string.
///
/// # Errors
///
/// Returns [`PasswordError::Hash`] if Argon2 fails.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hash {
            reason: e.to_string(),
        })
}

/// Whether `password` matches the stored PHC string.
///
/// An unparseable hash never matches.
#[must_use]
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_argon2_phc() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
    }

    #[test]
    fn verify_accepts_only_the_right_password() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("battery staple", &hash));
    }

    #[test]
    fn same_password_hashes_differently() {
        assert_ne!(
            hash_password("correct horse").unwrap(),
            hash_password("correct horse").unwrap()
        );
    }

    #[test]
    fn garbage_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn policy_enforces_minimum_length() {
        assert!(check_policy("short").is_err());
        assert!(check_policy("longenough").is_ok());
    }
}
