//! Error types for `envm-core`.
//!
//! Each subsystem has its own enum so callers can tell failures apart
//! without string matching. Crypto and token errors never include key
//! material, token values, or decrypted variable values.

use envm_storage::StorageError;

use crate::authz::{Role, ScopeKind};

/// Invalid or missing startup configuration. Always fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The JWT signing secret is shorter than the required minimum.
    #[error("token signing key must be at least {min} bytes, got {actual}")]
    SigningKeyTooShort { min: usize, actual: usize },

    /// The value-encryption key is not 32 bytes of hex.
    #[error("invalid encryption key: {reason}")]
    InvalidEncryptionKey { reason: String },

    /// A required setting was not provided.
    #[error("missing required setting '{name}'")]
    Missing { name: String },

    /// A setting was present but could not be parsed.
    #[error("invalid value for '{name}': {reason}")]
    Invalid { name: String, reason: String },
}

/// Errors from the AES-256-GCM cipher and the value encryption service.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// AES-256-GCM encryption failed.
    #[error("encryption failed: {reason}")]
    Encryption { reason: String },

    /// Authentication failed (wrong key, corrupted ciphertext, or tampered tag).
    #[error("decryption failed: {reason}")]
    Decryption { reason: String },

    /// Ciphertext is too short to contain a valid nonce + tag.
    #[error("ciphertext too short: expected at least {expected} bytes, got {actual}")]
    CiphertextTooShort { expected: usize, actual: usize },

    /// A stored value was not valid hex or did not decode to UTF-8.
    #[error("malformed encrypted value: {reason}")]
    Malformed { reason: String },
}

/// Errors from access-token creation and verification.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// The token signature is valid but its `exp` has passed.
    #[error("token has expired")]
    Expired,

    /// Bad signature, wrong algorithm, or malformed claims.
    #[error("invalid token: {reason}")]
    Invalid { reason: String },

    /// Signing a new token failed.
    #[error("failed to sign token: {reason}")]
    Signing { reason: String },
}

/// Errors from the typed repository over a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// The storage backend failed.
    #[error("storage error: {0}")]
    Storage(StorageError),

    /// A uniqueness index already held the given key.
    #[error("conflict on '{key}'")]
    Conflict { key: String },

    /// A record the batch consumed or depended on was changed or removed
    /// before the batch committed.
    #[error("'{key}' changed concurrently")]
    Stale { key: String },

    /// A record could not be serialized.
    #[error("failed to serialize record: {reason}")]
    Serialization { reason: String },

    /// A stored record could not be deserialized.
    #[error("corrupted record at '{key}': {reason}")]
    Corrupted { key: String, reason: String },
}

impl From<StorageError> for RepositoryError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::KeyExists { key } => Self::Conflict { key },
            StorageError::KeyMissing { key } => Self::Stale { key },
            other => Self::Storage(other),
        }
    }
}

/// Errors from password hashing and policy checks.
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    /// The password is shorter than the minimum length.
    #[error("password must be at least {min} characters")]
    TooShort { min: usize },

    /// Argon2 hashing failed.
    #[error("password hashing failed: {reason}")]
    Hash { reason: String },
}

/// Errors from delivering invitation or password-reset messages.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The recipient or sender address was rejected.
    #[error("invalid address '{address}'")]
    InvalidAddress { address: String },

    /// The transport failed to deliver the message.
    #[error("delivery failed: {reason}")]
    Delivery { reason: String },
}

/// Errors from the session manager.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No refresh token with this value exists.
    #[error("invalid refresh token")]
    InvalidToken,

    /// The refresh token was revoked by logout or rotation.
    #[error("refresh token has been revoked")]
    Revoked,

    /// The refresh token is past its expiry.
    #[error("refresh token has expired")]
    Expired,

    /// Password-reset or invitation token is unknown or expired.
    ///
    /// Deliberately does not say which.
    #[error("invalid or expired token")]
    InvalidOrExpired,

    /// The invited user already belongs to the organization.
    #[error("user is already a member of this organization")]
    AlreadyMember,

    /// Password policy or hashing failure.
    #[error(transparent)]
    Password(#[from] PasswordError),

    /// The notifier failed to send a message.
    #[error("notification failed: {0}")]
    Notify(#[from] NotifyError),

    /// Persistence failure.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Errors from the authorizer.
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// The user has no membership in the scope.
    #[error("not a member of this {scope}")]
    NotAMember { scope: ScopeKind },

    /// The user's role satisfies none of the required roles.
    #[error("insufficient role: requires one of {}, have {actual}", format_roles(.required))]
    Insufficient { required: Vec<Role>, actual: Role },

    /// Persistence failure while looking up the membership.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

fn format_roles(roles: &[Role]) -> String {
    roles
        .iter()
        .map(Role::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors from registration, login, and profile management.
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    /// Unknown email or wrong password. Deliberately does not say which.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// Another account already uses this email address.
    #[error("email address is already registered")]
    EmailTaken,

    /// The user does not exist.
    #[error("user not found")]
    NotFound,

    /// Input failed validation.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// The account is the only owner of an organization or project.
    #[error("transfer ownership of {scope} '{name}' or delete it before deleting your account")]
    SoleOwner { scope: ScopeKind, name: String },

    /// Password policy or hashing failure.
    #[error(transparent)]
    Password(#[from] PasswordError),

    /// Session cleanup failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Persistence failure.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Errors from the organization, project, and environment services.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The requested resource does not exist.
    #[error("{resource} not found")]
    NotFound { resource: &'static str },

    /// A unique name or membership already exists.
    #[error("{reason}")]
    Conflict { reason: String },

    /// Input failed validation.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// The caller lacks the required membership or role.
    #[error(transparent)]
    Authz(#[from] AuthzError),

    /// Encrypting or decrypting a variable value failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Invitation handling failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Persistence failure.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
