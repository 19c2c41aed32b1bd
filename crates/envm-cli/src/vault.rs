//! Encrypted on-disk store for the CLI session.
//!
//! Credentials are JSON-encoded, sealed with AES-256-GCM under
//! `SHA-256(machine_id || "envm-cli-salt-v1")`, hex-encoded, and written to
//! `~/.envm/credentials`. The file is owner-only (`0600`) inside an
//! owner-only directory (`0700`), and is replaced by renaming a fully written
//! temporary file over it. A vault copied to another machine fails to open
//! instead of yielding garbage.

use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use envm_core::crypto::{self, EncryptionKey};
use envm_core::error::CryptoError;
use serde::{Deserialize, Serialize};

use crate::machine;

/// Directory under the home directory holding CLI state.
pub const VAULT_DIR: &str = ".envm";

const CREDENTIALS_FILE: &str = "credentials";
const KEY_SALT: &str = "envm-cli-salt-v1";
const TMP_EXTENSION: &str = "tmp";

/// The session persisted between CLI invocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Refresh token; exchanged for an access token on each command.
    pub token: String,
    pub user_id: String,
    pub email: String,
    pub full_name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("cannot determine home directory (HOME / USERPROFILE not set)")]
    NoHome,

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupted credentials file; run `envm login` again")]
    Corrupted,

    /// The key derived on this host does not open the file.
    #[error("failed to decrypt credentials (machine identity mismatch?); run `envm login` again")]
    MachineMismatch,

    #[error("failed to encrypt credentials: {0}")]
    Seal(#[from] CryptoError),

    #[error("failed to encode credentials: {0}")]
    Encode(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> VaultError + '_ {
    move |source| VaultError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Home directory from `HOME`, falling back to `USERPROFILE`.
///
/// # Errors
///
/// Returns [`VaultError::NoHome`] if neither is set.
pub fn home_dir() -> Result<PathBuf, VaultError> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
        .ok_or(VaultError::NoHome)
}

/// Machine-bound credential store.
#[derive(Debug)]
pub struct CredentialVault {
    path: PathBuf,
    key: EncryptionKey,
}

impl CredentialVault {
    /// Vault at `<home>/.envm/credentials`, keyed to this machine.
    pub fn for_home(home: &Path) -> Self {
        let machine_id = machine::machine_id(home);
        Self::new(
            home.join(VAULT_DIR).join(CREDENTIALS_FILE),
            derive_key(&machine_id),
        )
    }

    /// Vault for the current user.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NoHome`] if the home directory is unknown.
    pub fn open_default() -> Result<Self, VaultError> {
        Ok(Self::for_home(&home_dir()?))
    }

    pub fn new(path: PathBuf, key: EncryptionKey) -> Self {
        Self { path, key }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encrypt and persist `credentials`, replacing any previous session.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError`] if encoding, sealing, or writing fails.
    pub fn save(&self, credentials: &Credentials) -> Result<(), VaultError> {
        if let Some(dir) = self.path.parent() {
            create_private_dir(dir)?;
        }

        let json = serde_json::to_vec(credentials)?;
        let sealed = crypto::seal(&self.key, &json)?;
        write_private_file(&self.path, hex::encode(sealed).as_bytes())
    }

    /// Load the stored session. `Ok(None)` means "not logged in".
    ///
    /// # Errors
    ///
    /// - [`VaultError::Corrupted`] if the file is not valid hex or JSON, or
    ///   too short to hold a sealed payload.
    /// - [`VaultError::MachineMismatch`] if it does not decrypt on this host.
    /// - [`VaultError::Io`] if the file cannot be read.
    pub fn load(&self) -> Result<Option<Credentials>, VaultError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&self.path)(e)),
        };

        let sealed = hex::decode(contents.trim()).map_err(|_| VaultError::Corrupted)?;
        let json = crypto::open(&self.key, &sealed).map_err(|e| match e {
            CryptoError::CiphertextTooShort { .. } => VaultError::Corrupted,
            _ => VaultError::MachineMismatch,
        })?;
        let credentials = serde_json::from_slice(&json).map_err(|_| VaultError::Corrupted)?;
        Ok(Some(credentials))
    }

    /// Remove the stored session. Succeeds if none exists.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Io`] if the file exists but cannot be removed.
    pub fn clear(&self) -> Result<(), VaultError> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(io_error(&self.path)(e)),
            _ => Ok(()),
        }
    }
}

/// `SHA-256(machine_id || salt)`.
pub fn derive_key(machine_id: &str) -> EncryptionKey {
    EncryptionKey::derive_sha256(format!("{machine_id}{KEY_SALT}").as_bytes())
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> Result<(), VaultError> {
    use std::os::unix::fs::{DirBuilderExt, PermissionsExt};

    fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
        .map_err(io_error(dir))?;
    fs::set_permissions(dir, fs::Permissions::from_mode(0o700)).map_err(io_error(dir))
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> Result<(), VaultError> {
    fs::create_dir_all(dir).map_err(io_error(dir))
}

/// Write `contents` to a sibling temporary file, then rename it over `path`
/// so readers see either the old file or the new one.
fn write_private_file(path: &Path, contents: &[u8]) -> Result<(), VaultError> {
    let tmp = path.with_extension(TMP_EXTENSION);
    // A leftover from an interrupted save may have a looser mode.
    match fs::remove_file(&tmp) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(io_error(&tmp)(e)),
        _ => {}
    }

    let mut file = create_private_file(&tmp).map_err(io_error(&tmp))?;
    file.write_all(contents).map_err(io_error(&tmp))?;
    file.sync_all().map_err(io_error(&tmp))?;
    drop(file);

    fs::rename(&tmp, path).map_err(io_error(path))
}

#[cfg(unix)]
fn create_private_file(path: &Path) -> io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;

    fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn create_private_file(path: &Path) -> io::Result<fs::File> {
    fs::OpenOptions::new().write(true).create_new(true).open(path)
}
