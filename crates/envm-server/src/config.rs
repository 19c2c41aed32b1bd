//! Server configuration for envm.
//!
//! Loads configuration from environment variables. Secrets have no
//! defaults: a missing or malformed signing secret or encryption key stops
//! the server before it binds.

use std::fmt;
use std::net::SocketAddr;

use envm_core::crypto::EncryptionKey;
use envm_core::error::ConfigError;
use envm_core::token::{ACCESS_TOKEN_TTL_SECS, MIN_SECRET_LEN};

const DEFAULT_PORT: u16 = 8080;

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Storage backend type.
    pub storage_backend: StorageBackendType,
    /// Log level filter used when `RUST_LOG` is unset.
    pub log_level: String,
    /// HMAC secret for access tokens, at least [`MIN_SECRET_LEN`] bytes.
    pub token_secret: String,
    /// Key protecting stored variable values.
    pub encryption_key: EncryptionKey,
    /// `ENV=production`: cookies get the `Secure` flag.
    pub production: bool,
    /// Access-token lifetime in seconds.
    pub access_token_ttl_secs: i64,
    /// SMTP delivery for invitations and password resets (optional).
    pub smtp: Option<SmtpConfig>,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("storage_backend", &self.storage_backend)
            .field("log_level", &self.log_level)
            .field("production", &self.production)
            .field("access_token_ttl_secs", &self.access_token_ttl_secs)
            .field("smtp", &self.smtp)
            .finish_non_exhaustive()
    }
}

/// SMTP relay settings.
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("from", &self.from)
            .finish_non_exhaustive()
    }
}

/// Supported storage backend types.
#[derive(Clone, PartialEq, Eq)]
pub enum StorageBackendType {
    /// In-memory (development only, data lost on restart).
    Memory,
    /// `RocksDB` persistent storage.
    RocksDb { path: String },
    /// `PostgreSQL` persistent storage.
    Postgres { url: String },
}

impl fmt::Debug for StorageBackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => f.write_str("Memory"),
            Self::RocksDb { path } => f.debug_struct("RocksDb").field("path", path).finish(),
            // The URL may carry credentials.
            Self::Postgres { .. } => f.debug_struct("Postgres").finish_non_exhaustive(),
        }
    }
}

fn invalid(name: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        name: name.to_owned(),
        reason: reason.into(),
    }
}

impl ServerConfig {
    /// Load configuration from the process environment.
    ///
    /// Environment variables:
    /// - `ENVM_BIND_ADDR`: full bind address (default `127.0.0.1:8080`)
    /// - `PORT`: port to bind on `0.0.0.0` when `ENVM_BIND_ADDR` is unset
    /// - `ENVM_STORAGE`: `memory`, `rocksdb`, or `postgres` (default `memory`)
    /// - `ENVM_STORAGE_PATH`: path for `RocksDB` (default `./data`)
    /// - `DATABASE_URL`: required when `ENVM_STORAGE=postgres`
    /// - `ENVM_TOKEN_SECRET`: access-token signing secret (required)
    /// - `ENVM_ENCRYPTION_KEY`: 64 hex characters (required)
    /// - `ENV`: `production` marks cookies `Secure`
    /// - `ENVM_ACCESS_TOKEN_TTL_SECS`: default 900
    /// - `ENVM_LOG_LEVEL`: log filter (default `info`)
    /// - `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD`, `SMTP_FROM`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for missing secrets or unparseable values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let bind_addr = if let Some(addr) = var("ENVM_BIND_ADDR") {
            addr.parse()
                .map_err(|e| invalid("ENVM_BIND_ADDR", format!("{e}")))?
        } else if let Some(port) = var("PORT") {
            let port: u16 = port
                .parse()
                .map_err(|e| invalid("PORT", format!("{e}")))?;
            SocketAddr::from(([0, 0, 0, 0], port))
        } else {
            SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT))
        };

        let storage_backend = match var("ENVM_STORAGE")
            .unwrap_or_else(|| "memory".to_owned())
            .to_lowercase()
            .as_str()
        {
            "memory" => StorageBackendType::Memory,
            "rocksdb" => StorageBackendType::RocksDb {
                path: var("ENVM_STORAGE_PATH").unwrap_or_else(|| "./data".to_owned()),
            },
            "postgres" | "postgresql" => StorageBackendType::Postgres {
                url: var("DATABASE_URL").ok_or_else(|| ConfigError::Missing {
                    name: "DATABASE_URL".to_owned(),
                })?,
            },
            other => {
                return Err(invalid(
                    "ENVM_STORAGE",
                    format!("unknown backend '{other}', expected memory, rocksdb, or postgres"),
                ));
            }
        };

        let token_secret = var("ENVM_TOKEN_SECRET").ok_or_else(|| ConfigError::Missing {
            name: "ENVM_TOKEN_SECRET".to_owned(),
        })?;
        if token_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::SigningKeyTooShort {
                min: MIN_SECRET_LEN,
                actual: token_secret.len(),
            });
        }

        let encryption_key = var("ENVM_ENCRYPTION_KEY")
            .ok_or_else(|| ConfigError::Missing {
                name: "ENVM_ENCRYPTION_KEY".to_owned(),
            })
            .and_then(|hex| EncryptionKey::from_hex(hex.trim()))?;

        let access_token_ttl_secs = match var("ENVM_ACCESS_TOKEN_TTL_SECS") {
            Some(raw) => match raw.parse::<i64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(invalid(
                        "ENVM_ACCESS_TOKEN_TTL_SECS",
                        "must be a positive number of seconds",
                    ));
                }
            },
            None => ACCESS_TOKEN_TTL_SECS,
        };

        let smtp = match var("SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                port: match var("SMTP_PORT") {
                    Some(port) => port
                        .parse()
                        .map_err(|e| invalid("SMTP_PORT", format!("{e}")))?,
                    None => 587,
                },
                username: var("SMTP_USERNAME"),
                password: var("SMTP_PASSWORD"),
                from: var("SMTP_FROM").ok_or_else(|| ConfigError::Missing {
                    name: "SMTP_FROM".to_owned(),
                })?,
            }),
            None => None,
        };

        Ok(Self {
            bind_addr,
            storage_backend,
            log_level: var("ENVM_LOG_LEVEL").unwrap_or_else(|| "info".to_owned()),
            token_secret,
            encryption_key,
            production: var("ENV").is_some_and(|v| v.eq_ignore_ascii_case("production")),
            access_token_ttl_secs,
            smtp,
        })
    }
}
