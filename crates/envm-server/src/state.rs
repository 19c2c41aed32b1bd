//! Shared application state for the envm server.
//!
//! A single [`AppState`] is constructed at startup and shared across all
//! Axum handlers via `Arc`.

use std::fmt;
use std::sync::Arc;

use chrono::Duration;
use envm_core::Services;
use envm_core::error::ConfigError;
use envm_core::notify::Notifier;
use envm_core::token::TokenMaker;
use envm_core::values::ValueCipher;
use envm_storage::StorageBackend;

use crate::config::ServerConfig;

/// Shared application state passed to all HTTP handlers.
pub struct AppState {
    /// Domain services over the configured storage.
    pub services: Services,
    /// Access-token signing and verification.
    pub tokens: TokenMaker,
    /// Lifetime of issued access tokens.
    pub access_ttl: Duration,
    /// Whether session cookies carry the `Secure` attribute.
    pub secure_cookies: bool,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl AppState {
    /// Wire services and token handling from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the signing secret is rejected.
    pub fn new(
        config: &ServerConfig,
        storage: Arc<dyn StorageBackend>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            services: Services::new(
                storage,
                notifier,
                ValueCipher::new(config.encryption_key.clone()),
            ),
            tokens: TokenMaker::new(config.token_secret.as_bytes())?,
            access_ttl: Duration::seconds(config.access_token_ttl_secs),
            secure_cookies: config.production,
        })
    }
}
