//! Short-lived signed access tokens.
//!
//! Access tokens are HS256 JWTs carrying the user id and email. They are
//! stateless: nothing is persisted, so revocation happens by letting them
//! expire (default 15 minutes) and revoking the refresh token behind them.

use std::fmt;

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ConfigError, TokenError};

/// Minimum length of the HMAC signing secret.
pub const MIN_SECRET_LEN: usize = 32;

/// Default lifetime of an access token.
pub const ACCESS_TOKEN_TTL_SECS: i64 = 15 * 60;

/// Claims embedded in every access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Uuid,
    pub email: String,
    /// Issued-at, seconds since the Unix epoch.
    pub iat: i64,
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
}

/// Creates and verifies HS256 access tokens with one secret.
#[derive(Clone)]
pub struct TokenMaker {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl fmt::Debug for TokenMaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenMaker")
            .field("algorithm", &Algorithm::HS256)
            .finish_non_exhaustive()
    }
}

impl TokenMaker {
    /// Build a token maker from the signing secret.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::SigningKeyTooShort`] if `secret` is shorter
    /// than [`MIN_SECRET_LEN`] bytes.
    pub fn new(secret: &[u8]) -> Result<Self, ConfigError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::SigningKeyTooShort {
                min: MIN_SECRET_LEN,
                actual: secret.len(),
            });
        }

        // Only HS256 is accepted and expiry is exact.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        })
    }

    /// Sign a token for `user_id` that expires `ttl` from now.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Signing`] if encoding fails.
    pub fn create_token(
        &self,
        user_id: Uuid,
        email: &str,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            user_id,
            email: email.to_owned(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(
            |e| TokenError::Signing {
                reason: e.to_string(),
            },
        )
    }

    /// Check the signature, algorithm, and expiry of `token`.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Expired`] for an authentic but expired token and
    /// [`TokenError::Invalid`] for everything else.
    pub fn verify_token(&self, token: &str) -> Result<Claims, TokenError> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid {
                    reason: e.to_string(),
                },
            })
    }
}
