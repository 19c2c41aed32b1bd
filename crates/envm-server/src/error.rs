//! HTTP error types for the envm server.
//!
//! Maps domain errors from `envm-core` into HTTP responses. Every variant
//! produces a JSON body with a machine-readable `error` field and a
//! human-readable `message`. Internal failures are logged and replaced with
//! a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use envm_core::error::{
    AccountError, AuthzError, ConfigError, CryptoError, PasswordError, RepositoryError,
    ServiceError, SessionError, TokenError,
};

/// Application-level error returned from HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Authentication missing, failed, or expired.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated, but the role does not allow the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Client sent invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Duplicate email, slug, key, or membership.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Anything the client cannot fix.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal server error".to_owned(),
                )
            }
        };

        let body = ErrorBody {
            error: error_type,
            message,
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<CryptoError> for AppError {
    fn from(err: CryptoError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => Self::Unauthorized("access token has expired".to_owned()),
            TokenError::Invalid { .. } => Self::Unauthorized("invalid access token".to_owned()),
            TokenError::Signing { .. } => Self::Internal(err.to_string()),
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict { .. } => Self::Conflict("resource already exists".to_owned()),
            RepositoryError::Stale { .. } => {
                Self::Conflict("resource was modified concurrently, retry".to_owned())
            }
            RepositoryError::Storage(_)
            | RepositoryError::Serialization { .. }
            | RepositoryError::Corrupted { .. } => Self::Internal(err.to_string()),
        }
    }
}

impl From<PasswordError> for AppError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::TooShort { .. } => Self::BadRequest(err.to_string()),
            PasswordError::Hash { .. } => Self::Internal(err.to_string()),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::InvalidToken | SessionError::Revoked | SessionError::Expired => {
                Self::Unauthorized(err.to_string())
            }
            SessionError::InvalidOrExpired => Self::BadRequest(err.to_string()),
            SessionError::AlreadyMember => Self::Conflict(err.to_string()),
            SessionError::Password(inner) => inner.into(),
            SessionError::Notify(_) => Self::Internal(err.to_string()),
            SessionError::Repository(inner) => inner.into(),
        }
    }
}

impl From<AuthzError> for AppError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::NotAMember { .. } | AuthzError::Insufficient { .. } => {
                Self::Forbidden(err.to_string())
            }
            AuthzError::Repository(inner) => inner.into(),
        }
    }
}

impl From<AccountError> for AppError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::InvalidCredentials => Self::Unauthorized(err.to_string()),
            AccountError::EmailTaken | AccountError::SoleOwner { .. } => {
                Self::Conflict(err.to_string())
            }
            AccountError::NotFound => Self::NotFound(err.to_string()),
            AccountError::InvalidInput { .. } => Self::BadRequest(err.to_string()),
            AccountError::Password(inner) => inner.into(),
            AccountError::Session(inner) => inner.into(),
            AccountError::Repository(inner) => inner.into(),
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound { .. } => Self::NotFound(err.to_string()),
            ServiceError::Conflict { .. } => Self::Conflict(err.to_string()),
            ServiceError::InvalidInput { .. } => Self::BadRequest(err.to_string()),
            ServiceError::Authz(inner) => inner.into(),
            ServiceError::Crypto(inner) => inner.into(),
            ServiceError::Session(inner) => inner.into(),
            ServiceError::Repository(inner) => inner.into(),
        }
    }
}
