//! Authentication middleware for envm.
//!
//! Accepts an access token from `Authorization: Bearer <jwt>` or, failing
//! that, the `auth_token` cookie. A verified token puts an [`AuthUser`] into
//! the request extensions for handlers.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::cookie::CookieJar;
use uuid::Uuid;

use crate::cookies::ACCESS_COOKIE;
use crate::error::AppError;
use crate::state::AppState;

/// Identity of the authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
}

/// Pull the access token from the request, header first.
fn access_token(headers: &HeaderMap) -> Result<Option<String>, AppError> {
    if let Some(value) = headers.get(AUTHORIZATION) {
        let value = value
            .to_str()
            .map_err(|_| AppError::Unauthorized("malformed Authorization header".to_owned()))?;
        let token = value.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::Unauthorized("Authorization header must use Bearer scheme".to_owned())
        })?;
        return Ok(Some(token.trim().to_owned()));
    }

    Ok(CookieJar::from_headers(headers)
        .get(ACCESS_COOKIE)
        .map(|c| c.value().to_owned()))
}

/// Reject requests without a valid access token.
///
/// # Errors
///
/// Returns [`AppError::Unauthorized`] if no token is present or it fails
/// verification.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = access_token(req.headers())?
        .ok_or_else(|| AppError::Unauthorized("authentication required".to_owned()))?;

    let claims = state.tokens.verify_token(&token)?;
    req.extensions_mut().insert(AuthUser {
        user_id: claims.user_id,
        email: claims.email,
    });

    Ok(next.run(req).await)
}
