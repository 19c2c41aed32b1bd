//! Session routes: register, login, refresh, logout, password reset.
//!
//! - `POST /api/v1/auth/register`
//! - `POST /api/v1/auth/login`
//! - `POST /api/v1/auth/refresh`
//! - `POST /api/v1/auth/logout`
//! - `POST /api/v1/auth/forgot-password`
//! - `POST /api/v1/auth/reset-password`

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use axum_extra::extract::cookie::CookieJar;
use envm_core::accounts::NewUser;
use envm_core::models::User;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use super::MessageResponse;
use super::users::UserResponse;
use crate::cookies::{self, REFRESH_COOKIE};
use crate::error::AppError;
use crate::state::AppState;
use crate::validate::ValidatedJson;

/// Same body whether or not the address is registered.
const RESET_ACK: &str = "if an account exists for that email, a reset link has been sent";

// ── Request / Response types ─────────────────────────────────────────

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "must be a valid email"))]
    pub email: String,
    #[validate(length(min = 8, message = "must be at least 8 characters"))]
    pub password: String,
    #[validate(length(min = 1, max = 100, message = "must be 1-100 characters"))]
    pub full_name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "must be a valid email"))]
    pub email: String,
    #[validate(length(min = 1, message = "is required"))]
    pub password: String,
}

/// Optional body for refresh/logout; the cookie is used when absent.
#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "must be a valid email"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, message = "is required"))]
    pub token: String,
    #[validate(length(min = 8, message = "must be at least 8 characters"))]
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access-token lifetime in seconds.
    pub expires_in: i64,
    pub user: UserResponse,
}

// ── Router ───────────────────────────────────────────────────────────

/// Build the public `/auth` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
}

// ── Helpers ──────────────────────────────────────────────────────────

/// Refresh token from a JSON body, falling back to the cookie.
fn presented_refresh_token(jar: &CookieJar, body: &Bytes) -> Option<String> {
    let from_body = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<RefreshRequest>(body)
            .ok()
            .and_then(|r| r.refresh_token)
    };
    from_body
        .or_else(|| jar.get(REFRESH_COOKIE).map(|c| c.value().to_owned()))
        .filter(|t| !t.is_empty())
}

/// Sign an access token for `user` and attach both tokens as cookies.
fn issue(
    state: &AppState,
    jar: CookieJar,
    user: User,
    refresh_token: String,
) -> Result<(CookieJar, Json<SessionResponse>), AppError> {
    let access_token = state
        .tokens
        .create_token(user.id, &user.email, state.access_ttl)?;
    let jar = cookies::with_session(
        jar,
        &access_token,
        state.access_ttl,
        &refresh_token,
        state.services.sessions.ttls().refresh,
        state.secure_cookies,
    );

    Ok((
        jar,
        Json(SessionResponse {
            access_token,
            refresh_token,
            token_type: "Bearer",
            expires_in: state.access_ttl.num_seconds(),
            user: user.into(),
        }),
    ))
}

// ── Handlers ─────────────────────────────────────────────────────────

async fn register(
    State(state): State<Arc<AppState>>,
    ValidatedJson(body): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    let user = state
        .services
        .accounts
        .register(NewUser {
            email: body.email,
            password: body.password,
            full_name: body.full_name,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(user.into())))
}

async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    ValidatedJson(body): ValidatedJson<LoginRequest>,
) -> Result<(CookieJar, Json<SessionResponse>), AppError> {
    let user = state
        .services
        .accounts
        .login(&body.email, &body.password)
        .await?;
    let refresh_token = state.services.sessions.create_session(user.id).await?;

    info!(user_id = %user.id, "login succeeded");
    issue(&state, jar, user, refresh_token)
}

async fn refresh(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    body: Bytes,
) -> Result<(CookieJar, Json<SessionResponse>), AppError> {
    let presented = presented_refresh_token(&jar, &body)
        .ok_or_else(|| AppError::Unauthorized("refresh token required".to_owned()))?;

    let (user, refresh_token) = state
        .services
        .sessions
        .rotate_refresh_token(&presented)
        .await?;

    issue(&state, jar, user, refresh_token)
}

async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    body: Bytes,
) -> (CookieJar, Json<MessageResponse>) {
    if let Some(token) = presented_refresh_token(&jar, &body) {
        if let Err(e) = state.services.sessions.logout(&token).await {
            warn!(error = %e, "refresh token revocation failed during logout");
        }
    }

    (cookies::without_session(jar), MessageResponse::new("logged out"))
}

async fn forgot_password(
    State(state): State<Arc<AppState>>,
    ValidatedJson(body): ValidatedJson<ForgotPasswordRequest>,
) -> Json<MessageResponse> {
    if let Err(e) = state
        .services
        .sessions
        .issue_password_reset(&body.email)
        .await
    {
        warn!(error = %e, "password reset request failed");
    }

    MessageResponse::new(RESET_ACK)
}

async fn reset_password(
    State(state): State<Arc<AppState>>,
    ValidatedJson(body): ValidatedJson<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .services
        .sessions
        .consume_password_reset(&body.token, &body.new_password)
        .await?;

    Ok(MessageResponse::new("password has been reset"))
}
