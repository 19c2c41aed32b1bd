//! Profile routes for the authenticated caller.
//!
//! - `GET    /api/v1/users/me`
//! - `PUT    /api/v1/users/me`
//! - `DELETE /api/v1/users/me`

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Extension, Json, Router};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use envm_core::accounts::ProfileUpdate;
use envm_core::models::User;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::cookies;
use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::state::AppState;
use crate::validate::ValidatedJson;

/// Public view of a user. Never carries the password or reset digests.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(email(message = "must be a valid email"))]
    pub email: Option<String>,
    #[validate(length(min = 1, max = 100, message = "must be 1-100 characters"))]
    pub full_name: Option<String>,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/users/me", get(me).put(update_me).delete(delete_me))
}

async fn me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserResponse>, AppError> {
    let user = state.services.accounts.get(user.user_id).await?;
    Ok(Json(user.into()))
}

async fn update_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    ValidatedJson(body): ValidatedJson<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let user = state
        .services
        .accounts
        .update_profile(
            user.user_id,
            ProfileUpdate {
                email: body.email,
                full_name: body.full_name,
            },
        )
        .await?;
    Ok(Json(user.into()))
}

async fn delete_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    jar: CookieJar,
) -> Result<(StatusCode, CookieJar), AppError> {
    state.services.accounts.delete(user.user_id).await?;
    Ok((StatusCode::NO_CONTENT, cookies::without_session(jar)))
}
