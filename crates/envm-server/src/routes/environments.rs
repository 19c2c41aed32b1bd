//! Environment and variable routes.
//!
//! Variable values are returned decrypted to project members and only
//! ever stored sealed.
//!
//! - `GET/POST          /api/v1/projects/{project_id}/environments`
//! - `GET/PUT/DELETE    /api/v1/environments/{env_id}`
//! - `GET/POST          /api/v1/environments/{env_id}/variables`
//! - `GET/PUT/DELETE    /api/v1/environments/{env_id}/variables/{key}`

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Extension, Json, Router};
use envm_core::environments::{EnvironmentUpdate, NewEnvironment, VariableUpdate};
use envm_core::models::{Environment, RevealedVariable};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::state::AppState;
use crate::validate::ValidatedJson;

// ── Request / Response types ─────────────────────────────────────────

#[derive(Debug, Deserialize, Validate)]
pub struct CreateEnvironmentRequest {
    #[validate(length(min = 1, max = 100, message = "must be 1-100 characters"))]
    pub name: String,
    #[validate(length(min = 1, max = 64, message = "must be 1-64 characters"))]
    pub slug: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateEnvironmentRequest {
    #[validate(length(min = 1, max = 100, message = "must be 1-100 characters"))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 64, message = "must be 1-64 characters"))]
    pub slug: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateVariableRequest {
    #[validate(length(min = 1, max = 256, message = "must be 1-256 characters"))]
    pub key: String,
    #[validate(length(max = 65536, message = "is too large"))]
    pub value: String,
    /// Defaults to `.env`.
    #[validate(length(min = 1, max = 256, message = "must be 1-256 characters"))]
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateVariableRequest {
    #[validate(length(max = 65536, message = "is too large"))]
    pub value: Option<String>,
    #[validate(length(min = 1, max = 256, message = "must be 1-256 characters"))]
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EnvironmentListResponse {
    pub environments: Vec<Environment>,
}

#[derive(Debug, Serialize)]
pub struct VariableListResponse {
    pub variables: Vec<RevealedVariable>,
}

// ── Router ───────────────────────────────────────────────────────────

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/projects/{project_id}/environments",
            get(list_environments).post(create_environment),
        )
        .route(
            "/environments/{env_id}",
            get(get_environment)
                .put(update_environment)
                .delete(delete_environment),
        )
        .route(
            "/environments/{env_id}/variables",
            get(list_variables).post(create_variable),
        )
        .route(
            "/environments/{env_id}/variables/{key}",
            get(get_variable)
                .put(update_variable)
                .delete(delete_variable),
        )
}

// ── Environments ─────────────────────────────────────────────────────

async fn list_environments(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<EnvironmentListResponse>, AppError> {
    let environments = state
        .services
        .environments
        .list(user.user_id, project_id)
        .await?;
    Ok(Json(EnvironmentListResponse { environments }))
}

async fn create_environment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(project_id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<CreateEnvironmentRequest>,
) -> Result<(StatusCode, Json<Environment>), AppError> {
    let env = state
        .services
        .environments
        .create(
            user.user_id,
            project_id,
            NewEnvironment {
                name: body.name,
                slug: body.slug,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(env)))
}

async fn get_environment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(env_id): Path<Uuid>,
) -> Result<Json<Environment>, AppError> {
    Ok(Json(
        state.services.environments.get(user.user_id, env_id).await?,
    ))
}

async fn update_environment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(env_id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<UpdateEnvironmentRequest>,
) -> Result<Json<Environment>, AppError> {
    let env = state
        .services
        .environments
        .update(
            user.user_id,
            env_id,
            EnvironmentUpdate {
                name: body.name,
                slug: body.slug,
            },
        )
        .await?;
    Ok(Json(env))
}

async fn delete_environment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(env_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state
        .services
        .environments
        .delete(user.user_id, env_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Variables ────────────────────────────────────────────────────────

async fn list_variables(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(env_id): Path<Uuid>,
) -> Result<Json<VariableListResponse>, AppError> {
    let variables = state
        .services
        .environments
        .list_variables(user.user_id, env_id)
        .await?;
    Ok(Json(VariableListResponse { variables }))
}

async fn create_variable(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(env_id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<CreateVariableRequest>,
) -> Result<(StatusCode, Json<RevealedVariable>), AppError> {
    let variable = state
        .services
        .environments
        .create_variable(
            user.user_id,
            env_id,
            &body.key,
            &body.value,
            body.path.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(variable)))
}

async fn get_variable(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((env_id, key)): Path<(Uuid, String)>,
) -> Result<Json<RevealedVariable>, AppError> {
    let variable = state
        .services
        .environments
        .get_variable(user.user_id, env_id, &key)
        .await?;
    Ok(Json(variable))
}

async fn update_variable(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((env_id, key)): Path<(Uuid, String)>,
    ValidatedJson(body): ValidatedJson<UpdateVariableRequest>,
) -> Result<Json<RevealedVariable>, AppError> {
    let variable = state
        .services
        .environments
        .update_variable(
            user.user_id,
            env_id,
            &key,
            VariableUpdate {
                value: body.value,
                path: body.path,
            },
        )
        .await?;
    Ok(Json(variable))
}

async fn delete_variable(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((env_id, key)): Path<(Uuid, String)>,
) -> Result<StatusCode, AppError> {
    state
        .services
        .environments
        .delete_variable(user.user_id, env_id, &key)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
