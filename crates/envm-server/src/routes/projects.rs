//! Project routes.
//!
//! - `GET/POST          /api/v1/orgs/{org_id}/projects`
//! - `GET               /api/v1/projects`
//! - `GET/PUT/DELETE    /api/v1/projects/{project_id}`
//! - `GET/POST          /api/v1/projects/{project_id}/members`
//! - `DELETE            /api/v1/projects/{project_id}/members/{user_id}`

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Extension, Json, Router};
use envm_core::models::{Membership, Project};
use envm_core::projects::{NewProject, ProjectUpdate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::orgs::{AddMemberRequest, MemberListResponse};
use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::state::AppState;
use crate::validate::ValidatedJson;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProjectRequest {
    #[validate(length(min = 1, max = 100, message = "must be 1-100 characters"))]
    pub name: String,
    #[validate(length(min = 1, max = 64, message = "must be 1-64 characters"))]
    pub slug: Option<String>,
    #[validate(length(max = 500, message = "must be at most 500 characters"))]
    pub description: Option<String>,
}

/// An empty `description` clears it.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProjectRequest {
    #[validate(length(min = 1, max = 100, message = "must be 1-100 characters"))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 64, message = "must be 1-64 characters"))]
    pub slug: Option<String>,
    #[validate(length(max = 500, message = "must be at most 500 characters"))]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProjectListResponse {
    pub projects: Vec<Project>,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/orgs/{org_id}/projects",
            get(list_org_projects).post(create_project),
        )
        .route("/projects", get(list_my_projects))
        .route(
            "/projects/{project_id}",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route(
            "/projects/{project_id}/members",
            get(list_members).post(add_member),
        )
        .route(
            "/projects/{project_id}/members/{user_id}",
            delete(remove_member),
        )
}

async fn list_org_projects(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(org_id): Path<Uuid>,
) -> Result<Json<ProjectListResponse>, AppError> {
    let projects = state.services.projects.list(user.user_id, org_id).await?;
    Ok(Json(ProjectListResponse { projects }))
}

async fn list_my_projects(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ProjectListResponse>, AppError> {
    let projects = state.services.projects.list_mine(user.user_id).await?;
    Ok(Json(ProjectListResponse { projects }))
}

async fn create_project(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(org_id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<CreateProjectRequest>,
) -> Result<(StatusCode, Json<Project>), AppError> {
    let project = state
        .services
        .projects
        .create(
            user.user_id,
            org_id,
            NewProject {
                name: body.name,
                slug: body.slug,
                description: body.description,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(project)))
}

async fn get_project(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Project>, AppError> {
    Ok(Json(
        state.services.projects.get(user.user_id, project_id).await?,
    ))
}

async fn update_project(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(project_id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<UpdateProjectRequest>,
) -> Result<Json<Project>, AppError> {
    let project = state
        .services
        .projects
        .update(
            user.user_id,
            project_id,
            ProjectUpdate {
                name: body.name,
                slug: body.slug,
                description: body.description,
            },
        )
        .await?;
    Ok(Json(project))
}

async fn delete_project(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(project_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state
        .services
        .projects
        .delete(user.user_id, project_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_members(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<MemberListResponse>, AppError> {
    let members = state
        .services
        .projects
        .members(user.user_id, project_id)
        .await?;
    Ok(Json(MemberListResponse { members }))
}

async fn add_member(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(project_id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<AddMemberRequest>,
) -> Result<(StatusCode, Json<Membership>), AppError> {
    let membership = state
        .services
        .projects
        .add_member(user.user_id, project_id, body.user_id, body.role)
        .await?;
    Ok((StatusCode::CREATED, Json(membership)))
}

async fn remove_member(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((project_id, member_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    state
        .services
        .projects
        .remove_member(user.user_id, project_id, member_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
