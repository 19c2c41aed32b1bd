//! Organization routes.
//!
//! - `GET/POST          /api/v1/orgs`
//! - `GET/PUT/DELETE    /api/v1/orgs/{org_id}`
//! - `GET/POST          /api/v1/orgs/{org_id}/members`
//! - `DELETE            /api/v1/orgs/{org_id}/members/{user_id}`
//! - `POST              /api/v1/orgs/{org_id}/invitations`
//! - `POST              /api/v1/invitations/accept`

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use chrono::{DateTime, Utc};
use envm_core::authz::Role;
use envm_core::models::{Invitation, Member, Membership, Organization};
use envm_core::orgs::{NewOrganization, OrganizationUpdate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::state::AppState;
use crate::validate::ValidatedJson;

// ── Request / Response types ─────────────────────────────────────────

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrgRequest {
    #[validate(length(min = 1, max = 100, message = "must be 1-100 characters"))]
    pub name: String,
    #[validate(length(min = 1, max = 64, message = "must be 1-64 characters"))]
    pub slug: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateOrgRequest {
    #[validate(length(min = 1, max = 100, message = "must be 1-100 characters"))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 64, message = "must be 1-64 characters"))]
    pub slug: Option<String>,
}

fn default_role() -> Role {
    Role::Member
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
    #[serde(default = "default_role")]
    pub role: Role,
}

#[derive(Debug, Deserialize, Validate)]
pub struct InviteRequest {
    #[validate(email(message = "must be a valid email"))]
    pub email: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AcceptInvitationRequest {
    #[validate(length(min = 1, message = "is required"))]
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct OrgListResponse {
    pub organizations: Vec<Organization>,
}

#[derive(Debug, Serialize)]
pub struct MemberListResponse {
    pub members: Vec<Member>,
}

/// An invitation as shown to the inviter. The token only travels by notifier.
#[derive(Debug, Serialize)]
pub struct InvitationResponse {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub email: String,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

impl From<Invitation> for InvitationResponse {
    fn from(inv: Invitation) -> Self {
        Self {
            id: inv.id,
            organization_id: inv.organization_id,
            email: inv.email,
            role: inv.role,
            expires_at: inv.expires_at,
        }
    }
}

// ── Router ───────────────────────────────────────────────────────────

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orgs", get(list_orgs).post(create_org))
        .route(
            "/orgs/{org_id}",
            get(get_org).put(update_org).delete(delete_org),
        )
        .route("/orgs/{org_id}/members", get(list_members).post(add_member))
        .route("/orgs/{org_id}/members/{user_id}", delete(remove_member))
        .route("/orgs/{org_id}/invitations", post(invite))
        .route("/invitations/accept", post(accept_invitation))
}

// ── Handlers ─────────────────────────────────────────────────────────

async fn list_orgs(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<OrgListResponse>, AppError> {
    let organizations = state.services.orgs.list(user.user_id).await?;
    Ok(Json(OrgListResponse { organizations }))
}

async fn create_org(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    ValidatedJson(body): ValidatedJson<CreateOrgRequest>,
) -> Result<(StatusCode, Json<Organization>), AppError> {
    let org = state
        .services
        .orgs
        .create(
            user.user_id,
            NewOrganization {
                name: body.name,
                slug: body.slug,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(org)))
}

async fn get_org(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(org_id): Path<Uuid>,
) -> Result<Json<Organization>, AppError> {
    Ok(Json(state.services.orgs.get(user.user_id, org_id).await?))
}

async fn update_org(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(org_id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<UpdateOrgRequest>,
) -> Result<Json<Organization>, AppError> {
    let org = state
        .services
        .orgs
        .update(
            user.user_id,
            org_id,
            OrganizationUpdate {
                name: body.name,
                slug: body.slug,
            },
        )
        .await?;
    Ok(Json(org))
}

async fn delete_org(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(org_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.services.orgs.delete(user.user_id, org_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_members(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(org_id): Path<Uuid>,
) -> Result<Json<MemberListResponse>, AppError> {
    let members = state.services.orgs.members(user.user_id, org_id).await?;
    Ok(Json(MemberListResponse { members }))
}

async fn add_member(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(org_id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<AddMemberRequest>,
) -> Result<(StatusCode, Json<Membership>), AppError> {
    let membership = state
        .services
        .orgs
        .add_member(user.user_id, org_id, body.user_id, body.role)
        .await?;
    Ok((StatusCode::CREATED, Json(membership)))
}

async fn remove_member(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((org_id, member_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    state
        .services
        .orgs
        .remove_member(user.user_id, org_id, member_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn invite(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(org_id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<InviteRequest>,
) -> Result<(StatusCode, Json<InvitationResponse>), AppError> {
    let invitation = state
        .services
        .orgs
        .invite(user.user_id, org_id, &body.email, body.role)
        .await?;
    Ok((StatusCode::CREATED, Json(invitation.into())))
}

async fn accept_invitation(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    ValidatedJson(body): ValidatedJson<AcceptInvitationRequest>,
) -> Result<Json<Membership>, AppError> {
    let membership = state
        .services
        .orgs
        .accept_invitation(user.user_id, &body.token)
        .await?;
    Ok(Json(membership))
}
