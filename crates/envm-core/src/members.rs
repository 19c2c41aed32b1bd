//! Membership management shared by organizations and projects.

use std::fmt;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::authz::{Authorizer, OrgScope, ProjectScope, Role, Scope, ScopeKind, policy};
use crate::error::{AuthzError, RepositoryError, ServiceError};
use crate::models::{Member, Membership};
use crate::repository::{Batch, Memberships, Repository};

/// Lists, adds, and removes members of one scope kind.
///
/// Rules on top of the role policy:
/// - granting or revoking `owner` requires being an owner;
/// - any member may remove themselves;
/// - the last owner cannot be removed;
/// - project members must belong to the project's organization, and
///   leaving an organization drops its project memberships too.
pub struct MemberDirectory<S: Scope> {
    repo: Repository,
    authz: Authorizer<S>,
    memberships: Memberships<S>,
}

impl<S: Scope> Clone for MemberDirectory<S> {
    fn clone(&self) -> Self {
        Self::new(self.repo.clone())
    }
}

impl<S: Scope> fmt::Debug for MemberDirectory<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberDirectory")
            .field("scope", &S::KIND)
            .finish_non_exhaustive()
    }
}

impl<S: Scope> MemberDirectory<S> {
    #[must_use]
    pub fn new(repo: Repository) -> Self {
        Self {
            authz: Authorizer::new(repo.clone()),
            memberships: Memberships::new(repo.clone()),
            repo,
        }
    }

    /// The authorizer for this scope kind.
    #[must_use]
    pub fn authorizer(&self) -> &Authorizer<S> {
        &self.authz
    }

    /// # Errors
    ///
    /// Returns [`ServiceError::Authz`] unless `actor` is a member.
    pub async fn list(&self, actor: Uuid, scope_id: Uuid) -> Result<Vec<Member>, ServiceError> {
        self.authz.authorize(actor, scope_id, policy::READ).await?;

        let mut members = Vec::new();
        for membership in self.memberships.of_scope(scope_id).await? {
            // Memberships of deleted users are skipped rather than failing the listing.
            if let Some(user) = self.repo.user(membership.user_id).await? {
                members.push(Member {
                    user_id: user.id,
                    email: user.email,
                    full_name: user.full_name,
                    role: membership.role,
                    joined_at: membership.created_at,
                });
            }
        }
        members.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(members)
    }

    /// Grant `user_id` a role in the scope.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Authz`] if `actor` may not grant `role`.
    /// - [`ServiceError::NotFound`] if the user does not exist.
    /// - [`ServiceError::Conflict`] if the user is already a member.
    pub async fn add(
        &self,
        actor: Uuid,
        scope_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<Membership, ServiceError> {
        let actor_role = self.authz.authorize(actor, scope_id, policy::MANAGE).await?;
        require_owner_for(role, actor_role)?;

        if self.repo.user(user_id).await?.is_none() {
            return Err(ServiceError::NotFound { resource: "user" });
        }

        let membership = Membership {
            scope: S::KIND,
            scope_id,
            user_id,
            role,
            created_at: Utc::now(),
        };
        let mut batch = self.repo.batch();
        if S::KIND == ScopeKind::Project {
            self.stage_org_requirement(&mut batch, scope_id, user_id).await?;
        }
        batch.insert_membership(&membership)?;
        self.repo.commit(batch).await.map_err(|e| match e {
            RepositoryError::Conflict { .. } => ServiceError::Conflict {
                reason: format!("user is already a member of this {}", S::KIND),
            },
            RepositoryError::Stale { .. } => ServiceError::InvalidInput {
                reason: "user is not a member of the project's organization".to_owned(),
            },
            other => other.into(),
        })?;

        info!(scope = %S::KIND, %scope_id, %user_id, %role, by = %actor, "member added");
        Ok(membership)
    }

    /// Revoke `user_id`'s membership.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Authz`] if `actor` may not remove this member.
    /// - [`ServiceError::NotFound`] if there is no such membership.
    /// - [`ServiceError::Conflict`] if it is the last owner.
    pub async fn remove(&self, actor: Uuid, scope_id: Uuid, user_id: Uuid) -> Result<(), ServiceError> {
        let leaving = actor == user_id;
        let required = if leaving { policy::READ } else { policy::MANAGE };
        let actor_role = self.authz.authorize(actor, scope_id, required).await?;

        let target = self
            .memberships
            .get(scope_id, user_id)
            .await?
            .ok_or(ServiceError::NotFound {
                resource: "membership",
            })?;

        let mut batch = self.repo.batch();
        if target.role == Role::Owner {
            if !leaving {
                require_owner_for(Role::Owner, actor_role)?;
            }
            // Another owner must still exist when the removal commits.
            let other_owner = self
                .memberships
                .of_scope(scope_id)
                .await?
                .into_iter()
                .find(|m| m.role == Role::Owner && m.user_id != user_id)
                .ok_or_else(|| last_owner(S::KIND))?;
            batch.guard_membership(S::KIND, scope_id, other_owner.user_id);
        }

        batch.delete_membership(S::KIND, scope_id, user_id);
        let projects_left = if S::KIND == ScopeKind::Organization {
            stage_project_departures(&self.repo, &mut batch, scope_id, user_id).await?
        } else {
            0
        };
        self.repo.commit(batch).await.map_err(|e| match e {
            RepositoryError::Stale { .. } => last_owner(S::KIND),
            other => other.into(),
        })?;

        info!(
            scope = %S::KIND,
            %scope_id,
            %user_id,
            projects_left,
            by = %actor,
            "member removed"
        );
        Ok(())
    }
}

impl<S: Scope> MemberDirectory<S> {
    /// Require `user_id` to belong to the organization owning `project_id`,
    /// and keep that true until the batch commits.
    async fn stage_org_requirement(
        &self,
        batch: &mut Batch,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), ServiceError> {
        let project = self
            .repo
            .project(project_id)
            .await?
            .ok_or(ServiceError::NotFound { resource: "project" })?;
        let org_member = Memberships::<OrgScope>::new(self.repo.clone())
            .get(project.organization_id, user_id)
            .await?;
        if org_member.is_none() {
            return Err(ServiceError::InvalidInput {
                reason: "user is not a member of the project's organization".to_owned(),
            });
        }
        batch.guard_membership(ScopeKind::Organization, project.organization_id, user_id);
        Ok(())
    }
}

fn last_owner(scope: ScopeKind) -> ServiceError {
    ServiceError::Conflict {
        reason: format!("cannot remove the last owner of this {scope}"),
    }
}

/// Stage removal of `user_id` from every project of `org_id`.
pub(crate) async fn stage_project_departures(
    repo: &Repository,
    batch: &mut Batch,
    org_id: Uuid,
    user_id: Uuid,
) -> Result<usize, RepositoryError> {
    let memberships = Memberships::<ProjectScope>::new(repo.clone());
    let mut departed = 0;
    for project in repo.projects_of(org_id).await? {
        if memberships.get(project.id, user_id).await?.is_some() {
            batch.delete_membership(ScopeKind::Project, project.id, user_id);
            departed += 1;
        }
    }
    Ok(departed)
}

/// Only owners may hand out or take away the owner role.
pub(crate) fn require_owner_for(role: Role, actor_role: Role) -> Result<(), AuthzError> {
    if role == Role::Owner && !actor_role.satisfies(policy::OWNER) {
        return Err(AuthzError::Insufficient {
            required: policy::OWNER.to_vec(),
            actual: actor_role,
        });
    }
    Ok(())
}
