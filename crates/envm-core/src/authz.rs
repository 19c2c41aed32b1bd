//! Role-based authorization over organization and project scopes.
//!
//! A user's access to a scope is a single [`Membership`] row holding one
//! [`Role`]. Roles form a strict hierarchy, `owner ⊇ admin ⊇ member`, and
//! every check goes through [`Role::satisfies`]. Organization and project
//! checks share one implementation, [`Authorizer`], parameterised by a
//! [`Scope`] marker type.
//!
//! Project access always requires membership of the project's organization.
//! Org owners and admins manage every project of their organization with
//! their org role; plain org members need their own project membership.
//!
//! [`Membership`]: crate::models::Membership

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthzError;
use crate::repository::{Memberships, Repository};

/// A member's role within one organization or project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Member,
}

impl Role {
    /// Wire/storage name of the role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::Owner => 3,
            Self::Admin => 2,
            Self::Member => 1,
        }
    }

    /// The more privileged of two roles.
    #[must_use]
    pub fn higher(self, other: Role) -> Role {
        if other.rank() > self.rank() { other } else { self }
    }

    /// Whether holding `self` grants at least one of `required`.
    ///
    /// An exact match always passes. Otherwise a higher role covers every
    /// lower one: owner satisfies admin and member, admin satisfies member.
    /// An empty requirement is never satisfied.
    #[must_use]
    pub fn satisfies(self, required: &[Role]) -> bool {
        required.iter().any(|r| self.rank() >= r.rank())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown role name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role '{0}', expected owner, admin, or member")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "owner" => Ok(Self::Owner),
            "admin" => Ok(Self::Admin),
            "member" => Ok(Self::Member),
            other => Err(UnknownRole(other.to_owned())),
        }
    }
}

/// Which kind of resource a membership grants access to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    Organization,
    Project,
}

impl ScopeKind {
    /// Short name used in storage keys.
    #[must_use]
    pub fn key_segment(self) -> &'static str {
        match self {
            Self::Organization => "org",
            Self::Project => "project",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Organization => "organization",
            Self::Project => "project",
        })
    }
}

/// Marker trait tying a type to a [`ScopeKind`].
pub trait Scope: Send + Sync + 'static {
    const KIND: ScopeKind;
}

/// Organization scope marker.
#[derive(Debug, Clone, Copy)]
pub struct OrgScope;

impl Scope for OrgScope {
    const KIND: ScopeKind = ScopeKind::Organization;
}

/// Project scope marker.
#[derive(Debug, Clone, Copy)]
pub struct ProjectScope;

impl Scope for ProjectScope {
    const KIND: ScopeKind = ScopeKind::Project;
}

/// Role requirements for each class of operation.
pub mod policy {
    use super::Role;

    /// Reading any resource in the scope.
    pub const READ: &[Role] = &[Role::Member];
    /// Creating, updating, or deleting environments, variables, and
    /// projects, and changing memberships.
    pub const MANAGE: &[Role] = &[Role::Admin];
    /// Deleting the organization itself.
    pub const OWNER: &[Role] = &[Role::Owner];
}

/// Effective project role given the user's org role and own project role.
fn inherited_project_role(org: Option<Role>, own: Option<Role>) -> Option<Role> {
    let org = org?;
    if org.satisfies(policy::MANAGE) {
        Some(own.map_or(org, |own| own.higher(org)))
    } else {
        own
    }
}

/// Answers "may user U act on scope S with one of these roles?".
pub struct Authorizer<S: Scope> {
    repo: Repository,
    memberships: Memberships<S>,
}

impl<S: Scope> Clone for Authorizer<S> {
    fn clone(&self) -> Self {
        Self::new(self.repo.clone())
    }
}

impl<S: Scope> fmt::Debug for Authorizer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorizer")
            .field("scope", &S::KIND)
            .finish_non_exhaustive()
    }
}

impl<S: Scope> Authorizer<S> {
    #[must_use]
    pub fn new(repo: Repository) -> Self {
        Self {
            memberships: Memberships::new(repo.clone()),
            repo,
        }
    }

    /// The role `user_id` effectively holds in `scope_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`AuthzError::Repository`] if a lookup fails.
    pub async fn role_of(&self, user_id: Uuid, scope_id: Uuid) -> Result<Option<Role>, AuthzError> {
        let own = self
            .memberships
            .get(scope_id, user_id)
            .await?
            .map(|m| m.role);

        match S::KIND {
            ScopeKind::Organization => Ok(own),
            ScopeKind::Project => {
                let Some(project) = self.repo.project(scope_id).await? else {
                    return Ok(None);
                };
                let org = Memberships::<OrgScope>::new(self.repo.clone())
                    .get(project.organization_id, user_id)
                    .await?
                    .map(|m| m.role);
                Ok(inherited_project_role(org, own))
            }
        }
    }

    /// Require that `user_id` holds a role in `scope_id` satisfying
    /// `required`, returning the role actually held.
    ///
    /// # Errors
    ///
    /// - [`AuthzError::NotAMember`] if the user has no membership, or for a
    ///   project, no longer belongs to its organization.
    /// - [`AuthzError::Insufficient`] if the role is too low.
    /// - [`AuthzError::Repository`] if the lookup fails.
    pub async fn authorize(
        &self,
        user_id: Uuid,
        scope_id: Uuid,
        required: &[Role],
    ) -> Result<Role, AuthzError> {
        let role = self
            .role_of(user_id, scope_id)
            .await?
            .ok_or(AuthzError::NotAMember { scope: S::KIND })?;

        if role.satisfies(required) {
            Ok(role)
        } else {
            Err(AuthzError::Insufficient {
                required: required.to_vec(),
                actual: role,
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use envm_storage::MemoryBackend;

    use super::*;
    use crate::models::{Membership, Project};

    #[test]
    fn exact_match_satisfies() {
        assert!(Role::Member.satisfies(&[Role::Member]));
        assert!(Role::Admin.satisfies(&[Role::Admin]));
        assert!(Role::Owner.satisfies(&[Role::Owner]));
    }

    #[test]
    fn higher_roles_cover_lower_ones() {
        assert!(Role::Owner.satisfies(&[Role::Admin]));
        assert!(Role::Owner.satisfies(&[Role::Member]));
        assert!(Role::Admin.satisfies(&[Role::Member]));
    }

    #[test]
    fn lower_roles_never_cover_higher_ones() {
        assert!(!Role::Admin.satisfies(&[Role::Owner]));
        assert!(!Role::Member.satisfies(&[Role::Admin]));
        assert!(!Role::Member.satisfies(&[Role::Owner]));
    }

    #[test]
    fn any_of_several_requirements_is_enough() {
        assert!(Role::Member.satisfies(&[Role::Owner, Role::Member]));
        assert!(!Role::Owner.satisfies(&[]));
    }

    #[test]
    fn project_role_requires_org_membership() {
        assert_eq!(inherited_project_role(None, Some(Role::Owner)), None);
        assert_eq!(
            inherited_project_role(Some(Role::Member), Some(Role::Admin)),
            Some(Role::Admin)
        );
        assert_eq!(inherited_project_role(Some(Role::Member), None), None);
    }

    #[test]
    fn org_admins_inherit_at_least_their_org_role() {
        assert_eq!(
            inherited_project_role(Some(Role::Admin), None),
            Some(Role::Admin)
        );
        assert_eq!(
            inherited_project_role(Some(Role::Admin), Some(Role::Owner)),
            Some(Role::Owner)
        );
        assert_eq!(
            inherited_project_role(Some(Role::Owner), Some(Role::Member)),
            Some(Role::Owner)
        );
    }

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert!("superuser".parse::<Role>().is_err());
    }

    async fn seed(repo: &Repository, kind: ScopeKind, scope_id: Uuid, user_id: Uuid, role: Role) {
        let mut batch = repo.batch();
        batch
            .insert_membership(&Membership {
                scope: kind,
                scope_id,
                user_id,
                role,
                created_at: Utc::now(),
            })
            .unwrap();
        repo.commit(batch).await.unwrap();
    }

    #[tokio::test]
    async fn authorize_reports_missing_membership() {
        let repo = Repository::new(Arc::new(MemoryBackend::new()));
        let authz = Authorizer::<OrgScope>::new(repo);

        let err = authz
            .authorize(Uuid::new_v4(), Uuid::new_v4(), policy::READ)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthzError::NotAMember {
                scope: ScopeKind::Organization
            }
        ));
    }

    #[tokio::test]
    async fn authorize_reports_insufficient_role() {
        let repo = Repository::new(Arc::new(MemoryBackend::new()));
        let (org, user) = (Uuid::new_v4(), Uuid::new_v4());
        seed(&repo, ScopeKind::Organization, org, user, Role::Admin).await;

        let authz = Authorizer::<OrgScope>::new(repo);
        assert_eq!(
            authz.authorize(user, org, policy::MANAGE).await.unwrap(),
            Role::Admin
        );

        let err = authz.authorize(user, org, policy::OWNER).await.unwrap_err();
        assert!(matches!(
            err,
            AuthzError::Insufficient {
                actual: Role::Admin,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn project_access_follows_org_membership() {
        let repo = Repository::new(Arc::new(MemoryBackend::new()));
        let (org, dev, admin) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4(),
            organization_id: org,
            name: "Web".to_owned(),
            slug: "web".to_owned(),
            description: None,
            created_at: now,
            updated_at: now,
        };
        let mut batch = repo.batch();
        batch.insert_project(&project).unwrap();
        repo.commit(batch).await.unwrap();
        seed(&repo, ScopeKind::Organization, org, admin, Role::Admin).await;
        seed(&repo, ScopeKind::Project, project.id, dev, Role::Member).await;

        let authz = Authorizer::<ProjectScope>::new(repo.clone());
        // A project membership alone is not enough.
        assert!(matches!(
            authz.authorize(dev, project.id, policy::READ).await,
            Err(AuthzError::NotAMember { .. })
        ));

        seed(&repo, ScopeKind::Organization, org, dev, Role::Member).await;
        assert_eq!(
            authz.authorize(dev, project.id, policy::READ).await.unwrap(),
            Role::Member
        );
        assert_eq!(
            authz.authorize(admin, project.id, policy::MANAGE).await.unwrap(),
            Role::Admin
        );
    }

    #[tokio::test]
    async fn scopes_are_independent() {
        let repo = Repository::new(Arc::new(MemoryBackend::new()));
        let (id, user) = (Uuid::new_v4(), Uuid::new_v4());
        seed(&repo, ScopeKind::Organization, id, user, Role::Owner).await;

        let projects = Authorizer::<ProjectScope>::new(repo);
        assert!(matches!(
            projects.authorize(user, id, policy::READ).await,
            Err(AuthzError::NotAMember {
                scope: ScopeKind::Project
            })
        ));
    }
}
