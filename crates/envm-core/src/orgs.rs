//! Organizations: creation with an owner, updates, cascading deletion,
//! membership, and invitations.

use std::fmt;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::authz::{OrgScope, Role, ScopeKind, policy};
use crate::error::{RepositoryError, ServiceError};
use crate::members::{MemberDirectory, require_owner_for};
use crate::models::{Invitation, Member, Membership, Organization};
use crate::naming;
use crate::projects::stage_project_removal;
use crate::repository::{Memberships, Repository};
use crate::session::SessionManager;

/// Input for [`OrgService::create`].
#[derive(Debug, Clone)]
pub struct NewOrganization {
    pub name: String,
    /// Derived from `name` when absent.
    pub slug: Option<String>,
}

/// Partial update for [`OrgService::update`].
#[derive(Debug, Clone, Default)]
pub struct OrganizationUpdate {
    pub name: Option<String>,
    pub slug: Option<String>,
}

fn slug_conflict(slug: &str) -> impl FnOnce(RepositoryError) -> ServiceError + '_ {
    move |err| match err {
        RepositoryError::Conflict { .. } => ServiceError::Conflict {
            reason: format!("organization slug '{slug}' is already taken"),
        },
        other => other.into(),
    }
}

/// Organization lifecycle with authorization enforced on every call.
#[derive(Clone)]
pub struct OrgService {
    repo: Repository,
    members: MemberDirectory<OrgScope>,
    memberships: Memberships<OrgScope>,
    sessions: SessionManager,
}

impl fmt::Debug for OrgService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrgService").finish_non_exhaustive()
    }
}

impl OrgService {
    #[must_use]
    pub fn new(repo: Repository, sessions: SessionManager) -> Self {
        Self {
            members: MemberDirectory::new(repo.clone()),
            memberships: Memberships::new(repo.clone()),
            repo,
            sessions,
        }
    }

    async fn require(&self, org_id: Uuid) -> Result<Organization, ServiceError> {
        self.repo
            .organization(org_id)
            .await?
            .ok_or(ServiceError::NotFound {
                resource: "organization",
            })
    }

    /// Create an organization with `actor` as its owner in one commit.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::InvalidInput`] for a bad name or slug.
    /// - [`ServiceError::Conflict`] if the slug is taken.
    pub async fn create(&self, actor: Uuid, input: NewOrganization) -> Result<Organization, ServiceError> {
        let name = naming::clean_name(&input.name)?;
        let slug = naming::resolve_slug(input.slug.as_deref(), &name)?;
        let now = Utc::now();

        let org = Organization {
            id: Uuid::new_v4(),
            name,
            slug,
            created_at: now,
            updated_at: now,
        };
        let owner = Membership {
            scope: ScopeKind::Organization,
            scope_id: org.id,
            user_id: actor,
            role: Role::Owner,
            created_at: now,
        };

        let mut batch = self.repo.batch();
        batch.insert_organization(&org)?;
        batch.insert_membership(&owner)?;
        self.repo
            .commit(batch)
            .await
            .map_err(slug_conflict(&org.slug))?;

        info!(org_id = %org.id, owner = %actor, "organization created");
        Ok(org)
    }

    /// Organizations `actor` belongs to, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Repository`] if storage fails.
    pub async fn list(&self, actor: Uuid) -> Result<Vec<Organization>, ServiceError> {
        let ids = self.memberships.scope_ids_of(actor).await?;
        let mut orgs = self.repo.organizations(ids).await?;
        orgs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(orgs)
    }

    /// # Errors
    ///
    /// - [`ServiceError::NotFound`] if the organization does not exist.
    /// - [`ServiceError::Authz`] unless `actor` is a member.
    pub async fn get(&self, actor: Uuid, org_id: Uuid) -> Result<Organization, ServiceError> {
        let org = self.require(org_id).await?;
        self.members
            .authorizer()
            .authorize(actor, org_id, policy::READ)
            .await?;
        Ok(org)
    }

    /// # Errors
    ///
    /// - [`ServiceError::NotFound`] if the organization does not exist.
    /// - [`ServiceError::Authz`] unless `actor` is at least admin.
    /// - [`ServiceError::Conflict`] if the new slug is taken.
    pub async fn update(
        &self,
        actor: Uuid,
        org_id: Uuid,
        update: OrganizationUpdate,
    ) -> Result<Organization, ServiceError> {
        let current = self.require(org_id).await?;
        self.members
            .authorizer()
            .authorize(actor, org_id, policy::MANAGE)
            .await?;

        let mut updated = current.clone();
        if let Some(name) = update.name {
            updated.name = naming::clean_name(&name)?;
        }
        if let Some(slug) = update.slug {
            naming::check_slug(&slug)?;
            updated.slug = slug;
        }
        if updated == current {
            return Ok(current);
        }
        updated.updated_at = Utc::now();

        let mut batch = self.repo.batch();
        batch.update_organization(&current, &updated)?;
        self.repo
            .commit(batch)
            .await
            .map_err(slug_conflict(&updated.slug))?;

        info!(%org_id, by = %actor, "organization updated");
        Ok(updated)
    }

    /// Delete the organization with all of its projects, environments,
    /// variables, and memberships in one commit. Owner only.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::NotFound`] if the organization does not exist.
    /// - [`ServiceError::Authz`] unless `actor` is an owner.
    pub async fn delete(&self, actor: Uuid, org_id: Uuid) -> Result<(), ServiceError> {
        let org = self.require(org_id).await?;
        self.members
            .authorizer()
            .authorize(actor, org_id, policy::OWNER)
            .await?;

        let mut batch = self.repo.batch();
        let projects = self.repo.projects_of(org_id).await?;
        for project in &projects {
            stage_project_removal(&self.repo, &mut batch, project).await?;
        }
        for membership in self.memberships.of_scope(org_id).await? {
            batch.delete_membership(ScopeKind::Organization, org_id, membership.user_id);
        }
        batch.delete_organization(&org);
        self.repo.commit(batch).await?;

        info!(%org_id, by = %actor, projects = projects.len(), "organization deleted");
        Ok(())
    }

    /// # Errors
    ///
    /// - [`ServiceError::NotFound`] if the organization does not exist.
    /// - [`ServiceError::Authz`] unless `actor` is a member.
    pub async fn members(&self, actor: Uuid, org_id: Uuid) -> Result<Vec<Member>, ServiceError> {
        self.require(org_id).await?;
        self.members.list(actor, org_id).await
    }

    /// # Errors
    ///
    /// See [`MemberDirectory::add`].
    pub async fn add_member(
        &self,
        actor: Uuid,
        org_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<Membership, ServiceError> {
        self.require(org_id).await?;
        self.members.add(actor, org_id, user_id, role).await
    }

    /// # Errors
    ///
    /// See [`MemberDirectory::remove`].
    pub async fn remove_member(&self, actor: Uuid, org_id: Uuid, user_id: Uuid) -> Result<(), ServiceError> {
        self.require(org_id).await?;
        self.members.remove(actor, org_id, user_id).await
    }

    /// Invite `email` to the organization with `role`.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::NotFound`] if the organization does not exist.
    /// - [`ServiceError::Authz`] unless `actor` is admin (owner to invite owners).
    /// - [`ServiceError::Session`] if persisting or sending the invitation fails.
    pub async fn invite(
        &self,
        actor: Uuid,
        org_id: Uuid,
        email: &str,
        role: Role,
    ) -> Result<Invitation, ServiceError> {
        let org = self.require(org_id).await?;
        let actor_role = self
            .members
            .authorizer()
            .authorize(actor, org_id, policy::MANAGE)
            .await?;
        require_owner_for(role, actor_role)?;

        Ok(self.sessions.create_invitation(&org, email, role, actor).await?)
    }

    /// Redeem an invitation token for `actor`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Session`] for unknown, expired, or redundant invitations.
    pub async fn accept_invitation(&self, actor: Uuid, token: &str) -> Result<Membership, ServiceError> {
        Ok(self.sessions.accept_invitation(token, actor).await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::{AuthzError, SessionError};
    use crate::services::testing::{Harness, register};

    #[tokio::test]
    async fn creator_becomes_owner() {
        let h = Harness::new();
        let alice = register(&h, "alice@example.com").await;

        let org = h
            .orgs
            .create(
                alice,
                NewOrganization {
                    name: "Acme Corp".to_owned(),
                    slug: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(org.slug, "acme-corp");

        let members = h.orgs.members(alice, org.id).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].role, Role::Owner);
        assert_eq!(h.orgs.list(alice).await.unwrap(), vec![org]);
    }

    #[tokio::test]
    async fn slug_collision_leaves_no_orphan_membership() {
        let h = Harness::new();
        let alice = register(&h, "alice@example.com").await;
        let bob = register(&h, "bob@example.com").await;
        let input = NewOrganization {
            name: "Acme".to_owned(),
            slug: Some("acme".to_owned()),
        };

        h.orgs.create(alice, input.clone()).await.unwrap();
        assert!(matches!(
            h.orgs.create(bob, input).await,
            Err(ServiceError::Conflict { .. })
        ));
        assert!(h.orgs.list(bob).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn admin_cannot_delete_organization() {
        let h = Harness::new();
        let owner = register(&h, "owner@example.com").await;
        let admin = register(&h, "admin@example.com").await;
        let org = h.org(owner, "Acme").await;
        h.orgs.add_member(owner, org.id, admin, Role::Admin).await.unwrap();

        let err = h.orgs.delete(admin, org.id).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Authz(AuthzError::Insufficient {
                actual: Role::Admin,
                ..
            })
        ));
        h.orgs.delete(owner, org.id).await.unwrap();
        assert!(matches!(
            h.orgs.get(owner, org.id).await,
            Err(ServiceError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn non_member_is_rejected() {
        let h = Harness::new();
        let owner = register(&h, "owner@example.com").await;
        let stranger = register(&h, "stranger@example.com").await;
        let org = h.org(owner, "Acme").await;

        assert!(matches!(
            h.orgs.get(stranger, org.id).await,
            Err(ServiceError::Authz(AuthzError::NotAMember { .. }))
        ));
    }

    #[tokio::test]
    async fn admin_cannot_grant_ownership() {
        let h = Harness::new();
        let owner = register(&h, "owner@example.com").await;
        let admin = register(&h, "admin@example.com").await;
        let carol = register(&h, "carol@example.com").await;
        let org = h.org(owner, "Acme").await;
        h.orgs.add_member(owner, org.id, admin, Role::Admin).await.unwrap();

        assert!(h.orgs.add_member(admin, org.id, carol, Role::Owner).await.is_err());
        assert!(h.orgs.add_member(admin, org.id, carol, Role::Member).await.is_ok());
        assert!(matches!(
            h.orgs.add_member(admin, org.id, carol, Role::Member).await,
            Err(ServiceError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn last_owner_cannot_leave() {
        let h = Harness::new();
        let owner = register(&h, "owner@example.com").await;
        let org = h.org(owner, "Acme").await;

        assert!(matches!(
            h.orgs.remove_member(owner, org.id, owner).await,
            Err(ServiceError::Conflict { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn owners_leaving_together_keep_one_owner() {
        let h = Harness::new();
        let alice = register(&h, "alice@example.com").await;
        let bob = register(&h, "bob@example.com").await;
        let org = h.org(alice, "Acme").await;
        h.orgs.add_member(alice, org.id, bob, Role::Owner).await.unwrap();

        let handles: Vec<_> = [alice, bob]
            .into_iter()
            .map(|user| {
                let orgs = h.orgs.clone();
                tokio::spawn(async move { orgs.remove_member(user, org.id, user).await })
            })
            .collect();
        for handle in handles {
            let _ = handle.await.unwrap();
        }

        let owners = Memberships::<OrgScope>::new(h.repo.clone())
            .of_scope(org.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|m| m.role == Role::Owner)
            .count();
        assert_eq!(owners, 1);
    }

    #[tokio::test]
    async fn member_may_leave() {
        let h = Harness::new();
        let owner = register(&h, "owner@example.com").await;
        let dev = register(&h, "dev@example.com").await;
        let org = h.org(owner, "Acme").await;
        h.orgs.add_member(owner, org.id, dev, Role::Member).await.unwrap();

        h.orgs.remove_member(dev, org.id, dev).await.unwrap();
        assert!(h.orgs.list(dev).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invitation_round_trip() {
        let h = Harness::new();
        let owner = register(&h, "owner@example.com").await;
        let invitee = register(&h, "new@example.com").await;
        let org = h.org(owner, "Acme").await;

        h.orgs
            .invite(owner, org.id, "new@example.com", Role::Admin)
            .await
            .unwrap();
        let token = h
            .notifier
            .last_to("new@example.com")
            .await
            .unwrap()
            .token()
            .to_owned();

        let membership = h.orgs.accept_invitation(invitee, &token).await.unwrap();
        assert_eq!(membership.role, Role::Admin);
        assert_eq!(h.orgs.get(invitee, org.id).await.unwrap().id, org.id);

        assert!(matches!(
            h.orgs.accept_invitation(invitee, &token).await,
            Err(ServiceError::Session(SessionError::InvalidOrExpired))
        ));
    }

    #[tokio::test]
    async fn member_cannot_invite() {
        let h = Harness::new();
        let owner = register(&h, "owner@example.com").await;
        let dev = register(&h, "dev@example.com").await;
        let org = h.org(owner, "Acme").await;
        h.orgs.add_member(owner, org.id, dev, Role::Member).await.unwrap();

        assert!(matches!(
            h.orgs.invite(dev, org.id, "x@example.com", Role::Member).await,
            Err(ServiceError::Authz(_))
        ));
        assert!(h.notifier.sent().await.is_empty());
    }
}
