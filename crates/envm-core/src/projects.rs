//! Projects inside an organization, each with its own member list.
//!
//! Creating a project needs an org admin. Org owners and admins then manage
//! every project of the organization; plain org members see and use only
//! the projects they were added to.

use std::fmt;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::authz::{Authorizer, OrgScope, ProjectScope, Role, ScopeKind, policy};
use crate::environments::stage_environment_removal;
use crate::error::{RepositoryError, ServiceError};
use crate::members::MemberDirectory;
use crate::models::{Member, Membership, Project};
use crate::naming;
use crate::repository::{Batch, Memberships, Repository};

/// Input for [`ProjectService::create`].
#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
}

/// Partial update for [`ProjectService::update`].
#[derive(Debug, Clone, Default)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub slug: Option<String>,
    /// `Some("")` clears the description.
    pub description: Option<String>,
}

fn clean_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_owned())
        .filter(|d| !d.is_empty())
}

fn slug_conflict(slug: &str) -> impl FnOnce(RepositoryError) -> ServiceError + '_ {
    move |err| match err {
        RepositoryError::Conflict { .. } => ServiceError::Conflict {
            reason: format!("project slug '{slug}' is already used in this organization"),
        },
        other => other.into(),
    }
}

/// Stage deletion of a project with its environments, variables, and
/// memberships.
pub(crate) async fn stage_project_removal(
    repo: &Repository,
    batch: &mut Batch,
    project: &Project,
) -> Result<(), RepositoryError> {
    for env in repo.environments_of(project.id).await? {
        stage_environment_removal(repo, batch, &env).await?;
    }
    let memberships = Memberships::<ProjectScope>::new(repo.clone());
    for membership in memberships.of_scope(project.id).await? {
        batch.delete_membership(ScopeKind::Project, project.id, membership.user_id);
    }
    batch.delete_project(project);
    Ok(())
}

/// Project lifecycle with authorization enforced on every call.
#[derive(Clone)]
pub struct ProjectService {
    repo: Repository,
    org_authz: Authorizer<OrgScope>,
    members: MemberDirectory<ProjectScope>,
    memberships: Memberships<ProjectScope>,
}

impl fmt::Debug for ProjectService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectService").finish_non_exhaustive()
    }
}

impl ProjectService {
    #[must_use]
    pub fn new(repo: Repository) -> Self {
        Self {
            org_authz: Authorizer::new(repo.clone()),
            members: MemberDirectory::new(repo.clone()),
            memberships: Memberships::new(repo.clone()),
            repo,
        }
    }

    async fn require(&self, project_id: Uuid) -> Result<Project, ServiceError> {
        self.repo
            .project(project_id)
            .await?
            .ok_or(ServiceError::NotFound { resource: "project" })
    }

    async fn require_org(&self, org_id: Uuid) -> Result<(), ServiceError> {
        match self.repo.organization(org_id).await? {
            Some(_) => Ok(()),
            None => Err(ServiceError::NotFound {
                resource: "organization",
            }),
        }
    }

    /// Create a project in `org_id` with `actor` as its owner.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::NotFound`] if the organization does not exist.
    /// - [`ServiceError::Authz`] unless `actor` is an org admin.
    /// - [`ServiceError::InvalidInput`] for a bad name or slug.
    /// - [`ServiceError::Conflict`] if the slug is taken in the organization.
    pub async fn create(&self, actor: Uuid, org_id: Uuid, input: NewProject) -> Result<Project, ServiceError> {
        self.require_org(org_id).await?;
        self.org_authz.authorize(actor, org_id, policy::MANAGE).await?;

        let name = naming::clean_name(&input.name)?;
        let slug = naming::resolve_slug(input.slug.as_deref(), &name)?;
        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4(),
            organization_id: org_id,
            name,
            slug,
            description: clean_description(input.description),
            created_at: now,
            updated_at: now,
        };
        let owner = Membership {
            scope: ScopeKind::Project,
            scope_id: project.id,
            user_id: actor,
            role: Role::Owner,
            created_at: now,
        };

        let mut batch = self.repo.batch();
        batch.insert_project(&project)?;
        batch.insert_membership(&owner)?;
        self.repo
            .commit(batch)
            .await
            .map_err(slug_conflict(&project.slug))?;

        info!(project_id = %project.id, %org_id, owner = %actor, "project created");
        Ok(project)
    }

    /// Projects of one organization, sorted by name.
    ///
    /// Org admins see every project; plain members see the ones they belong to.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::NotFound`] if the organization does not exist.
    /// - [`ServiceError::Authz`] unless `actor` is an org member.
    pub async fn list(&self, actor: Uuid, org_id: Uuid) -> Result<Vec<Project>, ServiceError> {
        self.require_org(org_id).await?;
        let role = self.org_authz.authorize(actor, org_id, policy::READ).await?;

        let mut projects = self.repo.projects_of(org_id).await?;
        if !role.satisfies(policy::MANAGE) {
            let mine = self.memberships.scope_ids_of(actor).await?;
            projects.retain(|p| mine.contains(&p.id));
        }
        projects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(projects)
    }

    /// Projects `actor` is a member of, across organizations.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Repository`] if storage fails.
    pub async fn list_mine(&self, actor: Uuid) -> Result<Vec<Project>, ServiceError> {
        let ids = self.memberships.scope_ids_of(actor).await?;
        let mut projects = self.repo.projects(ids).await?;
        projects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(projects)
    }

    /// # Errors
    ///
    /// - [`ServiceError::NotFound`] if the project does not exist.
    /// - [`ServiceError::Authz`] unless `actor` is a project member or org admin.
    pub async fn get(&self, actor: Uuid, project_id: Uuid) -> Result<Project, ServiceError> {
        let project = self.require(project_id).await?;
        self.members
            .authorizer()
            .authorize(actor, project_id, policy::READ)
            .await?;
        Ok(project)
    }

    /// # Errors
    ///
    /// - [`ServiceError::NotFound`] if the project does not exist.
    /// - [`ServiceError::Authz`] unless `actor` is a project or org admin.
    /// - [`ServiceError::Conflict`] if the new slug is taken.
    pub async fn update(
        &self,
        actor: Uuid,
        project_id: Uuid,
        update: ProjectUpdate,
    ) -> Result<Project, ServiceError> {
        let current = self.require(project_id).await?;
        self.members
            .authorizer()
            .authorize(actor, project_id, policy::MANAGE)
            .await?;

        let mut updated = current.clone();
        if let Some(name) = update.name {
            updated.name = naming::clean_name(&name)?;
        }
        if let Some(slug) = update.slug {
            naming::check_slug(&slug)?;
            updated.slug = slug;
        }
        if update.description.is_some() {
            updated.description = clean_description(update.description);
        }
        if updated == current {
            return Ok(current);
        }
        updated.updated_at = Utc::now();

        let mut batch = self.repo.batch();
        batch.update_project(&current, &updated)?;
        self.repo
            .commit(batch)
            .await
            .map_err(slug_conflict(&updated.slug))?;

        info!(%project_id, by = %actor, "project updated");
        Ok(updated)
    }

    /// Delete the project with its environments and variables.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::NotFound`] if the project does not exist.
    /// - [`ServiceError::Authz`] unless `actor` is a project or org admin.
    pub async fn delete(&self, actor: Uuid, project_id: Uuid) -> Result<(), ServiceError> {
        let project = self.require(project_id).await?;
        self.members
            .authorizer()
            .authorize(actor, project_id, policy::MANAGE)
            .await?;

        let mut batch = self.repo.batch();
        stage_project_removal(&self.repo, &mut batch, &project).await?;
        self.repo.commit(batch).await?;

        info!(%project_id, by = %actor, "project deleted");
        Ok(())
    }

    /// # Errors
    ///
    /// - [`ServiceError::NotFound`] if the project does not exist.
    /// - [`ServiceError::Authz`] unless `actor` is a project member.
    pub async fn members(&self, actor: Uuid, project_id: Uuid) -> Result<Vec<Member>, ServiceError> {
        self.require(project_id).await?;
        self.members.list(actor, project_id).await
    }

    /// # Errors
    ///
    /// See [`MemberDirectory::add`].
    pub async fn add_member(
        &self,
        actor: Uuid,
        project_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<Membership, ServiceError> {
        self.require(project_id).await?;
        self.members.add(actor, project_id, user_id, role).await
    }

    /// # Errors
    ///
    /// See [`MemberDirectory::remove`].
    pub async fn remove_member(&self, actor: Uuid, project_id: Uuid, user_id: Uuid) -> Result<(), ServiceError> {
        self.require(project_id).await?;
        self.members.remove(actor, project_id, user_id).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::AuthzError;
    use crate::services::testing::{Harness, register};

    fn named(name: &str) -> NewProject {
        NewProject {
            name: name.to_owned(),
            slug: None,
            description: None,
        }
    }

    #[tokio::test]
    async fn org_admin_creates_and_owns_project() {
        let h = Harness::new();
        let owner = register(&h, "owner@example.com").await;
        let org = h.org(owner, "Acme").await;

        let project = h.projects.create(owner, org.id, named("Web API")).await.unwrap();
        assert_eq!(project.slug, "web-api");
        assert_eq!(h.projects.list_mine(owner).await.unwrap(), vec![project.clone()]);

        let members = h.projects.members(owner, project.id).await.unwrap();
        assert_eq!(members[0].role, Role::Owner);
    }

    #[tokio::test]
    async fn org_member_cannot_create_project() {
        let h = Harness::new();
        let owner = register(&h, "owner@example.com").await;
        let dev = register(&h, "dev@example.com").await;
        let org = h.org(owner, "Acme").await;
        h.orgs.add_member(owner, org.id, dev, Role::Member).await.unwrap();

        assert!(matches!(
            h.projects.create(dev, org.id, named("Web")).await,
            Err(ServiceError::Authz(AuthzError::Insufficient { .. }))
        ));
        // Listing only needs org membership.
        assert!(h.projects.list(dev, org.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn org_admin_manages_every_project() {
        let h = Harness::new();
        let owner = register(&h, "owner@example.com").await;
        let admin = register(&h, "admin@example.com").await;
        let org = h.org(owner, "Acme").await;
        h.orgs.add_member(owner, org.id, admin, Role::Admin).await.unwrap();
        let project = h.projects.create(owner, org.id, named("Web")).await.unwrap();

        assert_eq!(h.projects.get(admin, project.id).await.unwrap().id, project.id);
        assert_eq!(h.projects.list(admin, org.id).await.unwrap().len(), 1);
        assert!(h.projects.members(admin, project.id).await.is_ok());
        h.projects.delete(admin, project.id).await.unwrap();
        assert!(h.repo.project(project.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn plain_org_member_sees_only_their_projects() {
        let h = Harness::new();
        let owner = register(&h, "owner@example.com").await;
        let dev = register(&h, "dev@example.com").await;
        let org = h.org(owner, "Acme").await;
        h.orgs.add_member(owner, org.id, dev, Role::Member).await.unwrap();
        let web = h.projects.create(owner, org.id, named("Web")).await.unwrap();
        h.projects.create(owner, org.id, named("Billing")).await.unwrap();

        assert!(matches!(
            h.projects.get(dev, web.id).await,
            Err(ServiceError::Authz(AuthzError::NotAMember { .. }))
        ));
        assert!(h.projects.list(dev, org.id).await.unwrap().is_empty());

        h.projects
            .add_member(owner, web.id, dev, Role::Member)
            .await
            .unwrap();
        assert!(h.projects.get(dev, web.id).await.is_ok());
        assert_eq!(h.projects.list(dev, org.id).await.unwrap(), vec![web.clone()]);
        assert!(h.projects.delete(dev, web.id).await.is_err());
    }

    #[tokio::test]
    async fn project_members_must_belong_to_the_org() {
        let h = Harness::new();
        let owner = register(&h, "owner@example.com").await;
        let outsider = register(&h, "outsider@example.com").await;
        let org = h.org(owner, "Acme").await;
        let project = h.projects.create(owner, org.id, named("Web")).await.unwrap();

        assert!(matches!(
            h.projects
                .add_member(owner, project.id, outsider, Role::Member)
                .await,
            Err(ServiceError::InvalidInput { .. })
        ));
        assert_eq!(h.projects.members(owner, project.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn slugs_are_unique_per_organization_only() {
        let h = Harness::new();
        let owner = register(&h, "owner@example.com").await;
        let acme = h.org(owner, "Acme").await;
        let globex = h.org(owner, "Globex").await;

        h.projects.create(owner, acme.id, named("Web")).await.unwrap();
        assert!(matches!(
            h.projects.create(owner, acme.id, named("Web")).await,
            Err(ServiceError::Conflict { .. })
        ));
        assert!(h.projects.create(owner, globex.id, named("Web")).await.is_ok());
    }

    #[tokio::test]
    async fn update_renames_and_clears_description() {
        let h = Harness::new();
        let owner = register(&h, "owner@example.com").await;
        let org = h.org(owner, "Acme").await;
        let mut input = named("Web");
        input.description = Some("frontend".to_owned());
        let project = h.projects.create(owner, org.id, input).await.unwrap();

        let updated = h
            .projects
            .update(
                owner,
                project.id,
                ProjectUpdate {
                    name: Some("Website".to_owned()),
                    slug: Some("website".to_owned()),
                    description: Some(String::new()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.slug, "website");
        assert_eq!(updated.description, None);

        // The old slug is free again.
        assert!(h.projects.create(owner, org.id, named("Web")).await.is_ok());
    }

    #[tokio::test]
    async fn delete_removes_environments_and_memberships() {
        let h = Harness::new();
        let owner = register(&h, "owner@example.com").await;
        let org = h.org(owner, "Acme").await;
        let project = h.projects.create(owner, org.id, named("Web")).await.unwrap();
        let env = h.env(owner, project.id, "production").await;
        h.environments
            .create_variable(owner, env.id, "API_KEY", "secret", None)
            .await
            .unwrap();

        h.projects.delete(owner, project.id).await.unwrap();

        assert!(h.projects.list_mine(owner).await.unwrap().is_empty());
        assert!(h.repo.environment(env.id).await.unwrap().is_none());
        assert!(h.repo.variables_of(env.id).await.unwrap().is_empty());
    }
}
