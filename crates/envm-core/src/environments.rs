//! Environments and their encrypted variables.
//!
//! Every read returns plaintext through [`ValueCipher::reveal`]; a value
//! that fails to decrypt fails the whole call.

use std::fmt;

use chrono::Utc;
use tracing::{error, info};
use uuid::Uuid;

use crate::authz::{Authorizer, ProjectScope, Role, policy};
use crate::error::{RepositoryError, ServiceError};
use crate::models::{Environment, RevealedVariable, Variable};
use crate::naming;
use crate::repository::{Batch, Repository};
use crate::values::ValueCipher;

/// Input for [`EnvironmentService::create`].
#[derive(Debug, Clone)]
pub struct NewEnvironment {
    pub name: String,
    pub slug: Option<String>,
}

/// Partial update for [`EnvironmentService::update`].
#[derive(Debug, Clone, Default)]
pub struct EnvironmentUpdate {
    pub name: Option<String>,
    pub slug: Option<String>,
}

/// Partial update for [`EnvironmentService::update_variable`].
#[derive(Debug, Clone, Default)]
pub struct VariableUpdate {
    pub value: Option<String>,
    pub path: Option<String>,
}

/// Stage deletion of an environment and all of its variables.
pub(crate) async fn stage_environment_removal(
    repo: &Repository,
    batch: &mut Batch,
    env: &Environment,
) -> Result<(), RepositoryError> {
    for variable in repo.variables_of(env.id).await? {
        batch.delete_variable(env.id, &variable.key);
    }
    batch.delete_environment(env);
    Ok(())
}

fn slug_conflict(slug: &str) -> impl FnOnce(RepositoryError) -> ServiceError + '_ {
    move |err| match err {
        RepositoryError::Conflict { .. } => ServiceError::Conflict {
            reason: format!("environment slug '{slug}' is already used in this project"),
        },
        other => other.into(),
    }
}

/// Environment and variable management, gated on project membership.
#[derive(Clone)]
pub struct EnvironmentService {
    repo: Repository,
    authz: Authorizer<ProjectScope>,
    values: ValueCipher,
}

impl fmt::Debug for EnvironmentService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentService").finish_non_exhaustive()
    }
}

impl EnvironmentService {
    #[must_use]
    pub fn new(repo: Repository, values: ValueCipher) -> Self {
        Self {
            authz: Authorizer::new(repo.clone()),
            repo,
            values,
        }
    }

    async fn require_project(&self, project_id: Uuid) -> Result<(), ServiceError> {
        match self.repo.project(project_id).await? {
            Some(_) => Ok(()),
            None => Err(ServiceError::NotFound { resource: "project" }),
        }
    }

    /// Load the environment and check `actor`'s role on its project.
    async fn authorized_env(
        &self,
        actor: Uuid,
        env_id: Uuid,
        required: &[Role],
    ) -> Result<Environment, ServiceError> {
        let env = self
            .repo
            .environment(env_id)
            .await?
            .ok_or(ServiceError::NotFound {
                resource: "environment",
            })?;
        self.authz.authorize(actor, env.project_id, required).await?;
        Ok(env)
    }

    fn reveal(&self, variable: Variable) -> Result<RevealedVariable, ServiceError> {
        let value = self.values.reveal(&variable.value).inspect_err(|e| {
            error!(
                environment_id = %variable.environment_id,
                key = %variable.key,
                error = %e,
                "stored variable failed to decrypt"
            );
        })?;
        Ok(RevealedVariable {
            environment_id: variable.environment_id,
            key: variable.key,
            value,
            path: variable.path,
            created_at: variable.created_at,
            updated_at: variable.updated_at,
        })
    }

    // ── Environments ─────────────────────────────────────────────────

    /// Environments of a project, sorted by name.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::NotFound`] if the project does not exist.
    /// - [`ServiceError::Authz`] unless `actor` is a project member.
    pub async fn list(&self, actor: Uuid, project_id: Uuid) -> Result<Vec<Environment>, ServiceError> {
        self.require_project(project_id).await?;
        self.authz.authorize(actor, project_id, policy::READ).await?;

        let mut envs = self.repo.environments_of(project_id).await?;
        envs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(envs)
    }

    /// # Errors
    ///
    /// - [`ServiceError::NotFound`] if the environment does not exist.
    /// - [`ServiceError::Authz`] unless `actor` is a project member.
    pub async fn get(&self, actor: Uuid, env_id: Uuid) -> Result<Environment, ServiceError> {
        self.authorized_env(actor, env_id, policy::READ).await
    }

    /// # Errors
    ///
    /// - [`ServiceError::NotFound`] if the project does not exist.
    /// - [`ServiceError::Authz`] unless `actor` is a project admin.
    /// - [`ServiceError::Conflict`] if the slug is taken in the project.
    pub async fn create(
        &self,
        actor: Uuid,
        project_id: Uuid,
        input: NewEnvironment,
    ) -> Result<Environment, ServiceError> {
        self.require_project(project_id).await?;
        self.authz.authorize(actor, project_id, policy::MANAGE).await?;

        let name = naming::clean_name(&input.name)?;
        let slug = naming::resolve_slug(input.slug.as_deref(), &name)?;
        let now = Utc::now();
        let env = Environment {
            id: Uuid::new_v4(),
            project_id,
            name,
            slug,
            created_at: now,
            updated_at: now,
        };

        let mut batch = self.repo.batch();
        batch.insert_environment(&env)?;
        self.repo
            .commit(batch)
            .await
            .map_err(slug_conflict(&env.slug))?;

        info!(env_id = %env.id, %project_id, by = %actor, "environment created");
        Ok(env)
    }

    /// # Errors
    ///
    /// - [`ServiceError::NotFound`] if the environment does not exist.
    /// - [`ServiceError::Authz`] unless `actor` is a project admin.
    /// - [`ServiceError::Conflict`] if the new slug is taken.
    pub async fn update(
        &self,
        actor: Uuid,
        env_id: Uuid,
        update: EnvironmentUpdate,
    ) -> Result<Environment, ServiceError> {
        let current = self.authorized_env(actor, env_id, policy::MANAGE).await?;

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
        batch.update_environment(&current, &updated)?;
        self.repo
            .commit(batch)
            .await
            .map_err(slug_conflict(&updated.slug))?;

        info!(%env_id, by = %actor, "environment updated");
        Ok(updated)
    }

    /// Delete the environment and its variables.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::NotFound`] if the environment does not exist.
    /// - [`ServiceError::Authz`] unless `actor` is a project admin.
    pub async fn delete(&self, actor: Uuid, env_id: Uuid) -> Result<(), ServiceError> {
        let env = self.authorized_env(actor, env_id, policy::MANAGE).await?;

        let mut batch = self.repo.batch();
        stage_environment_removal(&self.repo, &mut batch, &env).await?;
        self.repo.commit(batch).await?;

        info!(%env_id, by = %actor, "environment deleted");
        Ok(())
    }

    // ── Variables ────────────────────────────────────────────────────

    /// Decrypted variables of an environment, sorted by key.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::NotFound`] if the environment does not exist.
    /// - [`ServiceError::Authz`] unless `actor` is a project member.
    /// - [`ServiceError::Crypto`] if any stored value fails to decrypt.
    pub async fn list_variables(&self, actor: Uuid, env_id: Uuid) -> Result<Vec<RevealedVariable>, ServiceError> {
        self.authorized_env(actor, env_id, policy::READ).await?;

        self.repo
            .variables_of(env_id)
            .await?
            .into_iter()
            .map(|v| self.reveal(v))
            .collect()
    }

    /// # Errors
    ///
    /// - [`ServiceError::NotFound`] if the environment or variable does not exist.
    /// - [`ServiceError::Authz`] unless `actor` is a project member.
    /// - [`ServiceError::Crypto`] if the value fails to decrypt.
    pub async fn get_variable(&self, actor: Uuid, env_id: Uuid, key: &str) -> Result<RevealedVariable, ServiceError> {
        self.authorized_env(actor, env_id, policy::READ).await?;

        let variable = self
            .repo
            .variable(env_id, key)
            .await?
            .ok_or(ServiceError::NotFound {
                resource: "variable",
            })?;
        self.reveal(variable)
    }

    /// Store a new variable. `path` defaults to `.env`.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::NotFound`] if the environment does not exist.
    /// - [`ServiceError::Authz`] unless `actor` is a project admin.
    /// - [`ServiceError::InvalidInput`] for a bad key or path.
    /// - [`ServiceError::Conflict`] if the key already exists.
    pub async fn create_variable(
        &self,
        actor: Uuid,
        env_id: Uuid,
        key: &str,
        value: &str,
        path: Option<&str>,
    ) -> Result<RevealedVariable, ServiceError> {
        self.authorized_env(actor, env_id, policy::MANAGE).await?;
        naming::check_variable_key(key)?;
        let path = naming::clean_variable_path(path)?;

        let now = Utc::now();
        let variable = Variable {
            environment_id: env_id,
            key: key.to_owned(),
            value: self.values.protect(value)?,
            path,
            created_at: now,
            updated_at: now,
        };

        let mut batch = self.repo.batch();
        batch.insert_variable(&variable)?;
        self.repo.commit(batch).await.map_err(|e| match e {
            RepositoryError::Conflict { .. } => ServiceError::Conflict {
                reason: format!("variable '{key}' already exists in this environment"),
            },
            other => other.into(),
        })?;

        info!(%env_id, %key, by = %actor, "variable created");
        Ok(RevealedVariable {
            environment_id: env_id,
            key: variable.key,
            value: value.to_owned(),
            path: variable.path,
            created_at: now,
            updated_at: now,
        })
    }

    /// Replace a variable's value and/or path.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::NotFound`] if the environment or variable does not exist.
    /// - [`ServiceError::Authz`] unless `actor` is a project admin.
    /// - [`ServiceError::InvalidInput`] for a bad path.
    pub async fn update_variable(
        &self,
        actor: Uuid,
        env_id: Uuid,
        key: &str,
        update: VariableUpdate,
    ) -> Result<RevealedVariable, ServiceError> {
        self.authorized_env(actor, env_id, policy::MANAGE).await?;

        let mut variable = self
            .repo
            .variable(env_id, key)
            .await?
            .ok_or(ServiceError::NotFound {
                resource: "variable",
            })?;
        if let Some(value) = update.value {
            variable.value = self.values.protect(&value)?;
        }
        if let Some(path) = update.path {
            variable.path = naming::clean_variable_path(Some(&path))?;
        }
        variable.updated_at = Utc::now();

        let mut batch = self.repo.batch();
        batch.put_variable(&variable)?;
        self.repo.commit(batch).await?;

        info!(%env_id, %key, by = %actor, "variable updated");
        self.reveal(variable)
    }

    /// # Errors
    ///
    /// - [`ServiceError::NotFound`] if the environment or variable does not exist.
    /// - [`ServiceError::Authz`] unless `actor` is a project admin.
    pub async fn delete_variable(&self, actor: Uuid, env_id: Uuid, key: &str) -> Result<(), ServiceError> {
        self.authorized_env(actor, env_id, policy::MANAGE).await?;

        if self.repo.variable(env_id, key).await?.is_none() {
            return Err(ServiceError::NotFound {
                resource: "variable",
            });
        }
        let mut batch = self.repo.batch();
        batch.delete_variable(env_id, key);
        self.repo.commit(batch).await?;

        info!(%env_id, %key, by = %actor, "variable deleted");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::{AuthzError, CryptoError};
    use crate::services::testing::{Harness, register};

    #[tokio::test]
    async fn variables_are_encrypted_at_rest() {
        let h = Harness::new();
        let owner = register(&h, "owner@example.com").await;
        let org = h.org(owner, "Acme").await;
        let project = h.project(owner, org.id, "Web").await;
        let env = h.env(owner, project.id, "production").await;

        h.environments
            .create_variable(owner, env.id, "DATABASE_URL", "postgres://secret", None)
            .await
            .unwrap();

        let stored = h.repo.variable(env.id, "DATABASE_URL").await.unwrap().unwrap();
        assert_ne!(stored.value, "postgres://secret");
        assert!(!stored.value.contains("secret"));
        assert_eq!(stored.path, ".env");

        let listed = h.environments.list_variables(owner, env.id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].value, "postgres://secret");
    }

    #[tokio::test]
    async fn org_admin_scenario_can_manage_project_but_not_delete_org() {
        let h = Harness::new();
        let owner = register(&h, "owner@example.com").await;
        let a = register(&h, "a@example.com").await;
        let org = h.org(owner, "Acme").await;
        h.orgs.add_member(owner, org.id, a, Role::Admin).await.unwrap();

        let project = h.project(a, org.id, "Web").await;
        let env = h.env(a, project.id, "staging").await;
        h.environments
            .create_variable(a, env.id, "API_KEY", "k", Some("config/.env.staging"))
            .await
            .unwrap();

        assert!(matches!(
            h.orgs.delete(a, org.id).await,
            Err(ServiceError::Authz(AuthzError::Insufficient { .. }))
        ));
    }

    #[tokio::test]
    async fn project_member_reads_but_cannot_write() {
        let h = Harness::new();
        let owner = register(&h, "owner@example.com").await;
        let dev = register(&h, "dev@example.com").await;
        let org = h.org(owner, "Acme").await;
        let project = h.project(owner, org.id, "Web").await;
        let env = h.env(owner, project.id, "production").await;
        h.environments
            .create_variable(owner, env.id, "TOKEN", "t0", None)
            .await
            .unwrap();
        h.orgs.add_member(owner, org.id, dev, Role::Member).await.unwrap();
        h.projects
            .add_member(owner, project.id, dev, Role::Member)
            .await
            .unwrap();

        assert_eq!(
            h.environments.get_variable(dev, env.id, "TOKEN").await.unwrap().value,
            "t0"
        );
        assert!(matches!(
            h.environments.create_variable(dev, env.id, "OTHER", "x", None).await,
            Err(ServiceError::Authz(AuthzError::Insufficient { .. }))
        ));
        assert!(h.environments.delete(dev, env.id).await.is_err());
    }

    #[tokio::test]
    async fn leaving_the_org_revokes_project_access() {
        let h = Harness::new();
        let owner = register(&h, "owner@example.com").await;
        let dev = register(&h, "dev@example.com").await;
        let org = h.org(owner, "Acme").await;
        let project = h.project(owner, org.id, "Web").await;
        let env = h.env(owner, project.id, "production").await;
        h.environments
            .create_variable(owner, env.id, "TOKEN", "t0", None)
            .await
            .unwrap();
        h.orgs.add_member(owner, org.id, dev, Role::Member).await.unwrap();
        h.projects
            .add_member(owner, project.id, dev, Role::Member)
            .await
            .unwrap();
        assert!(h.environments.list_variables(dev, env.id).await.is_ok());

        h.orgs.remove_member(owner, org.id, dev).await.unwrap();

        assert!(matches!(
            h.environments.list_variables(dev, env.id).await,
            Err(ServiceError::Authz(AuthzError::NotAMember { .. }))
        ));
        assert!(h.projects.list_mine(dev).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn outsider_cannot_read_variables() {
        let h = Harness::new();
        let owner = register(&h, "owner@example.com").await;
        let outsider = register(&h, "outsider@example.com").await;
        let org = h.org(owner, "Acme").await;
        let project = h.project(owner, org.id, "Web").await;
        let env = h.env(owner, project.id, "production").await;

        assert!(matches!(
            h.environments.list_variables(outsider, env.id).await,
            Err(ServiceError::Authz(AuthzError::NotAMember { .. }))
        ));
    }

    #[tokio::test]
    async fn duplicate_key_conflicts_and_update_replaces_value() {
        let h = Harness::new();
        let owner = register(&h, "owner@example.com").await;
        let org = h.org(owner, "Acme").await;
        let project = h.project(owner, org.id, "Web").await;
        let env = h.env(owner, project.id, "dev").await;

        h.environments
            .create_variable(owner, env.id, "PORT", "8080", None)
            .await
            .unwrap();
        assert!(matches!(
            h.environments.create_variable(owner, env.id, "PORT", "9090", None).await,
            Err(ServiceError::Conflict { .. })
        ));

        let updated = h
            .environments
            .update_variable(
                owner,
                env.id,
                "PORT",
                VariableUpdate {
                    value: Some("9090".to_owned()),
                    path: Some(".env.local".to_owned()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.value, "9090");
        assert_eq!(updated.path, ".env.local");
    }

    #[tokio::test]
    async fn invalid_key_is_rejected() {
        let h = Harness::new();
        let owner = register(&h, "owner@example.com").await;
        let org = h.org(owner, "Acme").await;
        let project = h.project(owner, org.id, "Web").await;
        let env = h.env(owner, project.id, "dev").await;

        assert!(matches!(
            h.environments.create_variable(owner, env.id, "1BAD-KEY", "x", None).await,
            Err(ServiceError::InvalidInput { .. })
        ));
    }

    #[tokio::test]
    async fn tampered_value_fails_the_whole_listing() {
        let h = Harness::new();
        let owner = register(&h, "owner@example.com").await;
        let org = h.org(owner, "Acme").await;
        let project = h.project(owner, org.id, "Web").await;
        let env = h.env(owner, project.id, "dev").await;
        h.environments
            .create_variable(owner, env.id, "A", "fine", None)
            .await
            .unwrap();
        h.environments
            .create_variable(owner, env.id, "B", "soon broken", None)
            .await
            .unwrap();

        let mut stored = h.repo.variable(env.id, "B").await.unwrap().unwrap();
        let last = stored.value.pop().unwrap();
        stored.value.push(if last == '0' { '1' } else { '0' });
        let mut batch = h.repo.batch();
        batch.put_variable(&stored).unwrap();
        h.repo.commit(batch).await.unwrap();

        assert!(matches!(
            h.environments.list_variables(owner, env.id).await,
            Err(ServiceError::Crypto(CryptoError::Decryption { .. }))
        ));
    }

    #[tokio::test]
    async fn deleting_environment_frees_slug_and_drops_variables() {
        let h = Harness::new();
        let owner = register(&h, "owner@example.com").await;
        let org = h.org(owner, "Acme").await;
        let project = h.project(owner, org.id, "Web").await;
        let env = h.env(owner, project.id, "dev").await;
        h.environments
            .create_variable(owner, env.id, "A", "1", None)
            .await
            .unwrap();

        h.environments.delete(owner, env.id).await.unwrap();
        assert!(h.repo.variables_of(env.id).await.unwrap().is_empty());
        assert!(h.environments.list(owner, project.id).await.unwrap().is_empty());

        h.env(owner, project.id, "dev").await;
    }
}
