//! Typed persistence over a [`StorageBackend`].
//!
//! Records are JSON documents. Secondary lookups (email, slugs, parent/child
//! listings, token digests) are separate index keys holding a UUID, so every
//! uniqueness rule is an insert-only write inside a [`Batch`]. A batch maps
//! onto one [`WriteBatch`] and commits atomically.
//!
//! Single-use records (reset tokens, live refresh tokens, invitations) are
//! consumed with a must-exist removal, so of two batches racing to consume
//! the same record only one commits; the other fails with
//! [`RepositoryError::Stale`].
//!
//! Key layout:
//!
//! | key | value |
//! |---|---|
//! | `users/<id>` | [`User`] |
//! | `users-by-email/<email>` | user id |
//! | `password-resets/<digest>` | user id |
//! | `refresh-tokens/<digest>` | [`RefreshToken`] |
//! | `refresh-tokens-live/<digest>` | user id, present until revoked |
//! | `user-refresh-tokens/<user>/<digest>` | user id |
//! | `orgs/<id>` | [`Organization`] |
//! | `orgs-by-slug/<slug>` | org id |
//! | `memberships/<kind>/<scope>/<user>` | [`Membership`] |
//! | `user-memberships/<kind>/<user>/<scope>` | scope id |
//! | `projects/<id>` | [`Project`] |
//! | `org-projects/<org>/<project>` | project id |
//! | `project-slugs/<org>/<slug>` | project id |
//! | `environments/<id>` | [`Environment`] |
//! | `project-environments/<project>/<env>` | env id |
//! | `environment-slugs/<project>/<slug>` | env id |
//! | `variables/<env>/<key>` | [`Variable`] |
//! | `invitations/<digest>` | [`Invitation`] |

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use envm_storage::{StorageBackend, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::authz::{Scope, ScopeKind};
use crate::error::RepositoryError;
use crate::models::{
    Environment, Invitation, Membership, Organization, Project, RefreshToken, User, Variable,
};

mod keys {
    use uuid::Uuid;

    use crate::authz::ScopeKind;

    pub fn user(id: Uuid) -> String {
        format!("users/{id}")
    }

    pub fn user_email(email: &str) -> String {
        format!("users-by-email/{}", super::normalize_email(email))
    }

    pub fn password_reset(digest: &str) -> String {
        format!("password-resets/{digest}")
    }

    pub fn refresh_token(digest: &str) -> String {
        format!("refresh-tokens/{digest}")
    }

    pub fn live_refresh_token(digest: &str) -> String {
        format!("refresh-tokens-live/{digest}")
    }

    pub fn user_refresh_tokens(user: Uuid) -> String {
        format!("user-refresh-tokens/{user}/")
    }

    pub fn user_refresh_token(user: Uuid, digest: &str) -> String {
        format!("user-refresh-tokens/{user}/{digest}")
    }

    pub fn org(id: Uuid) -> String {
        format!("orgs/{id}")
    }

    pub fn org_slug(slug: &str) -> String {
        format!("orgs-by-slug/{slug}")
    }

    pub fn scope_memberships(kind: ScopeKind, scope: Uuid) -> String {
        format!("memberships/{}/{scope}/", kind.key_segment())
    }

    pub fn membership(kind: ScopeKind, scope: Uuid, user: Uuid) -> String {
        format!("memberships/{}/{scope}/{user}", kind.key_segment())
    }

    pub fn user_scopes(kind: ScopeKind, user: Uuid) -> String {
        format!("user-memberships/{}/{user}/", kind.key_segment())
    }

    pub fn user_scope(kind: ScopeKind, user: Uuid, scope: Uuid) -> String {
        format!("user-memberships/{}/{user}/{scope}", kind.key_segment())
    }

    pub fn project(id: Uuid) -> String {
        format!("projects/{id}")
    }

    pub fn org_projects(org: Uuid) -> String {
        format!("org-projects/{org}/")
    }

    pub fn org_project(org: Uuid, project: Uuid) -> String {
        format!("org-projects/{org}/{project}")
    }

    pub fn project_slug(org: Uuid, slug: &str) -> String {
        format!("project-slugs/{org}/{slug}")
    }

    pub fn environment(id: Uuid) -> String {
        format!("environments/{id}")
    }

    pub fn project_environments(project: Uuid) -> String {
        format!("project-environments/{project}/")
    }

    pub fn project_environment(project: Uuid, env: Uuid) -> String {
        format!("project-environments/{project}/{env}")
    }

    pub fn environment_slug(project: Uuid, slug: &str) -> String {
        format!("environment-slugs/{project}/{slug}")
    }

    pub fn variables(env: Uuid) -> String {
        format!("variables/{env}/")
    }

    pub fn variable(env: Uuid, key: &str) -> String {
        format!("variables/{env}/{key}")
    }

    pub fn invitation(digest: &str) -> String {
        format!("invitations/{digest}")
    }
}

/// Canonical form of an email address for lookups and storage.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, RepositoryError> {
    serde_json::to_vec(value).map_err(|e| RepositoryError::Serialization {
        reason: e.to_string(),
    })
}

fn id_bytes(id: Uuid) -> Vec<u8> {
    id.to_string().into_bytes()
}

/// Typed access to every persisted record.
#[derive(Clone)]
pub struct Repository {
    storage: Arc<dyn StorageBackend>,
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository").finish_non_exhaustive()
    }
}

impl Repository {
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// Start an empty unit of work.
    #[must_use]
    pub fn batch(&self) -> Batch {
        Batch::default()
    }

    /// Commit a unit of work atomically.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Conflict`] if a uniqueness index was already
    /// taken, or [`RepositoryError::Storage`] if the backend fails. Nothing is
    /// written in either case.
    pub async fn commit(&self, batch: Batch) -> Result<(), RepositoryError> {
        if batch.inner.is_empty() {
            return Ok(());
        }
        self.storage.commit(batch.inner).await?;
        Ok(())
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, RepositoryError> {
        let Some(bytes) = self.storage.get(key).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| RepositoryError::Corrupted {
                key: key.to_owned(),
                reason: e.to_string(),
            })
    }

    async fn read_index(&self, key: &str) -> Result<Option<Uuid>, RepositoryError> {
        let Some(bytes) = self.storage.get(key).await? else {
            return Ok(None);
        };
        std::str::from_utf8(&bytes)
            .ok()
            .and_then(|s| Uuid::parse_str(s).ok())
            .map(Some)
            .ok_or_else(|| RepositoryError::Corrupted {
                key: key.to_owned(),
                reason: "index entry is not a UUID".to_owned(),
            })
    }

    /// Ids encoded as the final segment of every key under `prefix`.
    async fn child_ids(&self, prefix: &str) -> Result<Vec<Uuid>, RepositoryError> {
        let keys = self.storage.list(prefix).await?;
        keys.iter()
            .map(|key| {
                let tail = key.strip_prefix(prefix).unwrap_or(key);
                Uuid::parse_str(tail).map_err(|e| RepositoryError::Corrupted {
                    key: key.clone(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    async fn read_all<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>, RepositoryError> {
        let keys = self.storage.list(prefix).await?;
        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(record) = self.read(&key).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn read_many<T: DeserializeOwned>(
        &self,
        ids: Vec<Uuid>,
        key: fn(Uuid) -> String,
    ) -> Result<Vec<T>, RepositoryError> {
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.read(&key(id)).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    // ── Users ────────────────────────────────────────────────────────

    /// # Errors
    ///
    /// Returns [`RepositoryError`] if storage fails or the record is corrupted.
    pub async fn user(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        self.read(&keys::user(id)).await
    }

    /// # Errors
    ///
    /// Returns [`RepositoryError`] if storage fails or the record is corrupted.
    pub async fn user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        match self.read_index(&keys::user_email(email)).await? {
            Some(id) => self.user(id).await,
            None => Ok(None),
        }
    }

    /// # Errors
    ///
    /// Returns [`RepositoryError`] if storage fails or the record is corrupted.
    pub async fn user_by_reset_digest(&self, digest: &str) -> Result<Option<User>, RepositoryError> {
        match self.read_index(&keys::password_reset(digest)).await? {
            Some(id) => self.user(id).await,
            None => Ok(None),
        }
    }

    // ── Refresh tokens ───────────────────────────────────────────────

    /// # Errors
    ///
    /// Returns [`RepositoryError`] if storage fails or the record is corrupted.
    pub async fn refresh_token(&self, digest: &str) -> Result<Option<RefreshToken>, RepositoryError> {
        self.read(&keys::refresh_token(digest)).await
    }

    /// Every refresh token ever issued to `user_id`, revoked ones included.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] if storage fails or a record is corrupted.
    pub async fn refresh_tokens_of(&self, user_id: Uuid) -> Result<Vec<RefreshToken>, RepositoryError> {
        let prefix = keys::user_refresh_tokens(user_id);
        let mut tokens = Vec::new();
        for key in self.storage.list(&prefix).await? {
            let digest = key.strip_prefix(&prefix).unwrap_or(&key);
            if let Some(token) = self.refresh_token(digest).await? {
                tokens.push(token);
            }
        }
        Ok(tokens)
    }

    // ── Organizations ────────────────────────────────────────────────

    /// # Errors
    ///
    /// Returns [`RepositoryError`] if storage fails or the record is corrupted.
    pub async fn organization(&self, id: Uuid) -> Result<Option<Organization>, RepositoryError> {
        self.read(&keys::org(id)).await
    }

    /// # Errors
    ///
    /// Returns [`RepositoryError`] if storage fails or a record is corrupted.
    pub async fn organizations(&self, ids: Vec<Uuid>) -> Result<Vec<Organization>, RepositoryError> {
        self.read_many(ids, keys::org).await
    }

    // ── Projects ─────────────────────────────────────────────────────

    /// # Errors
    ///
    /// Returns [`RepositoryError`] if storage fails or the record is corrupted.
    pub async fn project(&self, id: Uuid) -> Result<Option<Project>, RepositoryError> {
        self.read(&keys::project(id)).await
    }

    /// # Errors
    ///
    /// Returns [`RepositoryError`] if storage fails or a record is corrupted.
    pub async fn projects(&self, ids: Vec<Uuid>) -> Result<Vec<Project>, RepositoryError> {
        self.read_many(ids, keys::project).await
    }

    /// # Errors
    ///
    /// Returns [`RepositoryError`] if storage fails or a record is corrupted.
    pub async fn projects_of(&self, org_id: Uuid) -> Result<Vec<Project>, RepositoryError> {
        let ids = self.child_ids(&keys::org_projects(org_id)).await?;
        self.projects(ids).await
    }

    // ── Environments & variables ─────────────────────────────────────

    /// # Errors
    ///
    /// Returns [`RepositoryError`] if storage fails or the record is corrupted.
    pub async fn environment(&self, id: Uuid) -> Result<Option<Environment>, RepositoryError> {
        self.read(&keys::environment(id)).await
    }

    /// # Errors
    ///
    /// Returns [`RepositoryError`] if storage fails or a record is corrupted.
    pub async fn environments_of(&self, project_id: Uuid) -> Result<Vec<Environment>, RepositoryError> {
        let ids = self.child_ids(&keys::project_environments(project_id)).await?;
        self.read_many(ids, keys::environment).await
    }

    /// # Errors
    ///
    /// Returns [`RepositoryError`] if storage fails or the record is corrupted.
    pub async fn variable(&self, env_id: Uuid, key: &str) -> Result<Option<Variable>, RepositoryError> {
        self.read(&keys::variable(env_id, key)).await
    }

    /// Variables of one environment, sorted by key.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] if storage fails or a record is corrupted.
    pub async fn variables_of(&self, env_id: Uuid) -> Result<Vec<Variable>, RepositoryError> {
        self.read_all(&keys::variables(env_id)).await
    }

    // ── Invitations ──────────────────────────────────────────────────

    /// # Errors
    ///
    /// Returns [`RepositoryError`] if storage fails or the record is corrupted.
    pub async fn invitation(&self, digest: &str) -> Result<Option<Invitation>, RepositoryError> {
        self.read(&keys::invitation(digest)).await
    }
}

/// Membership rows of one scope kind.
///
/// Organization and project memberships share this one implementation; the
/// [`Scope`] parameter only selects the key namespace.
pub struct Memberships<S: Scope> {
    repo: Repository,
    scope: PhantomData<fn() -> S>,
}

impl<S: Scope> Clone for Memberships<S> {
    fn clone(&self) -> Self {
        Self::new(self.repo.clone())
    }
}

impl<S: Scope> fmt::Debug for Memberships<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memberships")
            .field("scope", &S::KIND)
            .finish_non_exhaustive()
    }
}

impl<S: Scope> Memberships<S> {
    #[must_use]
    pub fn new(repo: Repository) -> Self {
        Self {
            repo,
            scope: PhantomData,
        }
    }

    /// # Errors
    ///
    /// Returns [`RepositoryError`] if storage fails or the record is corrupted.
    pub async fn get(&self, scope_id: Uuid, user_id: Uuid) -> Result<Option<Membership>, RepositoryError> {
        self.repo
            .read(&keys::membership(S::KIND, scope_id, user_id))
            .await
    }

    /// Every membership of one scope.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] if storage fails or a record is corrupted.
    pub async fn of_scope(&self, scope_id: Uuid) -> Result<Vec<Membership>, RepositoryError> {
        self.repo
            .read_all(&keys::scope_memberships(S::KIND, scope_id))
            .await
    }

    /// Ids of every scope `user_id` belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] if storage fails or an index is corrupted.
    pub async fn scope_ids_of(&self, user_id: Uuid) -> Result<Vec<Uuid>, RepositoryError> {
        self.repo
            .child_ids(&keys::user_scopes(S::KIND, user_id))
            .await
    }
}

/// An atomic unit of work. Build it, then pass it to [`Repository::commit`].
#[derive(Debug, Default)]
pub struct Batch {
    inner: WriteBatch,
}

impl Batch {
    /// # Errors
    ///
    /// Returns [`RepositoryError::Serialization`] if the record cannot be encoded.
    pub fn insert_user(&mut self, user: &User) -> Result<(), RepositoryError> {
        self.inner.insert(keys::user(user.id), encode(user)?);
        self.inner.insert(keys::user_email(&user.email), id_bytes(user.id));
        if let Some(digest) = &user.reset_token_hash {
            self.inner.insert(keys::password_reset(digest), id_bytes(user.id));
        }
        Ok(())
    }

    /// Overwrite `previous` with `user`, moving the email and reset-token
    /// indexes when they changed.
    ///
    /// The batch fails with [`RepositoryError::Stale`] if the reset token
    /// `previous` carried was consumed in the meantime.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Serialization`] if the record cannot be encoded.
    pub fn update_user(&mut self, previous: &User, user: &User) -> Result<(), RepositoryError> {
        self.inner.put(keys::user(user.id), encode(user)?);

        if normalize_email(&previous.email) != normalize_email(&user.email) {
            self.inner.delete(keys::user_email(&previous.email));
            self.inner.insert(keys::user_email(&user.email), id_bytes(user.id));
        }

        if previous.reset_token_hash == user.reset_token_hash {
            // Keep a concurrent reset from being undone by this overwrite.
            if let Some(digest) = &user.reset_token_hash {
                self.inner.guard(keys::password_reset(digest));
            }
        } else {
            if let Some(old) = &previous.reset_token_hash {
                self.inner.remove(keys::password_reset(old));
            }
            if let Some(new) = &user.reset_token_hash {
                self.inner.insert(keys::password_reset(new), id_bytes(user.id));
            }
        }
        Ok(())
    }

    pub fn delete_user(&mut self, user: &User) {
        self.inner.delete(keys::user(user.id));
        self.inner.delete(keys::user_email(&user.email));
        if let Some(digest) = &user.reset_token_hash {
            self.inner.delete(keys::password_reset(digest));
        }
    }

    /// Record a newly issued refresh token and mark it live.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Serialization`] if the record cannot be encoded.
    pub fn insert_refresh_token(&mut self, token: &RefreshToken) -> Result<(), RepositoryError> {
        self.inner
            .insert(keys::refresh_token(&token.token_hash), encode(token)?);
        self.inner.insert(
            keys::live_refresh_token(&token.token_hash),
            id_bytes(token.user_id),
        );
        self.inner.put(
            keys::user_refresh_token(token.user_id, &token.token_hash),
            id_bytes(token.user_id),
        );
        Ok(())
    }

    /// Store `token` as revoked. Revoking an already revoked token is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Serialization`] if the record cannot be encoded.
    pub fn revoke_refresh_token(&mut self, token: &RefreshToken) -> Result<(), RepositoryError> {
        self.inner
            .put(keys::refresh_token(&token.token_hash), encode(token)?);
        self.inner.delete(keys::live_refresh_token(&token.token_hash));
        Ok(())
    }

    /// Store `token` as revoked, failing the batch with
    /// [`RepositoryError::Stale`] unless it was still live. Used by rotation
    /// so one refresh token yields at most one successor.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Serialization`] if the record cannot be encoded.
    pub fn consume_refresh_token(&mut self, token: &RefreshToken) -> Result<(), RepositoryError> {
        self.inner
            .put(keys::refresh_token(&token.token_hash), encode(token)?);
        self.inner.remove(keys::live_refresh_token(&token.token_hash));
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`RepositoryError::Serialization`] if the record cannot be encoded.
    pub fn insert_organization(&mut self, org: &Organization) -> Result<(), RepositoryError> {
        self.inner.insert(keys::org(org.id), encode(org)?);
        self.inner.insert(keys::org_slug(&org.slug), id_bytes(org.id));
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`RepositoryError::Serialization`] if the record cannot be encoded.
    pub fn update_organization(
        &mut self,
        previous: &Organization,
        org: &Organization,
    ) -> Result<(), RepositoryError> {
        self.inner.put(keys::org(org.id), encode(org)?);
        if previous.slug != org.slug {
            self.inner.delete(keys::org_slug(&previous.slug));
            self.inner.insert(keys::org_slug(&org.slug), id_bytes(org.id));
        }
        Ok(())
    }

    pub fn delete_organization(&mut self, org: &Organization) {
        self.inner.delete(keys::org(org.id));
        self.inner.delete(keys::org_slug(&org.slug));
    }

    /// Add a membership, failing the batch if the user already has one in
    /// this scope.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Serialization`] if the record cannot be encoded.
    pub fn insert_membership(&mut self, membership: &Membership) -> Result<(), RepositoryError> {
        let Membership {
            scope,
            scope_id,
            user_id,
            ..
        } = *membership;
        self.inner
            .insert(keys::membership(scope, scope_id, user_id), encode(membership)?);
        self.inner
            .put(keys::user_scope(scope, user_id, scope_id), id_bytes(scope_id));
        Ok(())
    }

    /// Fail the batch with [`RepositoryError::Stale`] unless the membership
    /// still exists when it commits.
    pub fn guard_membership(&mut self, scope: ScopeKind, scope_id: Uuid, user_id: Uuid) {
        self.inner.guard(keys::membership(scope, scope_id, user_id));
    }

    pub fn delete_membership(&mut self, scope: ScopeKind, scope_id: Uuid, user_id: Uuid) {
        self.inner.delete(keys::membership(scope, scope_id, user_id));
        self.inner.delete(keys::user_scope(scope, user_id, scope_id));
    }

    /// # Errors
    ///
    /// Returns [`RepositoryError::Serialization`] if the record cannot be encoded.
    pub fn insert_project(&mut self, project: &Project) -> Result<(), RepositoryError> {
        self.inner.insert(keys::project(project.id), encode(project)?);
        self.inner.insert(
            keys::project_slug(project.organization_id, &project.slug),
            id_bytes(project.id),
        );
        self.inner.put(
            keys::org_project(project.organization_id, project.id),
            id_bytes(project.id),
        );
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`RepositoryError::Serialization`] if the record cannot be encoded.
    pub fn update_project(&mut self, previous: &Project, project: &Project) -> Result<(), RepositoryError> {
        self.inner.put(keys::project(project.id), encode(project)?);
        if previous.slug != project.slug {
            self.inner
                .delete(keys::project_slug(previous.organization_id, &previous.slug));
            self.inner.insert(
                keys::project_slug(project.organization_id, &project.slug),
                id_bytes(project.id),
            );
        }
        Ok(())
    }

    pub fn delete_project(&mut self, project: &Project) {
        self.inner.delete(keys::project(project.id));
        self.inner
            .delete(keys::project_slug(project.organization_id, &project.slug));
        self.inner
            .delete(keys::org_project(project.organization_id, project.id));
    }

    /// # Errors
    ///
    /// Returns [`RepositoryError::Serialization`] if the record cannot be encoded.
    pub fn insert_environment(&mut self, env: &Environment) -> Result<(), RepositoryError> {
        self.inner.insert(keys::environment(env.id), encode(env)?);
        self.inner
            .insert(keys::environment_slug(env.project_id, &env.slug), id_bytes(env.id));
        self.inner
            .put(keys::project_environment(env.project_id, env.id), id_bytes(env.id));
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`RepositoryError::Serialization`] if the record cannot be encoded.
    pub fn update_environment(
        &mut self,
        previous: &Environment,
        env: &Environment,
    ) -> Result<(), RepositoryError> {
        self.inner.put(keys::environment(env.id), encode(env)?);
        if previous.slug != env.slug {
            self.inner
                .delete(keys::environment_slug(previous.project_id, &previous.slug));
            self.inner
                .insert(keys::environment_slug(env.project_id, &env.slug), id_bytes(env.id));
        }
        Ok(())
    }

    pub fn delete_environment(&mut self, env: &Environment) {
        self.inner.delete(keys::environment(env.id));
        self.inner
            .delete(keys::environment_slug(env.project_id, &env.slug));
        self.inner
            .delete(keys::project_environment(env.project_id, env.id));
    }

    /// Create a variable, failing the batch if the key is taken.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Serialization`] if the record cannot be encoded.
    pub fn insert_variable(&mut self, variable: &Variable) -> Result<(), RepositoryError> {
        self.inner.insert(
            keys::variable(variable.environment_id, &variable.key),
            encode(variable)?,
        );
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`RepositoryError::Serialization`] if the record cannot be encoded.
    pub fn put_variable(&mut self, variable: &Variable) -> Result<(), RepositoryError> {
        self.inner.put(
            keys::variable(variable.environment_id, &variable.key),
            encode(variable)?,
        );
        Ok(())
    }

    pub fn delete_variable(&mut self, env_id: Uuid, key: &str) {
        self.inner.delete(keys::variable(env_id, key));
    }

    /// # Errors
    ///
    /// Returns [`RepositoryError::Serialization`] if the record cannot be encoded.
    pub fn insert_invitation(&mut self, invitation: &Invitation) -> Result<(), RepositoryError> {
        self.inner
            .insert(keys::invitation(&invitation.token_hash), encode(invitation)?);
        Ok(())
    }

    /// Consume an invitation, failing the batch with
    /// [`RepositoryError::Stale`] if it was already used.
    pub fn consume_invitation(&mut self, invitation: &Invitation) {
        self.inner.remove(keys::invitation(&invitation.token_hash));
    }
}
