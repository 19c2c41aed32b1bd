//! User registration, login, and profile management.

use std::fmt;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::authz::{OrgScope, ProjectScope, Role, Scope, ScopeKind};
use crate::error::{AccountError, RepositoryError};
use crate::models::User;
use crate::password;
use crate::repository::{Batch, Memberships, Repository, normalize_email};
use crate::session::SessionManager;

/// Input for [`AccountService::register`].
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

/// Fields a user may change on their own profile.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub email: Option<String>,
    pub full_name: Option<String>,
}

fn check_email(email: &str) -> Result<(), AccountError> {
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'))
        && !email.contains(char::is_whitespace)
        && !email.contains('/');
    if valid {
        Ok(())
    } else {
        Err(AccountError::InvalidInput {
            reason: "invalid email address".to_owned(),
        })
    }
}

fn clean_full_name(name: &str) -> Result<String, AccountError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > 100 {
        return Err(AccountError::InvalidInput {
            reason: "full name must be 1-100 characters".to_owned(),
        });
    }
    Ok(name.to_owned())
}

fn email_conflict(err: RepositoryError) -> AccountError {
    match err {
        RepositoryError::Conflict { .. } => AccountError::EmailTaken,
        other => AccountError::Repository(other),
    }
}

/// Registration, credential checks, and profile maintenance.
#[derive(Clone)]
pub struct AccountService {
    repo: Repository,
    sessions: SessionManager,
}

impl fmt::Debug for AccountService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountService").finish_non_exhaustive()
    }
}

impl AccountService {
    #[must_use]
    pub fn new(repo: Repository, sessions: SessionManager) -> Self {
        Self { repo, sessions }
    }

    /// Create an account with an Argon2id password hash.
    ///
    /// # Errors
    ///
    /// - [`AccountError::InvalidInput`] for a malformed email or name.
    /// - [`AccountError::Password`] if the password is too short.
    /// - [`AccountError::EmailTaken`] if the email is registered.
    pub async fn register(&self, input: NewUser) -> Result<User, AccountError> {
        let email = normalize_email(&input.email);
        check_email(&email)?;
        let full_name = clean_full_name(&input.full_name)?;
        password::check_policy(&input.password)?;

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email,
            full_name,
            password_hash: password::hash_password(&input.password)?,
            reset_token_hash: None,
            reset_token_expires_at: None,
            created_at: now,
            updated_at: now,
        };

        let mut batch = self.repo.batch();
        batch.insert_user(&user)?;
        self.repo.commit(batch).await.map_err(email_conflict)?;

        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// Check an email/password pair.
    ///
    /// # Errors
    ///
    /// Returns [`AccountError::InvalidCredentials`] whether the email is
    /// unknown or the password is wrong.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AccountError> {
        let user = self
            .repo
            .user_by_email(email)
            .await?
            .ok_or(AccountError::InvalidCredentials)?;

        if !password::verify_password(password, &user.password_hash) {
            return Err(AccountError::InvalidCredentials);
        }
        Ok(user)
    }

    /// # Errors
    ///
    /// Returns [`AccountError::NotFound`] if the user does not exist.
    pub async fn get(&self, user_id: Uuid) -> Result<User, AccountError> {
        self.repo
            .user(user_id)
            .await?
            .ok_or(AccountError::NotFound)
    }

    /// # Errors
    ///
    /// - [`AccountError::NotFound`] if the user does not exist.
    /// - [`AccountError::InvalidInput`] for a malformed email or name.
    /// - [`AccountError::EmailTaken`] if the new email is registered.
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        update: ProfileUpdate,
    ) -> Result<User, AccountError> {
        let current = self.get(user_id).await?;
        let mut updated = current.clone();

        if let Some(email) = update.email {
            let email = normalize_email(&email);
            check_email(&email)?;
            updated.email = email;
        }
        if let Some(name) = update.full_name {
            updated.full_name = clean_full_name(&name)?;
        }
        if updated == current {
            return Ok(current);
        }
        updated.updated_at = Utc::now();

        let mut batch = self.repo.batch();
        batch.update_user(&current, &updated)?;
        self.repo.commit(batch).await.map_err(email_conflict)?;

        info!(%user_id, "profile updated");
        Ok(updated)
    }

    /// Delete the account, its sessions, and its memberships.
    ///
    /// # Errors
    ///
    /// - [`AccountError::NotFound`] if the user does not exist.
    /// - [`AccountError::SoleOwner`] if the user is the only owner of an
    ///   organization or project.
    pub async fn delete(&self, user_id: Uuid) -> Result<(), AccountError> {
        let user = self.get(user_id).await?;

        let mut batch = self.repo.batch();
        self.stage_departures::<OrgScope>(&mut batch, user_id).await?;
        self.stage_departures::<ProjectScope>(&mut batch, user_id).await?;
        batch.delete_user(&user);

        self.sessions.revoke_all(user_id).await?;
        self.repo.commit(batch).await?;

        info!(%user_id, "user deleted");
        Ok(())
    }

    /// Stage removal of every `S` membership of `user_id`. Where the user is
    /// an owner, another owner must still exist when the batch commits.
    async fn stage_departures<S: Scope>(&self, batch: &mut Batch, user_id: Uuid) -> Result<(), AccountError> {
        let memberships = Memberships::<S>::new(self.repo.clone());
        for scope_id in memberships.scope_ids_of(user_id).await? {
            let members = memberships.of_scope(scope_id).await?;
            let owns = members
                .iter()
                .any(|m| m.user_id == user_id && m.role == Role::Owner);
            if owns {
                let co_owner = members
                    .iter()
                    .find(|m| m.user_id != user_id && m.role == Role::Owner);
                let Some(co_owner) = co_owner else {
                    return Err(AccountError::SoleOwner {
                        scope: S::KIND,
                        name: self.scope_name(S::KIND, scope_id).await?,
                    });
                };
                batch.guard_membership(S::KIND, scope_id, co_owner.user_id);
            }
            batch.delete_membership(S::KIND, scope_id, user_id);
        }
        Ok(())
    }

    async fn scope_name(&self, scope: ScopeKind, scope_id: Uuid) -> Result<String, RepositoryError> {
        let name = match scope {
            ScopeKind::Organization => self.repo.organization(scope_id).await?.map(|o| o.name),
            ScopeKind::Project => self.repo.project(scope_id).await?.map(|p| p.name),
        };
        Ok(name.unwrap_or_else(|| scope_id.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use envm_storage::MemoryBackend;

    use super::*;
    use crate::error::PasswordError;
    use crate::notify::LogNotifier;
    use crate::services::testing::{Harness, register};

    fn service() -> AccountService {
        let repo = Repository::new(Arc::new(MemoryBackend::new()));
        let sessions = SessionManager::new(repo.clone(), Arc::new(LogNotifier));
        AccountService::new(repo, sessions)
    }

    fn ada() -> NewUser {
        NewUser {
            email: "Ada@Example.com".to_owned(),
            password: "analytical".to_owned(),
            full_name: "Ada Lovelace".to_owned(),
        }
    }

    #[tokio::test]
    async fn register_normalises_email_and_hashes_password() {
        let accounts = service();
        let user = accounts.register(ada()).await.unwrap();
        assert_eq!(user.email, "ada@example.com");
        assert_ne!(user.password_hash, "analytical");
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let accounts = service();
        accounts.register(ada()).await.unwrap();
        assert!(matches!(
            accounts.register(ada()).await,
            Err(AccountError::EmailTaken)
        ));
    }

    #[tokio::test]
    async fn short_password_is_rejected() {
        let accounts = service();
        let mut input = ada();
        input.password = "short".to_owned();
        assert!(matches!(
            accounts.register(input).await,
            Err(AccountError::Password(PasswordError::TooShort { .. }))
        ));
    }

    #[tokio::test]
    async fn login_errors_do_not_reveal_which_part_was_wrong() {
        let accounts = service();
        accounts.register(ada()).await.unwrap();

        let unknown = accounts.login("nobody@example.com", "analytical").await;
        let wrong = accounts.login("ada@example.com", "wrong-password").await;
        assert!(matches!(unknown, Err(AccountError::InvalidCredentials)));
        assert!(matches!(wrong, Err(AccountError::InvalidCredentials)));

        assert!(accounts.login("ADA@example.com", "analytical").await.is_ok());
    }

    #[tokio::test]
    async fn profile_email_change_frees_the_old_address() {
        let accounts = service();
        let user = accounts.register(ada()).await.unwrap();
        accounts
            .update_profile(
                user.id,
                ProfileUpdate {
                    email: Some("countess@example.com".to_owned()),
                    full_name: None,
                },
            )
            .await
            .unwrap();

        assert!(accounts.register(ada()).await.is_ok());
    }

    #[tokio::test]
    async fn sole_project_owner_cannot_delete_account() {
        let h = Harness::new();
        let owner = register(&h, "owner@example.com").await;
        let admin = register(&h, "admin@example.com").await;
        let org = h.org(owner, "Acme").await;
        h.orgs.add_member(owner, org.id, admin, Role::Admin).await.unwrap();
        let project = h.project(admin, org.id, "Web").await;

        assert!(matches!(
            h.accounts.delete(admin).await,
            Err(AccountError::SoleOwner {
                scope: ScopeKind::Project,
                ..
            })
        ));

        h.projects
            .add_member(owner, project.id, owner, Role::Owner)
            .await
            .unwrap();
        h.accounts.delete(admin).await.unwrap();
        let members = h.projects.members(owner, project.id).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].user_id, owner);
    }

    #[tokio::test]
    async fn sole_org_owner_cannot_delete_account() {
        let h = Harness::new();
        let owner = register(&h, "owner@example.com").await;
        h.org(owner, "Acme").await;

        assert!(matches!(
            h.accounts.delete(owner).await,
            Err(AccountError::SoleOwner {
                scope: ScopeKind::Organization,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn deleted_user_cannot_log_in() {
        let accounts = service();
        let user = accounts.register(ada()).await.unwrap();
        accounts.delete(user.id).await.unwrap();

        assert!(matches!(
            accounts.login("ada@example.com", "analytical").await,
            Err(AccountError::InvalidCredentials)
        ));
    }
}
