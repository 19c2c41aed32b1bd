//! Long-lived server-side sessions and single-use tokens.
//!
//! The session manager owns three kinds of opaque token: refresh tokens
//! (7 days), password-reset tokens (1 hour), and organization invitations
//! (7 days). Every token is 32 bytes from the OS CSPRNG, hex-encoded, and
//! handed out exactly once. Only its SHA-256 digest is persisted.
//!
//! Refresh token lifecycle:
//!
//! ```text
//! issued ──(logout | rotate | password reset)──▶ revoked
//!   │
//!   └──(now > expires_at)──▶ expired
//! ```
//!
//! Every single-use token is consumed by a batch that removes its record or
//! live marker, so concurrent redemptions of one token succeed at most once.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::authz::{Role, ScopeKind};
use crate::crypto::{random_token, token_digest};
use crate::error::{RepositoryError, SessionError};
use crate::models::{Invitation, Membership, Organization, RefreshToken, User};
use crate::notify::{Notification, Notifier};
use crate::password;
use crate::repository::{Batch, Repository, normalize_email};

/// Bytes of randomness in every opaque token.
pub const TOKEN_BYTES: usize = 32;

/// Lifetimes of the tokens the session manager issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTtls {
    pub refresh: Duration,
    pub password_reset: Duration,
    pub invitation: Duration,
}

impl Default for SessionTtls {
    fn default() -> Self {
        Self {
            refresh: Duration::days(7),
            password_reset: Duration::hours(1),
            invitation: Duration::days(7),
        }
    }
}

/// Issues, validates, and revokes refresh tokens, and runs the password
/// reset and invitation flows.
#[derive(Clone)]
pub struct SessionManager {
    repo: Repository,
    notifier: Arc<dyn Notifier>,
    ttls: SessionTtls,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("ttls", &self.ttls)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    #[must_use]
    pub fn new(repo: Repository, notifier: Arc<dyn Notifier>) -> Self {
        Self::with_ttls(repo, notifier, SessionTtls::default())
    }

    #[must_use]
    pub fn with_ttls(repo: Repository, notifier: Arc<dyn Notifier>, ttls: SessionTtls) -> Self {
        Self {
            repo,
            notifier,
            ttls,
        }
    }

    #[must_use]
    pub fn ttls(&self) -> SessionTtls {
        self.ttls
    }

    fn new_refresh_token(&self, user_id: Uuid, now: DateTime<Utc>) -> (String, RefreshToken) {
        let token = random_token(TOKEN_BYTES);
        let record = RefreshToken {
            token_hash: token_digest(&token),
            user_id,
            expires_at: now + self.ttls.refresh,
            revoked_at: None,
            created_at: now,
        };
        (token, record)
    }

    /// Issue a new refresh token for `user_id`.
    ///
    /// Returns the plaintext token. It is not retrievable afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Repository`] if persisting fails.
    pub async fn create_session(&self, user_id: Uuid) -> Result<String, SessionError> {
        let (token, record) = self.new_refresh_token(user_id, Utc::now());

        let mut batch = self.repo.batch();
        batch.insert_refresh_token(&record)?;
        self.repo.commit(batch).await?;

        info!(%user_id, "session created");
        Ok(token)
    }

    async fn live_refresh_token(&self, token: &str) -> Result<RefreshToken, SessionError> {
        let record = self
            .repo
            .refresh_token(&token_digest(token))
            .await?
            .ok_or(SessionError::InvalidToken)?;

        if record.is_revoked() {
            return Err(SessionError::Revoked);
        }
        if Utc::now() > record.expires_at {
            return Err(SessionError::Expired);
        }
        Ok(record)
    }

    /// Resolve a refresh token to its user.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidToken`] if the token is unknown or its user no longer exists.
    /// - [`SessionError::Revoked`] if the token was revoked.
    /// - [`SessionError::Expired`] if the token is past its expiry.
    pub async fn validate_refresh_token(&self, token: &str) -> Result<User, SessionError> {
        let record = self.live_refresh_token(token).await?;
        self.repo
            .user(record.user_id)
            .await?
            .ok_or(SessionError::InvalidToken)
    }

    /// Validate `token`, revoke it, and issue a replacement in one commit.
    ///
    /// Of two concurrent rotations of the same token only one succeeds; the
    /// other sees [`SessionError::Revoked`].
    ///
    /// # Errors
    ///
    /// Same as [`validate_refresh_token`](Self::validate_refresh_token).
    pub async fn rotate_refresh_token(&self, token: &str) -> Result<(User, String), SessionError> {
        let mut record = self.live_refresh_token(token).await?;
        let user = self
            .repo
            .user(record.user_id)
            .await?
            .ok_or(SessionError::InvalidToken)?;

        let now = Utc::now();
        record.revoked_at = Some(now);
        let (replacement, new_record) = self.new_refresh_token(user.id, now);

        let mut batch = self.repo.batch();
        batch.consume_refresh_token(&record)?;
        batch.insert_refresh_token(&new_record)?;
        self.repo.commit(batch).await.map_err(|e| match e {
            RepositoryError::Stale { .. } => SessionError::Revoked,
            other => SessionError::Repository(other),
        })?;

        info!(user_id = %user.id, "session rotated");
        Ok((user, replacement))
    }

    /// Revoke a refresh token. Unknown or already revoked tokens succeed.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Repository`] if storage fails.
    pub async fn logout(&self, token: &str) -> Result<(), SessionError> {
        let Some(mut record) = self.repo.refresh_token(&token_digest(token)).await? else {
            return Ok(());
        };
        if record.is_revoked() {
            return Ok(());
        }

        record.revoked_at = Some(Utc::now());
        let mut batch = self.repo.batch();
        batch.consume_refresh_token(&record)?;
        match self.repo.commit(batch).await {
            Ok(()) => {}
            // Revoked by a concurrent logout or rotation.
            Err(RepositoryError::Stale { .. }) => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        info!(user_id = %record.user_id, "session revoked");
        Ok(())
    }

    /// Queue revocation of every live refresh token of `user_id` into `batch`.
    async fn stage_revoke_all(
        &self,
        batch: &mut Batch,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<usize, RepositoryError> {
        let mut revoked = 0;
        for mut record in self.repo.refresh_tokens_of(user_id).await? {
            if record.is_revoked() {
                continue;
            }
            record.revoked_at = Some(now);
            batch.revoke_refresh_token(&record)?;
            revoked += 1;
        }
        Ok(revoked)
    }

    /// Revoke every session of `user_id`, returning how many were live.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Repository`] if storage fails.
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<usize, SessionError> {
        let mut batch = self.repo.batch();
        let revoked = self.stage_revoke_all(&mut batch, user_id, Utc::now()).await?;
        self.repo.commit(batch).await?;
        if revoked > 0 {
            info!(%user_id, revoked, "all sessions revoked");
        }
        Ok(revoked)
    }

    /// Start a password reset for `email`.
    ///
    /// Succeeds silently when no user has that email, so callers cannot
    /// discover which addresses are registered. Otherwise a fresh token replaces any
    /// outstanding one and is sent through the notifier.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Repository`] if storage fails or
    /// [`SessionError::Notify`] if delivery fails.
    pub async fn issue_password_reset(&self, email: &str) -> Result<(), SessionError> {
        let Some(user) = self.repo.user_by_email(email).await? else {
            return Ok(());
        };

        let token = random_token(TOKEN_BYTES);
        let now = Utc::now();
        let mut updated = user.clone();
        updated.reset_token_hash = Some(token_digest(&token));
        updated.reset_token_expires_at = Some(now + self.ttls.password_reset);
        updated.updated_at = now;

        let mut batch = self.repo.batch();
        batch.update_user(&user, &updated)?;
        self.repo.commit(batch).await?;

        self.notifier
            .notify(&Notification::PasswordReset {
                to: updated.email.clone(),
                token,
            })
            .await?;

        info!(user_id = %updated.id, "password reset issued");
        Ok(())
    }

    /// Set a new password using a reset token, then invalidate the token and
    /// every existing session of the user.
    ///
    /// The token is consumed in the same commit as the password change, so
    /// concurrent calls with one token succeed at most once.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidOrExpired`] if the token is unknown or expired.
    /// - [`SessionError::Password`] if the new password fails policy.
    /// - [`SessionError::Repository`] if storage fails.
    pub async fn consume_password_reset(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<(), SessionError> {
        let digest = token_digest(token);
        let user = self
            .repo
            .user_by_reset_digest(&digest)
            .await?
            .ok_or(SessionError::InvalidOrExpired)?;

        let now = Utc::now();
        let live = user.reset_token_hash.as_deref() == Some(digest.as_str())
            && user.reset_token_expires_at.is_some_and(|exp| now <= exp);
        if !live {
            return Err(SessionError::InvalidOrExpired);
        }

        password::check_policy(new_password)?;
        let password_hash = password::hash_password(new_password)?;

        let mut updated = user.clone();
        updated.password_hash = password_hash;
        updated.reset_token_hash = None;
        updated.reset_token_expires_at = None;
        updated.updated_at = now;

        let mut batch = self.repo.batch();
        batch.update_user(&user, &updated)?;
        let revoked = self.stage_revoke_all(&mut batch, user.id, now).await?;
        self.repo.commit(batch).await.map_err(|e| match e {
            RepositoryError::Stale { .. } => SessionError::InvalidOrExpired,
            other => SessionError::Repository(other),
        })?;

        info!(user_id = %user.id, revoked, "password reset completed");
        Ok(())
    }

    /// Persist an invitation to `org` for `email` and send its token.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Repository`] if storage fails or
    /// [`SessionError::Notify`] if delivery fails.
    pub async fn create_invitation(
        &self,
        org: &Organization,
        email: &str,
        role: Role,
        invited_by: Uuid,
    ) -> Result<Invitation, SessionError> {
        let token = random_token(TOKEN_BYTES);
        let now = Utc::now();
        let invitation = Invitation {
            id: Uuid::new_v4(),
            organization_id: org.id,
            email: normalize_email(email),
            role,
            invited_by,
            token_hash: token_digest(&token),
            expires_at: now + self.ttls.invitation,
            created_at: now,
        };

        let mut batch = self.repo.batch();
        batch.insert_invitation(&invitation)?;
        self.repo.commit(batch).await?;

        self.notifier
            .notify(&Notification::Invitation {
                to: invitation.email.clone(),
                token,
                organization: org.name.clone(),
                role,
            })
            .await?;

        info!(org_id = %org.id, invitation_id = %invitation.id, %role, "invitation created");
        Ok(invitation)
    }

    /// Redeem an invitation for `user_id`.
    ///
    /// The membership is created and the invitation consumed in one commit,
    /// so an invitation is redeemed at most once.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidOrExpired`] if the token is unknown or expired.
    /// - [`SessionError::AlreadyMember`] if the user already belongs to the organization.
    /// - [`SessionError::Repository`] if storage fails.
    pub async fn accept_invitation(
        &self,
        token: &str,
        user_id: Uuid,
    ) -> Result<Membership, SessionError> {
        let invitation = self
            .repo
            .invitation(&token_digest(token))
            .await?
            .ok_or(SessionError::InvalidOrExpired)?;

        if Utc::now() > invitation.expires_at {
            warn!(invitation_id = %invitation.id, "expired invitation presented");
            return Err(SessionError::InvalidOrExpired);
        }
        if self
            .repo
            .organization(invitation.organization_id)
            .await?
            .is_none()
        {
            return Err(SessionError::InvalidOrExpired);
        }

        let membership = Membership {
            scope: ScopeKind::Organization,
            scope_id: invitation.organization_id,
            user_id,
            role: invitation.role,
            created_at: Utc::now(),
        };

        let mut batch = self.repo.batch();
        batch.insert_membership(&membership)?;
        batch.consume_invitation(&invitation);
        self.repo.commit(batch).await.map_err(|e| match e {
            RepositoryError::Conflict { .. } => SessionError::AlreadyMember,
            RepositoryError::Stale { .. } => SessionError::InvalidOrExpired,
            other => SessionError::Repository(other),
        })?;

        info!(
            org_id = %membership.scope_id,
            %user_id,
            role = %membership.role,
            "invitation accepted"
        );
        Ok(membership)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use envm_storage::MemoryBackend;

    use super::*;
    use crate::notify::MemoryNotifier;

    struct Fixture {
        repo: Repository,
        notifier: MemoryNotifier,
        sessions: SessionManager,
    }

    fn fixture_with(ttls: SessionTtls) -> Fixture {
        let repo = Repository::new(Arc::new(MemoryBackend::new()));
        let notifier = MemoryNotifier::new();
        let sessions = SessionManager::with_ttls(repo.clone(), Arc::new(notifier.clone()), ttls);
        Fixture {
            repo,
            notifier,
            sessions,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(SessionTtls::default())
    }

    async fn seed_user(repo: &Repository, email: &str, password: &str) -> User {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_owned(),
            full_name: "Grace".to_owned(),
            password_hash: password::hash_password(password).unwrap(),
            reset_token_hash: None,
            reset_token_expires_at: None,
            created_at: now,
            updated_at: now,
        };
        let mut batch = repo.batch();
        batch.insert_user(&user).unwrap();
        repo.commit(batch).await.unwrap();
        user
    }

    async fn seed_org(repo: &Repository, name: &str) -> Organization {
        let now = Utc::now();
        let org = Organization {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            slug: name.to_lowercase(),
            created_at: now,
            updated_at: now,
        };
        let mut batch = repo.batch();
        batch.insert_organization(&org).unwrap();
        repo.commit(batch).await.unwrap();
        org
    }

    #[tokio::test]
    async fn session_token_is_32_random_bytes_hex() {
        let f = fixture();
        let user = seed_user(&f.repo, "a@example.com", "password1").await;
        let token = f.sessions.create_session(user.id).await.unwrap();

        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(f.sessions.validate_refresh_token(&token).await.unwrap().id, user.id);
    }

    #[tokio::test]
    async fn unknown_token_is_invalid() {
        let f = fixture();
        assert!(matches!(
            f.sessions.validate_refresh_token("deadbeef").await,
            Err(SessionError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn logout_revokes_and_is_idempotent() {
        let f = fixture();
        let user = seed_user(&f.repo, "a@example.com", "password1").await;
        let token = f.sessions.create_session(user.id).await.unwrap();

        f.sessions.logout(&token).await.unwrap();
        f.sessions.logout(&token).await.unwrap();
        f.sessions.logout("never-issued").await.unwrap();

        assert!(matches!(
            f.sessions.validate_refresh_token(&token).await,
            Err(SessionError::Revoked)
        ));
    }

    #[tokio::test]
    async fn expired_token_is_distinguished() {
        let f = fixture_with(SessionTtls {
            refresh: Duration::seconds(-1),
            ..SessionTtls::default()
        });
        let user = seed_user(&f.repo, "a@example.com", "password1").await;
        let token = f.sessions.create_session(user.id).await.unwrap();

        assert!(matches!(
            f.sessions.validate_refresh_token(&token).await,
            Err(SessionError::Expired)
        ));
    }

    #[tokio::test]
    async fn rotation_revokes_the_old_token() {
        let f = fixture();
        let user = seed_user(&f.repo, "a@example.com", "password1").await;
        let old = f.sessions.create_session(user.id).await.unwrap();

        let (rotated_user, new) = f.sessions.rotate_refresh_token(&old).await.unwrap();
        assert_eq!(rotated_user.id, user.id);
        assert_ne!(old, new);
        assert!(matches!(
            f.sessions.validate_refresh_token(&old).await,
            Err(SessionError::Revoked)
        ));
        assert!(f.sessions.validate_refresh_token(&new).await.is_ok());
    }

    #[tokio::test]
    async fn password_reset_for_unknown_email_is_silent() {
        let f = fixture();
        f.sessions
            .issue_password_reset("nobody@example.com")
            .await
            .unwrap();
        assert!(f.notifier.sent().await.is_empty());
    }

    #[tokio::test]
    async fn password_reset_changes_password_and_kills_sessions() {
        let f = fixture();
        let user = seed_user(&f.repo, "a@example.com", "password1").await;
        let session = f.sessions.create_session(user.id).await.unwrap();

        f.sessions.issue_password_reset("a@example.com").await.unwrap();
        let sent = f.notifier.last_to("a@example.com").await.unwrap();
        let token = sent.token().to_owned();

        f.sessions
            .consume_password_reset(&token, "new-password")
            .await
            .unwrap();

        let stored = f.repo.user(user.id).await.unwrap().unwrap();
        assert!(password::verify_password("new-password", &stored.password_hash));
        assert!(stored.reset_token_hash.is_none());
        assert!(matches!(
            f.sessions.validate_refresh_token(&session).await,
            Err(SessionError::Revoked)
        ));

        // Single use.
        assert!(matches!(
            f.sessions.consume_password_reset(&token, "another-one").await,
            Err(SessionError::InvalidOrExpired)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_password_resets_with_one_token_succeed_once() {
        let f = fixture();
        seed_user(&f.repo, "a@example.com", "password1").await;
        f.sessions.issue_password_reset("a@example.com").await.unwrap();
        let token = f
            .notifier
            .last_to("a@example.com")
            .await
            .unwrap()
            .token()
            .to_owned();

        let handles: Vec<_> = ["first-password", "second-password"]
            .into_iter()
            .map(|password| {
                let sessions = f.sessions.clone();
                let token = token.clone();
                tokio::spawn(async move { sessions.consume_password_reset(&token, password).await })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => successes += 1,
                Err(e) => assert!(matches!(e, SessionError::InvalidOrExpired)),
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_rotations_of_one_token_yield_one_successor() {
        let f = fixture();
        let user = seed_user(&f.repo, "a@example.com", "password1").await;
        let token = f.sessions.create_session(user.id).await.unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let sessions = f.sessions.clone();
                let token = token.clone();
                tokio::spawn(async move { sessions.rotate_refresh_token(&token).await })
            })
            .collect();

        let mut successors = Vec::new();
        for handle in handles {
            if let Ok((_, next)) = handle.await.unwrap() {
                successors.push(next);
            }
        }
        assert_eq!(successors.len(), 1);

        let live = f
            .repo
            .refresh_tokens_of(user.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|t| !t.is_revoked())
            .count();
        assert_eq!(live, 1);
    }

    #[tokio::test]
    async fn reissued_reset_token_replaces_the_previous_one() {
        let f = fixture();
        seed_user(&f.repo, "a@example.com", "password1").await;

        f.sessions.issue_password_reset("a@example.com").await.unwrap();
        let first = f.notifier.last_to("a@example.com").await.unwrap();
        f.sessions.issue_password_reset("a@example.com").await.unwrap();

        assert!(matches!(
            f.sessions
                .consume_password_reset(first.token(), "new-password")
                .await,
            Err(SessionError::InvalidOrExpired)
        ));
    }

    #[tokio::test]
    async fn expired_reset_token_is_rejected_generically() {
        let f = fixture_with(SessionTtls {
            password_reset: Duration::seconds(-1),
            ..SessionTtls::default()
        });
        seed_user(&f.repo, "a@example.com", "password1").await;
        f.sessions.issue_password_reset("a@example.com").await.unwrap();
        let sent = f.notifier.last_to("a@example.com").await.unwrap();

        assert!(matches!(
            f.sessions
                .consume_password_reset(sent.token(), "new-password")
                .await,
            Err(SessionError::InvalidOrExpired)
        ));
    }

    #[tokio::test]
    async fn accepting_invitation_creates_membership_once() {
        let f = fixture();
        let acme = seed_org(&f.repo, "Acme").await;
        let invitee = seed_user(&f.repo, "b@example.com", "password1").await;

        f.sessions
            .create_invitation(&acme, "B@example.com", Role::Member, Uuid::new_v4())
            .await
            .unwrap();
        let sent = f.notifier.last_to("b@example.com").await.unwrap();

        let membership = f
            .sessions
            .accept_invitation(sent.token(), invitee.id)
            .await
            .unwrap();
        assert_eq!(membership.role, Role::Member);
        assert_eq!(membership.scope_id, acme.id);

        // The invitation is consumed.
        assert!(matches!(
            f.sessions.accept_invitation(sent.token(), invitee.id).await,
            Err(SessionError::InvalidOrExpired)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn invitation_is_redeemed_by_one_of_two_concurrent_users() {
        let f = fixture();
        let acme = seed_org(&f.repo, "Acme").await;
        let first = seed_user(&f.repo, "b@example.com", "password1").await;
        let second = seed_user(&f.repo, "c@example.com", "password1").await;
        f.sessions
            .create_invitation(&acme, "b@example.com", Role::Admin, Uuid::new_v4())
            .await
            .unwrap();
        let token = f
            .notifier
            .last_to("b@example.com")
            .await
            .unwrap()
            .token()
            .to_owned();

        let handles: Vec<_> = [first.id, second.id]
            .into_iter()
            .map(|user_id| {
                let sessions = f.sessions.clone();
                let token = token.clone();
                tokio::spawn(async move { sessions.accept_invitation(&token, user_id).await })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
    }

    #[tokio::test]
    async fn expired_invitation_is_rejected() {
        let f = fixture_with(SessionTtls {
            invitation: Duration::seconds(-1),
            ..SessionTtls::default()
        });
        let acme = seed_org(&f.repo, "Acme").await;
        f.sessions
            .create_invitation(&acme, "b@example.com", Role::Admin, Uuid::new_v4())
            .await
            .unwrap();
        let sent = f.notifier.last_to("b@example.com").await.unwrap();

        assert!(matches!(
            f.sessions.accept_invitation(sent.token(), Uuid::new_v4()).await,
            Err(SessionError::InvalidOrExpired)
        ));
    }
}
