//! Outbound messages for password resets and invitations.
//!
//! The [`Notifier`] trait is the seam between the session manager and a
//! delivery channel. [`LogNotifier`] writes messages to the tracing log for
//! local development; [`MemoryNotifier`] keeps them in memory for tests. The
//! server provides an SMTP implementation.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::authz::Role;
use crate::error::NotifyError;

/// A message the system needs to deliver to an email address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Carries a single-use password-reset token.
    PasswordReset { to: String, token: String },
    /// Carries an organization invitation token.
    Invitation {
        to: String,
        token: String,
        organization: String,
        role: Role,
    },
}

impl Notification {
    /// Destination address.
    #[must_use]
    pub fn recipient(&self) -> &str {
        match self {
            Self::PasswordReset { to, .. } | Self::Invitation { to, .. } => to,
        }
    }

    /// The opaque token the recipient must present.
    #[must_use]
    pub fn token(&self) -> &str {
        match self {
            Self::PasswordReset { token, .. } | Self::Invitation { token, .. } => token,
        }
    }

    #[must_use]
    pub fn subject(&self) -> String {
        match self {
            Self::PasswordReset { .. } => "Reset your envm password".to_owned(),
            Self::Invitation { organization, .. } => {
                format!("You have been invited to {organization} on envm")
            }
        }
    }

    /// Plain-text body.
    #[must_use]
    pub fn body(&self) -> String {
        match self {
            Self::PasswordReset { token, .. } => format!(
                "Someone requested a password reset for your envm account.\n\n\
                 Reset token: {token}\n\n\
                 Run `envm reset-password --token {token}` within one hour.\n\
                 If this wasn't you, ignore this message."
            ),
            Self::Invitation {
                token,
                organization,
                role,
                ..
            } => format!(
                "You have been invited to join {organization} as {role}.\n\n\
                 Invitation token: {token}\n\n\
                 Accept it with `envm orgs join --token {token}` within seven days."
            ),
        }
    }
}

/// Delivers [`Notification`]s.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync + 'static {
    /// Deliver one message.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] if the message could not be handed to the
    /// delivery channel.
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log instead of sending them.
///
/// Intended for development. The log line contains the token.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            to = notification.recipient(),
            subject = %notification.subject(),
            body = %notification.body(),
            "notification (log delivery)"
        );
        Ok(())
    }
}

/// Records notifications in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl MemoryNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every notification delivered so far, oldest first.
    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }

    /// The most recent notification addressed to `email`.
    pub async fn last_to(&self, email: &str) -> Option<Notification> {
        self.sent
            .lock()
            .await
            .iter()
            .rev()
            .find(|n| n.recipient().eq_ignore_ascii_case(email))
            .cloned()
    }
}

#[async_trait::async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().await.push(notification.clone());
        Ok(())
    }
}
