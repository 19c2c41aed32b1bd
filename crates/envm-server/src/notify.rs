//! Notifier selection and SMTP delivery.
//!
//! With the `smtp` feature and `SMTP_HOST` set, invitations and password
//! resets are mailed through an SMTP relay. Otherwise they go to the log.

use std::sync::Arc;

use envm_core::error::NotifyError;
use envm_core::notify::{LogNotifier, Notifier};
use tracing::info;

use crate::config::ServerConfig;

/// Pick the notifier for this configuration.
///
/// # Errors
///
/// Returns [`NotifyError`] if the SMTP relay settings are unusable.
pub fn from_config(config: &ServerConfig) -> Result<Arc<dyn Notifier>, NotifyError> {
    match &config.smtp {
        #[cfg(feature = "smtp")]
        Some(relay) => {
            info!(host = %relay.host, port = relay.port, "using SMTP notifier");
            Ok(Arc::new(smtp::SmtpNotifier::new(relay)?))
        }
        #[cfg(not(feature = "smtp"))]
        Some(_) => {
            tracing::warn!("SMTP_HOST is set but the server was built without the 'smtp' feature; notifications go to the log");
            Ok(Arc::new(LogNotifier))
        }
        None => {
            info!("no SMTP relay configured; notifications go to the log");
            Ok(Arc::new(LogNotifier))
        }
    }
}

#[cfg(feature = "smtp")]
mod smtp {
    use std::time::Duration;

    use envm_core::error::NotifyError;
    use envm_core::notify::{Notification, Notifier};
    use lettre::message::Mailbox;
    use lettre::message::header::ContentType;
    use lettre::transport::smtp::authentication::Credentials;
    use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

    use crate::config::SmtpConfig;

    /// Sends notifications as plain-text mail over STARTTLS.
    pub struct SmtpNotifier {
        mailer: AsyncSmtpTransport<Tokio1Executor>,
        from: Mailbox,
    }

    fn address(raw: &str) -> Result<Mailbox, NotifyError> {
        raw.parse().map_err(|_| NotifyError::InvalidAddress {
            address: raw.to_owned(),
        })
    }

    impl SmtpNotifier {
        pub fn new(config: &SmtpConfig) -> Result<Self, NotifyError> {
            let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| NotifyError::Delivery {
                    reason: e.to_string(),
                })?
                .port(config.port)
                .timeout(Some(Duration::from_secs(10)));

            if let (Some(user), Some(password)) = (&config.username, &config.password) {
                builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
            }

            Ok(Self {
                mailer: builder.build(),
                from: address(&config.from)?,
            })
        }
    }

    #[async_trait::async_trait]
    impl Notifier for SmtpNotifier {
        async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
            let message = Message::builder()
                .from(self.from.clone())
                .to(address(notification.recipient())?)
                .subject(notification.subject())
                .header(ContentType::TEXT_PLAIN)
                .body(notification.body())
                .map_err(|e| NotifyError::Delivery {
                    reason: e.to_string(),
                })?;

            self.mailer
                .send(message)
                .await
                .map_err(|e| NotifyError::Delivery {
                    reason: e.to_string(),
                })?;

            tracing::info!(to = notification.recipient(), "notification mailed");
            Ok(())
        }
    }
}
