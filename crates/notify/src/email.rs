//! SMTP email notifier via `lettre`.
//!
//! Sends owner notifications to the configured owner addresses. Port 465
//! uses implicit TLS; other ports use STARTTLS unless TLS is disabled.

use cadence_core::config::NotifyConfig;
use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};

use crate::traits::{Notification, Notifier, NotifyError};

const DEFAULT_SMTP_PORT: u16 = 587;
const IMPLICIT_TLS_PORT: u16 = 465;

/// Sends notifications as plain-text emails via SMTP.
#[derive(Debug)]
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailNotifier {
    /// Build an `EmailNotifier` from explicit SMTP settings.
    ///
    /// Without `credentials` the connection is unauthenticated.
    pub fn from_config(
        smtp_host: &str,
        smtp_port: Option<u16>,
        tls: bool,
        credentials: Option<(&str, &str)>,
        from: &str,
        to: &[String],
    ) -> Result<Self, NotifyError> {
        let from_mailbox = parse_mailbox(from)?;
        let to_mailboxes = to
            .iter()
            .map(|addr| parse_mailbox(addr))
            .collect::<Result<Vec<_>, _>>()?;

        if to_mailboxes.is_empty() {
            return Err(NotifyError::Config(
                "at least one owner email is required".to_string(),
            ));
        }

        let port = smtp_port.unwrap_or(DEFAULT_SMTP_PORT);
        let mut builder = if port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(port)
        } else if tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(smtp_host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host).port(port)
        };

        if let Some((username, password)) = credentials {
            builder = builder.credentials(Credentials::new(username.to_string(), password.to_string()));
        }

        Ok(Self {
            transport: builder.build(),
            from: from_mailbox,
            to: to_mailboxes,
        })
    }

    /// Build from the `SMTP_*` / `NOTIFY_OWNER_EMAILS` configuration.
    pub fn from_notify_config(config: &NotifyConfig) -> Result<Self, NotifyError> {
        let host = config
            .smtp_host
            .as_deref()
            .ok_or_else(|| NotifyError::Config("SMTP_HOST is not set".to_string()))?;
        let from = config
            .smtp_from
            .as_deref()
            .ok_or_else(|| NotifyError::Config("SMTP_FROM is not set".to_string()))?;
        Self::from_config(
            host,
            config.smtp_port,
            config.smtp_tls,
            config.smtp_credentials(),
            from,
            &config.owner_emails,
        )
    }

    pub fn recipient_count(&self) -> usize {
        self.to.len()
    }
}

fn parse_mailbox(addr: &str) -> Result<Mailbox, NotifyError> {
    addr.parse()
        .map_err(|e: lettre::address::AddressError| NotifyError::Config(format!("{addr}: {e}")))
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut message_builder = Message::builder().from(self.from.clone());
        for recipient in &self.to {
            message_builder = message_builder.to(recipient.clone());
        }

        let email = message_builder
            .subject(&notification.subject)
            .body(notification.body.clone())
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        tracing::debug!(
            channel = "email",
            subject = %notification.subject,
            recipients = self.to.len(),
            "notification delivered"
        );

        Ok(())
    }

    fn channel_name(&self) -> &str {
        "email"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owners() -> Vec<String> {
        vec!["manager@example.com".to_string()]
    }

    #[test]
    fn parse_mailbox_with_display_name() {
        let mb = parse_mailbox("Care Compliance <audits@example.com>").unwrap();
        assert_eq!(mb.email.to_string(), "audits@example.com");
    }

    #[test]
    fn from_config_valid() {
        let notifier =
            EmailNotifier::from_config("smtp.example.com", Some(587), true, None, "audits@example.com", &owners())
                .unwrap();
        assert_eq!(notifier.recipient_count(), 1);
        assert_eq!(notifier.channel_name(), "email");
    }

    #[test]
    fn from_config_invalid_from_address() {
        let err = EmailNotifier::from_config("smtp.example.com", None, true, None, "bad-address", &owners())
            .unwrap_err()
            .to_string();
        assert!(err.contains("Configuration error"), "got: {err}");
    }

    #[test]
    fn from_config_invalid_owner_address() {
        let result = EmailNotifier::from_config(
            "smtp.example.com",
            None,
            true,
            None,
            "audits@example.com",
            &["not-valid".to_string()],
        );
        assert!(result.is_err());
    }

    #[test]
    fn from_config_requires_an_owner() {
        let err = EmailNotifier::from_config("smtp.example.com", None, true, None, "audits@example.com", &[])
            .unwrap_err()
            .to_string();
        assert!(err.contains("at least one owner"), "got: {err}");
    }

    #[test]
    fn from_config_implicit_tls_and_plain_ports() {
        assert!(EmailNotifier::from_config("smtp.example.com", Some(465), true, None, "audits@example.com", &owners()).is_ok());
        assert!(EmailNotifier::from_config("localhost", Some(25), false, None, "audits@example.com", &owners()).is_ok());
    }

    #[test]
    fn from_notify_config_with_credentials() {
        let config = NotifyConfig {
            smtp_host: Some("smtp.example.com".to_string()),
            smtp_tls: true,
            smtp_from: Some("audits@example.com".to_string()),
            smtp_username: Some("mailer".to_string()),
            smtp_password: Some("s3cret".to_string()),
            owner_emails: owners(),
            ..NotifyConfig::default()
        };
        let notifier = EmailNotifier::from_notify_config(&config).unwrap();
        assert_eq!(notifier.recipient_count(), 1);
    }

    #[test]
    fn from_notify_config_requires_host() {
        let config = NotifyConfig {
            smtp_from: Some("audits@example.com".to_string()),
            owner_emails: owners(),
            ..NotifyConfig::default()
        };
        assert!(EmailNotifier::from_notify_config(&config).is_err());
    }
}
