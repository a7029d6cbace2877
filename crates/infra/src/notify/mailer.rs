use std::time::Duration;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::NotifyError;
use crate::config::SmtpConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), NotifyError>;
}

/// Logs instead of sending. Used when no SMTP host is configured.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), NotifyError> {
        tracing::info!(to = %email.to, subject = %email.subject, "email (not sent: no SMTP configured)");
        Ok(())
    }
}

/// STARTTLS SMTP relay via lettre.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, NotifyError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| NotifyError::Mail(e.to_string()))?
            .timeout(Some(Duration::from_secs(config.timeout_secs)));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        tracing::info!(host = %config.host, timeout_secs = config.timeout_secs, "SMTP mailer initialized");

        Ok(Self {
            transport: builder.build(),
            from: config.from.clone(),
        })
    }

    fn build_message(&self, email: &OutgoingEmail) -> Result<Message, NotifyError> {
        let from: Mailbox = self
            .from
            .parse()
            .map_err(|e| NotifyError::Mail(format!("invalid from address: {e}")))?;
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| NotifyError::Mail(format!("invalid recipient: {e}")))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .map_err(|e| NotifyError::Mail(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), NotifyError> {
        let message = self.build_message(email)?;
        tracing::debug!(to = %email.to, subject = %email.subject, "sending email via SMTP");
        self.transport
            .send(message)
            .await
            .map_err(|e| NotifyError::Mail(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send(&self, _email: &OutgoingEmail) -> Result<(), NotifyError> {
            Err(NotifyError::Mail("smtp down".to_string()))
        }
    }

    fn smtp() -> SmtpMailer {
        SmtpMailer::new(&SmtpConfig {
            host: "smtp.example.com".to_string(),
            username: None,
            password: None,
            from: "Job Board <no-reply@example.com>".to_string(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn message_builds_with_named_from() {
        let email = OutgoingEmail {
            to: "owner@example.com".to_string(),
            subject: "Your job is live".to_string(),
            body: "hello".to_string(),
        };
        assert!(smtp().build_message(&email).is_ok());
    }

    #[tokio::test]
    async fn bad_recipient_is_a_mail_error() {
        let email = OutgoingEmail {
            to: "not an address".to_string(),
            subject: "s".to_string(),
            body: "b".to_string(),
        };
        assert!(matches!(smtp().build_message(&email), Err(NotifyError::Mail(_))));
    }
}
