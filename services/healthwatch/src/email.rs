//! Email notifications over SMTP

use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::NotifierConfig;
use crate::notifier::{Notification, Notifier};
use crate::HealthwatchError;

/// Hands a finished message to a mail server
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: Message) -> crate::Result<()>;
}

/// SMTP submission with STARTTLS and a login
pub struct SmtpMailTransport {
    server: String,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl std::fmt::Debug for SmtpMailTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailTransport")
            .field("server", &self.server)
            .finish()
    }
}

impl SmtpMailTransport {
    pub fn new(server: &str, port: u16, username: &str, password: &str) -> crate::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(server)
            .map_err(|e| HealthwatchError::Notifier(format!("SMTP relay {}: {}", server, e)))?
            .port(port)
            .credentials(Credentials::new(username.to_string(), password.to_string()))
            .build();

        tracing::debug!("Created SMTP transport for {}:{}", server, port);
        Ok(Self {
            server: server.to_string(),
            transport,
        })
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(&self, message: Message) -> crate::Result<()> {
        self.transport.send(message).await.map_err(|e| {
            HealthwatchError::Notifier(format!("SMTP delivery via {} failed: {}", self.server, e))
        })?;
        Ok(())
    }
}

pub(crate) fn parse_mailbox(address: &str) -> crate::Result<Mailbox> {
    address.parse().map_err(|e| {
        HealthwatchError::Config(format!("invalid email address '{}': {}", address, e))
    })
}

/// Email notification sender
pub struct EmailNotifier {
    from: Mailbox,
    recipients: Vec<Mailbox>,
    transport: Arc<dyn MailTransport>,
}

impl std::fmt::Debug for EmailNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailNotifier")
            .field("from", &self.from.to_string())
            .field("recipients", &self.recipients.len())
            .finish()
    }
}

impl EmailNotifier {
    /// Sender over SMTP, built from an `email` notifier config
    pub fn from_config(config: &NotifierConfig) -> crate::Result<Self> {
        let NotifierConfig::Email {
            smtp_server,
            smtp_port,
            username,
            password,
            ..
        } = config
        else {
            return Err(not_email(config));
        };
        let transport = SmtpMailTransport::new(smtp_server, *smtp_port, username, password)?;
        Self::new(config, Arc::new(transport))
    }

    pub fn new(config: &NotifierConfig, transport: Arc<dyn MailTransport>) -> crate::Result<Self> {
        let NotifierConfig::Email {
            username,
            from,
            recipients,
            ..
        } = config
        else {
            return Err(not_email(config));
        };

        // The login doubles as the sender unless one is given
        let from = parse_mailbox(from.as_deref().unwrap_or(username))?;
        let recipients = recipients
            .iter()
            .map(|r| parse_mailbox(r))
            .collect::<crate::Result<Vec<_>>>()?;

        Ok(Self {
            from,
            recipients,
            transport,
        })
    }

    fn message(&self, notification: &Notification) -> crate::Result<Message> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(notification.title.as_str())
            .header(ContentType::TEXT_PLAIN);
        for recipient in &self.recipients {
            builder = builder.to(recipient.clone());
        }

        builder
            .body(notification.message.clone())
            .map_err(|e| HealthwatchError::Notifier(format!("Building email: {}", e)))
    }
}

fn not_email(config: &NotifierConfig) -> HealthwatchError {
    HealthwatchError::Config(format!(
        "expected an email notifier, got '{}'",
        config.type_name()
    ))
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn type_name(&self) -> &str {
        "email"
    }

    async fn notify(&self, notification: &Notification) -> crate::Result<()> {
        let message = self.message(notification)?;
        tracing::debug!(
            "Sending email '{}' to {} recipient(s)",
            notification.title,
            self.recipients.len()
        );
        self.transport.send(message).await?;
        tracing::debug!("Email notification sent successfully");
        Ok(())
    }
}
