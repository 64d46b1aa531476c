//! Outgoing email.
//!
//! Handlers and services talk to a [`Mailer`]; the binary picks
//! [`SmtpMailer`] when SMTP is configured and [`LogMailer`] otherwise.

use std::sync::Arc;

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    address::AddressError,
    message::{Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::{self, authentication::Credentials},
};

use crate::config::EmailConfig;

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("{0} not configured")]
    NotConfigured(&'static str),

    #[error("invalid address: {0}")]
    Address(#[from] AddressError),

    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("smtp: {0}")]
    Smtp(#[from] smtp::Error),
}

pub type Result<T> = std::result::Result<T, EmailError>;

/// A rendered email with plain text and HTML bodies.
#[derive(Debug, Clone, PartialEq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<()>;
}

/// Sends through an SMTP relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Build the transport once; connections are opened per send.
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let smtp_host = config
            .smtp_host
            .as_deref()
            .ok_or(EmailError::NotConfigured("SMTP host"))?;
        let from_address = config
            .from_address
            .as_deref()
            .ok_or(EmailError::NotConfigured("From address"))?;

        let from: Mailbox = format!("{} <{}>", config.from_name, from_address).parse()?;

        let builder = if config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host)
        }
        .port(config.smtp_port);

        let builder = if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            builder
        };

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        let to: Mailbox = email.to.parse()?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.clone())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(email.text.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(email.html.clone()),
                    ),
            )?;

        self.transport.send(message).await?;

        tracing::info!(to = %email.to, subject = %email.subject, "Email sent successfully");
        Ok(())
    }
}

/// Used when SMTP is not configured: logs and drops every email.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        tracing::warn!(
            to = %email.to,
            subject = %email.subject,
            "Email not configured, skipping email"
        );
        Ok(())
    }
}

/// Pick the mailer for the given settings.
pub fn mailer_from_config(config: &EmailConfig) -> Result<Arc<dyn Mailer>> {
    if config.is_configured() {
        Ok(Arc::new(SmtpMailer::new(config)?))
    } else {
        Ok(Arc::new(LogMailer))
    }
}
