use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use std::sync::Arc;

use crate::config::AppConfig;

/// MailError
///
/// Failures of the email collaborator. Delivery is a synchronous call inside
/// the signup request, so these surface as a 500 on that endpoint only.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("smtp transport error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Mailer
///
/// Contract for confirmation-code delivery. Swappable between the SMTP
/// implementation in production, the log-only implementation locally, and an
/// in-memory mock in tests, without affecting the signup handler.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_confirmation_code(
        &self,
        to: &str,
        username: &str,
        code: &str,
    ) -> Result<(), MailError>;
}

/// Shared handle to the mailer, stored in the application state.
pub type MailerState = Arc<dyn Mailer>;

/// SmtpMailer
///
/// Real delivery over an authenticated SMTP relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &AppConfig) -> Result<Self, MailError> {
        let creds = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.clone(),
        );
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?
            .credentials(creds)
            .build();
        let from: Mailbox = config.mail_from.parse()?;
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_confirmation_code(
        &self,
        to: &str,
        username: &str,
        code: &str,
    ) -> Result<(), MailError> {
        let to: Mailbox = to.parse()?;
        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject("Confirmation code")
            .header(ContentType::TEXT_PLAIN)
            .body(format!(
                "Hello {username},\n\nYour confirmation code: {code}\n"
            ))?;

        self.transport.send(email).await?;
        tracing::info!(username, "confirmation code sent");
        Ok(())
    }
}

/// LogMailer
///
/// Local-environment implementation: writes the code to the log instead of
/// sending mail, so the signup flow is fully exercisable without a relay.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_confirmation_code(
        &self,
        to: &str,
        username: &str,
        code: &str,
    ) -> Result<(), MailError> {
        tracing::info!(to, username, code, "confirmation code (log-only delivery)");
        Ok(())
    }
}
