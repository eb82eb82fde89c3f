use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::config::{SmtpConfig, SmtpEncryption};

/// MailError
#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address {0:?}")]
    Address(String),
    #[error("failed to build message: {0}")]
    Build(String),
    #[error("transport failure: {0}")]
    Transport(String),
}

// 1. Mailer Contract
/// Mailer
///
/// Outbound notification channel. Sends are best-effort from the caller's point of view:
/// the workflow logs a failed send and carries on.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Sends a plain-text message from the configured sender address.
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError>;
}

/// MailerState
///
/// The concrete type used to share the notification service across the application state.
pub type MailerState = Arc<dyn Mailer>;

// 2. SMTP Implementation
/// SmtpMailer
///
/// lettre transport over SMTP. The connection is opened lazily on first send.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Fails on an unparsable sender address, so a bad `EMAIL_FROM` surfaces at startup.
    pub fn new(config: &SmtpConfig, from: &str) -> Result<Self, MailError> {
        let from: Mailbox = from
            .parse()
            .map_err(|_| MailError::Address(from.to_string()))?;
        let mut builder = match config.encryption {
            SmtpEncryption::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| MailError::Transport(e.to_string()))?,
            SmtpEncryption::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                    .map_err(|e| MailError::Transport(e.to_string()))?
            }
            SmtpEncryption::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            }
        }
        .port(config.port);

        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse().map_err(|_| MailError::Address(to.to_string()))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| MailError::Build(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;
        Ok(())
    }
}

// 3. Log-only Implementation (local runs without an SMTP relay)
/// LogMailer
///
/// Writes each message to the tracing output instead of delivering it.
#[derive(Clone, Default)]
pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(from: &str) -> Self {
        Self {
            from: from.to_string(),
        }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        tracing::info!(from = %self.from, to, subject, body, "email (log mailer)");
        Ok(())
    }
}

// 4. The Mock Implementation (For Tests)
/// SentMail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// MockMailer
///
/// Records every message. With `should_fail` set, every send errors after recording
/// nothing, which lets tests prove that notification failures never undo state changes.
#[derive(Clone, Default)]
pub struct MockMailer {
    pub should_fail: bool,
    sent: Arc<Mutex<Vec<SentMail>>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Snapshot of the messages delivered so far.
    pub fn sent(&self) -> Vec<SentMail> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        if self.should_fail {
            return Err(MailError::Transport(
                "Mock Mailer Error: Simulation requested".to_string(),
            ));
        }
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| MailError::Transport("mock mailer lock poisoned".to_string()))?;
        sent.push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}
